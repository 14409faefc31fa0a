//! estate-forge: batch property analysis with quality-gated scoring.
//!
//! Listings are acquired, analyzed, reviewed and validated against a
//! weighted quality rubric, with progress streamed to subscribers and every
//! result persisted.

pub mod cli;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod quality;
pub mod storage;

// Re-export commonly used error types
pub use error::{LlmError, ProviderError, ScoringError, StoreError};
pub use pipeline::PipelineError;
