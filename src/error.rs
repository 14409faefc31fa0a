//! Error types for estate-forge operations.
//!
//! Defines the error taxonomy shared across subsystems:
//! - Rubric scoring input errors
//! - Collaborator (acquisition, analysis, review) failures
//! - Batch store failures
//! - LLM API interactions

use thiserror::Error;

use crate::quality::Dimension;

/// Errors raised by the scoring engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    #[error("Invalid {dimension}: must be a number between 0 and 100, got {value}")]
    InvalidInput { dimension: Dimension, value: f64 },
}

/// Errors raised by the pipeline collaborators.
///
/// Every variant is isolated to the item being processed; none of them
/// aborts a batch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Data acquisition failed for '{source_ref}': {reason}")]
    Acquisition { source_ref: String, reason: String },

    #[error("Primary analysis failed: {0}")]
    Analysis(String),

    #[error("Quality review failed: {0}")]
    Review(String),

    #[error("Failed to parse provider response: {0}")]
    ResponseParse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a batch store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: ESTATE_LLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_error_names_dimension() {
        let err = ScoringError::InvalidInput {
            dimension: Dimension::Actionability,
            value: 101.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("actionability"));
        assert!(msg.contains("101"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Acquisition {
            source_ref: "https://example.com/1_zpid".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(err.to_string().contains("1_zpid"));
        assert!(err.to_string().contains("timeout"));

        let err: ProviderError = LlmError::RateLimited("slow down".to_string()).into();
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_store_error_transition_display() {
        let err = StoreError::InvalidTransition {
            from: "completed".to_string(),
            to: "running".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from 'completed' to 'running'"
        );
    }
}
