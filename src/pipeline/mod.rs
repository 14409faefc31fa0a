//! Batch analysis pipeline.
//!
//! # Architecture
//!
//! - **Coordinator**: accepts batches and drives their items in the background
//! - **Final validation**: reconciles an analysis with its review and runs the
//!   quality rubric
//! - **State**: batch status and item stage machines
//! - **Config**: coordinator settings from defaults, builders and environment
//!
//! # Pipeline Flow
//!
//! 1. **Acquiring**: the listing is fetched into structured item data
//! 2. **Analyzing**: the primary analysis scores the item and recommends
//! 3. **Reviewing**: a second opinion approves, raises concerns or rejects
//! 4. **Validating**: the score is adjusted for the review and the rubric runs
//!
//! Every stage change is persisted and broadcast as a progress event.
//!
//! # Example
//!
//! ```rust,ignore
//! use estate_forge::pipeline::{BatchCoordinator, BatchRequest, CoordinatorConfig, ItemRef, ItemType, ItemTypeSelector};
//!
//! let coordinator = BatchCoordinator::new(store, fetcher, analyst, reviewer, CoordinatorConfig::from_env()?)?;
//! let response = coordinator
//!     .start_batch(BatchRequest {
//!         owner_id: "owner-1".to_string(),
//!         item_types: ItemTypeSelector::Primary,
//!         items: vec![ItemRef::new("https://listings.example/home/1_zpid/", ItemType::Primary)],
//!     })
//!     .await?;
//!
//! let (_, mut events) = coordinator.subscribe(response.batch_id);
//! while let Some(message) = events.recv().await {
//!     println!("{}", serde_json::to_string(&message)?);
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod final_validation;
pub mod state;
pub mod types;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{BatchCoordinator, PipelineError, BATCH_STARTED_MESSAGE};
pub use final_validation::{finalize, FinalValidation};
pub use state::{BatchStatus, ItemFailure, ItemOutcome, ItemStage, StageTransitionError};
pub use types::{
    Batch, BatchRequest, BatchResponse, BatchSummary, ItemRef, ItemType, ItemTypeSelector,
    PropertyAnalysis, Recommendation, RecommendationBreakdown, TypeBreakdown, UNKNOWN_EXTERNAL_ID,
};
