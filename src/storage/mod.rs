//! Batch and item persistence.
//!
//! The store is the source of truth for batches and their items. Two
//! backends implement [`BatchStore`]:
//! - **SqliteBatchStore**: sqlx/SQLite, durable across restarts
//! - **InMemoryBatchStore**: process-local, for tests and dry runs
//!
//! # Usage
//!
//! ```rust,ignore
//! use estate_forge::storage::{BatchStore, SqliteBatchStore};
//!
//! let store = SqliteBatchStore::connect("sqlite://estate-forge.db").await?;
//! let batch = store.get_batch(batch_id).await?;
//! let items = store.get_items(batch_id).await?;
//! ```

pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::{Batch, BatchStatus, PropertyAnalysis};

pub use memory::InMemoryBatchStore;
pub use sqlite::SqliteBatchStore;

/// Durable storage for batches and their item analyses.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Inserts a new batch.
    async fn create_batch(&self, batch: &Batch) -> Result<(), StoreError>;

    /// Moves a batch to `status`.
    ///
    /// Fails with `StoreError::InvalidTransition` if the move is not forward
    /// and `StoreError::NotFound` if the batch does not exist.
    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError>;

    /// Sets the completed item counter.
    async fn update_batch_completed(&self, batch_id: Uuid, completed: usize) -> Result<(), StoreError>;

    /// Inserts or replaces an item, keyed by its id.
    async fn save_item(&self, item: &PropertyAnalysis) -> Result<(), StoreError>;

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError>;

    /// Items of a batch in the order they were first saved.
    async fn get_items(&self, batch_id: Uuid) -> Result<Vec<PropertyAnalysis>, StoreError>;
}

/// Checks a batch status change, returning the matching store error.
pub(crate) fn check_transition(from: BatchStatus, to: BatchStatus) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
