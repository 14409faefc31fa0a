//! Process-local batch store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::{Batch, BatchStatus, PropertyAnalysis};

use super::{check_transition, BatchStore};

/// Batch store kept in memory.
///
/// Failure injection hooks let callers exercise the coordinator's handling
/// of an unavailable store.
#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<Uuid, Batch>>,
    items: RwLock<HashMap<Uuid, Vec<PropertyAnalysis>>>,
    item_save_limit: Option<usize>,
    item_saves: AtomicUsize,
    reject_status_updates: AtomicBool,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every `save_item` call after the first `limit` successful ones.
    pub fn with_item_save_limit(mut self, limit: usize) -> Self {
        self.item_save_limit = Some(limit);
        self
    }

    /// Makes status updates fail with `StoreError::Unavailable` while set.
    pub fn reject_status_updates(&self, reject: bool) {
        self.reject_status_updates.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn create_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut batches = self.batches.write().unwrap_or_else(|e| e.into_inner());
        batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        if self.reject_status_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("status updates rejected".to_string()));
        }

        let mut batches = self.batches.write().unwrap_or_else(|e| e.into_inner());
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_id)))?;
        check_transition(batch.status, status)?;
        batch.status = status;
        batch.updated_at = Utc::now();
        Ok(())
    }

    async fn update_batch_completed(&self, batch_id: Uuid, completed: usize) -> Result<(), StoreError> {
        let mut batches = self.batches.write().unwrap_or_else(|e| e.into_inner());
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_id)))?;
        batch.completed_items = completed;
        batch.updated_at = Utc::now();
        Ok(())
    }

    async fn save_item(&self, item: &PropertyAnalysis) -> Result<(), StoreError> {
        if let Some(limit) = self.item_save_limit {
            if self.item_saves.load(Ordering::SeqCst) >= limit {
                return Err(StoreError::Unavailable("item writes rejected".to_string()));
            }
        }
        self.item_saves.fetch_add(1, Ordering::SeqCst);

        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let batch_items = items.entry(item.batch_id).or_default();
        match batch_items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => batch_items.push(item.clone()),
        }
        Ok(())
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        let batches = self.batches.read().unwrap_or_else(|e| e.into_inner());
        Ok(batches.get(&batch_id).cloned())
    }

    async fn get_items(&self, batch_id: Uuid) -> Result<Vec<PropertyAnalysis>, StoreError> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(&batch_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ItemRef, ItemStage, ItemType, ItemTypeSelector};

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let store = InMemoryBatchStore::new();
        let batch = Batch::new("owner-1", ItemTypeSelector::Both, 2);
        store.create_batch(&batch).await.unwrap();

        store.update_batch_status(batch.id, BatchStatus::Running).await.unwrap();
        store.update_batch_completed(batch.id, 2).await.unwrap();
        store.update_batch_status(batch.id, BatchStatus::Completed).await.unwrap();

        let stored = store.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Completed);
        assert_eq!(stored.completed_items, 2);
        assert_eq!(stored.total_items, 2);
    }

    #[tokio::test]
    async fn test_rejects_backward_transition() {
        let store = InMemoryBatchStore::new();
        let batch = Batch::new("owner-1", ItemTypeSelector::Primary, 1);
        store.create_batch(&batch).await.unwrap();
        store.update_batch_status(batch.id, BatchStatus::Running).await.unwrap();

        let err = store
            .update_batch_status(batch.id, BatchStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_batch() {
        let store = InMemoryBatchStore::new();
        assert!(store.get_batch(Uuid::new_v4()).await.unwrap().is_none());
        let err = store
            .update_batch_status(Uuid::new_v4(), BatchStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_item_upserts_in_order() {
        let store = InMemoryBatchStore::new();
        let batch = Batch::new("owner-1", ItemTypeSelector::Both, 2);
        let mut first = PropertyAnalysis::new(&batch, &ItemRef::new("a", ItemType::Primary));
        let second = PropertyAnalysis::new(&batch, &ItemRef::new("b", ItemType::Rental));

        store.save_item(&first).await.unwrap();
        store.save_item(&second).await.unwrap();
        first.advance_to(ItemStage::Acquiring).unwrap();
        store.save_item(&first).await.unwrap();

        let items = store.get_items(batch.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_ref, "a");
        assert_eq!(items[0].stage, ItemStage::Acquiring);
        assert_eq!(items[1].source_ref, "b");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryBatchStore::new().with_item_save_limit(1);
        let batch = Batch::new("owner-1", ItemTypeSelector::Both, 1);
        store.create_batch(&batch).await.unwrap();
        let item = PropertyAnalysis::new(&batch, &ItemRef::new("a", ItemType::Primary));

        store.save_item(&item).await.unwrap();
        assert!(matches!(
            store.save_item(&item).await.unwrap_err(),
            StoreError::Unavailable(_)
        ));

        store.reject_status_updates(true);
        assert!(store.update_batch_status(batch.id, BatchStatus::Running).await.is_err());
        store.reject_status_updates(false);
        assert!(store.update_batch_status(batch.id, BatchStatus::Running).await.is_ok());
    }
}
