//! Batch coordinator: drives every item of a batch through acquisition,
//! analysis, review and final validation.
//!
//! Items run strictly one after another inside a detached task per batch.
//! Collaborator and scoring failures stay local to their item; a store
//! failure aborts the batch.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ProviderError, ScoringError, StoreError};
use crate::progress::{
    EventData, ProgressBroadcaster, ProgressEvent, ProgressEventType, ProgressMessage,
    ProgressTracker, SubscriptionId,
};
use crate::providers::{AnalysisProvider, DataAcquisitionProvider, ItemData, ReviewProvider};
use crate::quality::QualityValidationEngine;
use crate::storage::BatchStore;

use super::config::{ConfigError, CoordinatorConfig};
use super::final_validation::{finalize, FinalValidation};
use super::state::{BatchStatus, ItemFailure, ItemOutcome, ItemStage};
use super::types::{Batch, BatchRequest, BatchResponse, BatchSummary, ItemRef, PropertyAnalysis};

/// Message returned with every accepted batch.
pub const BATCH_STARTED_MESSAGE: &str = "Batch analysis started successfully";

/// Errors surfaced to callers of the coordinator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid batch request: {0}")]
    InvalidRequest(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch task failed: {0}")]
    Task(String),
}

/// Why a stage sequence stopped early.
enum StageError {
    Item(ItemFailure),
    Store(StoreError),
}

impl From<StoreError> for StageError {
    fn from(e: StoreError) -> Self {
        StageError::Store(e)
    }
}

impl StageError {
    fn provider(stage: ItemStage, e: ProviderError) -> Self {
        StageError::Item(ItemFailure::new(stage, e.to_string()))
    }

    fn scoring(e: ScoringError) -> Self {
        StageError::Item(ItemFailure::new(ItemStage::Validating, e.to_string()))
    }
}

/// Orchestrates batches over a store, three collaborators and a broadcaster.
#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn BatchStore>,
    acquisition: Arc<dyn DataAcquisitionProvider>,
    analysis: Arc<dyn AnalysisProvider>,
    review: Arc<dyn ReviewProvider>,
    broadcaster: Arc<ProgressBroadcaster>,
    validation: Arc<QualityValidationEngine>,
    config: CoordinatorConfig,
}

impl BatchCoordinator {
    /// Creates a coordinator with a fresh broadcaster and validation engine.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if `config` does not validate.
    pub fn new(
        store: Arc<dyn BatchStore>,
        acquisition: Arc<dyn DataAcquisitionProvider>,
        analysis: Arc<dyn AnalysisProvider>,
        review: Arc<dyn ReviewProvider>,
        config: CoordinatorConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            store,
            acquisition,
            analysis,
            review,
            broadcaster: Arc::new(ProgressBroadcaster::new()),
            validation: Arc::new(QualityValidationEngine::new()),
            config,
        })
    }

    /// Shares an existing broadcaster, for example one owned by a transport.
    pub fn with_broadcaster(mut self, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Shares an existing validation engine and its history.
    pub fn with_validation_engine(mut self, engine: Arc<QualityValidationEngine>) -> Self {
        self.validation = engine;
        self
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn validation_engine(&self) -> &Arc<QualityValidationEngine> {
        &self.validation
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Accepts a batch and starts processing it in the background.
    ///
    /// The batch is persisted as pending and `batch_started` is emitted before
    /// this returns. Processing continues on a detached task.
    pub async fn start_batch(&self, request: BatchRequest) -> Result<BatchResponse, PipelineError> {
        let (response, _handle) = self.launch(request).await?;
        Ok(response)
    }

    /// Runs a batch to its end and returns the summary.
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchSummary, PipelineError> {
        let (response, handle) = self.launch(request).await?;
        handle.await.map_err(|e| PipelineError::Task(e.to_string()))?;
        self.batch_summary(response.batch_id).await
    }

    async fn launch(&self, request: BatchRequest) -> Result<(BatchResponse, JoinHandle<()>), PipelineError> {
        self.validate_request(&request)?;

        let batch = Batch::new(&request.owner_id, request.item_types, request.items.len());
        self.store.create_batch(&batch).await?;

        info!(
            batch_id = %batch.id,
            owner_id = %batch.owner_id,
            items = batch.total_items,
            item_types = %batch.item_types,
            "Batch accepted"
        );

        let mut tracker = ProgressTracker::new(batch.total_items, self.config.progress_weights);
        self.emit(ProgressEvent::new(batch.id, ProgressEventType::BatchStarted, tracker.counts()));

        let response = BatchResponse {
            batch_id: batch.id,
            status: BatchStatus::Running,
            message: BATCH_STARTED_MESSAGE.to_string(),
            total_items: batch.total_items,
        };

        let coordinator = self.clone();
        let handle = tokio::spawn(async move {
            coordinator.process_items(batch, request.items, tracker).await;
        });

        Ok((response, handle))
    }

    fn validate_request(&self, request: &BatchRequest) -> Result<(), PipelineError> {
        if request.owner_id.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("owner id is required".to_string()));
        }
        if request.items.is_empty() {
            return Err(PipelineError::InvalidRequest("at least one item is required".to_string()));
        }
        if request.items.len() > self.config.max_batch_size {
            return Err(PipelineError::InvalidRequest(format!(
                "batch of {} items exceeds the maximum of {}",
                request.items.len(),
                self.config.max_batch_size
            )));
        }
        for (index, item) in request.items.iter().enumerate() {
            if item.source_ref.trim().is_empty() {
                return Err(PipelineError::InvalidRequest(format!(
                    "item {} has an empty source reference",
                    index
                )));
            }
            if !request.item_types.accepts(item.item_type) {
                return Err(PipelineError::InvalidRequest(format!(
                    "item {} is {} but the batch accepts {}",
                    index, item.item_type, request.item_types
                )));
            }
        }
        Ok(())
    }

    async fn process_items(&self, batch: Batch, items: Vec<ItemRef>, mut tracker: ProgressTracker) {
        let batch_id = batch.id;

        if let Err(e) = self.drive(&batch, &items, &mut tracker).await {
            error!(batch_id = %batch_id, error = %e, "Batch aborted by store failure");

            if let Err(mark_err) = self.store.update_batch_status(batch_id, BatchStatus::Failed).await {
                warn!(batch_id = %batch_id, error = %mark_err, "Could not mark batch failed");
            }

            self.emit(
                ProgressEvent::new(batch_id, ProgressEventType::BatchFailed, tracker.counts())
                    .with_data(EventData::error(e.to_string())),
            );
        }
    }

    async fn drive(&self, batch: &Batch, items: &[ItemRef], tracker: &mut ProgressTracker) -> Result<(), StoreError> {
        self.store.update_batch_status(batch.id, BatchStatus::Running).await?;

        let mut completed = 0usize;
        for item_ref in items {
            let mut item = PropertyAnalysis::new(batch, item_ref);

            match self.process_item(&mut item, tracker).await? {
                ItemOutcome::Completed(result) => {
                    completed += 1;
                    self.store.update_batch_completed(batch.id, completed).await?;
                    info!(
                        batch_id = %batch.id,
                        item_id = %item.id,
                        score = result.score,
                        recommendation = %result.recommendation,
                        "Item completed"
                    );
                    self.emit(
                        ProgressEvent::new(batch.id, ProgressEventType::ItemCompleted, tracker.complete(item.id))
                            .with_item(item.id, item.label())
                            .with_data(EventData::outcome(result.score, result.recommendation)),
                    );
                }
                ItemOutcome::Failed(failure) => {
                    self.emit(
                        ProgressEvent::new(batch.id, ProgressEventType::ItemFailed, tracker.fail(item.id))
                            .with_item(item.id, item.label())
                            .with_data(EventData::error(failure.reason)),
                    );
                }
            }
        }

        self.store.update_batch_completed(batch.id, completed).await?;
        self.store.update_batch_status(batch.id, BatchStatus::Completed).await?;

        info!(
            batch_id = %batch.id,
            completed,
            failed = tracker.failed(),
            total = batch.total_items,
            "Batch completed"
        );
        self.emit(ProgressEvent::new(batch.id, ProgressEventType::BatchCompleted, tracker.finish()));
        Ok(())
    }

    /// Runs one item to a terminal stage. Only store failures escape.
    async fn process_item(
        &self,
        item: &mut PropertyAnalysis,
        tracker: &mut ProgressTracker,
    ) -> Result<ItemOutcome, StoreError> {
        let outcome = self.settle_item(item, tracker).await;
        // The stored record keeps the verdict.
        self.validation.clear_history(&item.id.to_string());
        outcome
    }

    async fn settle_item(
        &self,
        item: &mut PropertyAnalysis,
        tracker: &mut ProgressTracker,
    ) -> Result<ItemOutcome, StoreError> {
        let result = match self.run_stages(item, tracker).await {
            Ok(result) => result,
            Err(StageError::Item(failure)) => return self.record_failure(item, failure).await,
            Err(StageError::Store(e)) => return Err(e),
        };

        if let Err(e) = item.complete(&result) {
            return self.record_failure(item, ItemFailure::new(item.stage, e.to_string())).await;
        }
        self.store.save_item(item).await?;
        Ok(ItemOutcome::Completed(Box::new(result)))
    }

    async fn run_stages(
        &self,
        item: &mut PropertyAnalysis,
        tracker: &mut ProgressTracker,
    ) -> Result<FinalValidation, StageError> {
        self.enter_stage(item, ItemStage::Acquiring, tracker).await?;
        let data: ItemData = self
            .acquisition
            .fetch(&item.source_ref)
            .await
            .map_err(|e| StageError::provider(ItemStage::Acquiring, e))?;
        item.set_data(data.clone());

        self.enter_stage(item, ItemStage::Analyzing, tracker).await?;
        let analysis = self
            .analysis
            .analyze(&data, item.item_type)
            .await
            .map_err(|e| StageError::provider(ItemStage::Analyzing, e))?;
        item.analysis = Some(analysis.clone());

        self.enter_stage(item, ItemStage::Reviewing, tracker).await?;
        let review = self
            .review
            .review(&data, &analysis)
            .await
            .map_err(|e| StageError::provider(ItemStage::Reviewing, e))?;
        item.review = Some(review.clone());

        self.enter_stage(item, ItemStage::Validating, tracker).await?;
        finalize(&self.validation, &item.id.to_string(), &analysis, &review).map_err(StageError::scoring)
    }

    /// Advances, persists and announces a stage.
    async fn enter_stage(
        &self,
        item: &mut PropertyAnalysis,
        stage: ItemStage,
        tracker: &mut ProgressTracker,
    ) -> Result<(), StageError> {
        item.advance_to(stage)
            .map_err(|e| StageError::Item(ItemFailure::new(e.from, e.to_string())))?;
        self.store.save_item(item).await?;

        debug!(batch_id = %item.batch_id, item_id = %item.id, stage = %stage, "Item stage entered");

        let Some(event_type) = stage_event(stage) else {
            return Ok(());
        };
        let progress = tracker.enter_stage(item.id, stage);
        self.emit(ProgressEvent::new(item.batch_id, event_type, progress).with_item(item.id, item.label()));
        Ok(())
    }

    async fn record_failure(
        &self,
        item: &mut PropertyAnalysis,
        failure: ItemFailure,
    ) -> Result<ItemOutcome, StoreError> {
        warn!(
            batch_id = %item.batch_id,
            item_id = %item.id,
            source_ref = %item.source_ref,
            stage = %failure.stage,
            error = %failure.reason,
            "Item failed"
        );

        if let Err(e) = item.fail(failure.reason.clone()) {
            warn!(item_id = %item.id, error = %e, "Item already terminal");
        }
        self.store.save_item(item).await?;
        Ok(ItemOutcome::Failed(failure))
    }

    fn emit(&self, event: ProgressEvent) {
        debug!(
            batch_id = %event.batch_id,
            event = %event.event_type,
            percentage = event.progress.percentage,
            "Progress"
        );
        self.broadcaster.broadcast(&event);
    }

    /// Current state of a batch.
    pub async fn batch_status(&self, batch_id: Uuid) -> Result<Batch, PipelineError> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or(PipelineError::BatchNotFound(batch_id))
    }

    /// Items of a batch, ordered by creation.
    pub async fn batch_results(&self, batch_id: Uuid) -> Result<Vec<PropertyAnalysis>, PipelineError> {
        self.batch_status(batch_id).await?;
        Ok(self.store.get_items(batch_id).await?)
    }

    /// Aggregate view of a batch's results.
    pub async fn batch_summary(&self, batch_id: Uuid) -> Result<BatchSummary, PipelineError> {
        let batch = self.batch_status(batch_id).await?;
        let items = self.store.get_items(batch_id).await?;
        Ok(BatchSummary::from_items(&batch, &items))
    }

    /// Subscribes a channel to a batch's progress events.
    pub fn subscribe(&self, batch_id: Uuid) -> (SubscriptionId, mpsc::UnboundedReceiver<ProgressMessage>) {
        self.broadcaster.subscribe_channel(batch_id)
    }

    pub fn unsubscribe(&self, batch_id: Uuid, id: SubscriptionId) -> bool {
        self.broadcaster.unsubscribe(batch_id, id)
    }
}

fn stage_event(stage: ItemStage) -> Option<ProgressEventType> {
    match stage {
        ItemStage::Acquiring => Some(ProgressEventType::AcquisitionStarted),
        ItemStage::Analyzing => Some(ProgressEventType::AnalysisStarted),
        ItemStage::Reviewing => Some(ProgressEventType::ReviewStarted),
        ItemStage::Validating => Some(ProgressEventType::ValidationStarted),
        ItemStage::Pending | ItemStage::Completed | ItemStage::Failed => None,
    }
}
