//! Progress event types and their wire format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::Recommendation;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    BatchStarted,
    AcquisitionStarted,
    AnalysisStarted,
    ReviewStarted,
    ValidationStarted,
    ItemCompleted,
    ItemFailed,
    BatchCompleted,
    BatchFailed,
}

impl ProgressEventType {
    /// Whether this event ends the batch's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BatchCompleted | Self::BatchFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchStarted => "batch_started",
            Self::AcquisitionStarted => "acquisition_started",
            Self::AnalysisStarted => "analysis_started",
            Self::ReviewStarted => "review_started",
            Self::ValidationStarted => "validation_started",
            Self::ItemCompleted => "item_completed",
            Self::ItemFailed => "item_failed",
            Self::BatchCompleted => "batch_completed",
            Self::BatchFailed => "batch_failed",
        }
    }
}

impl fmt::Display for ProgressEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch-level counters attached to every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub completed: usize,
    pub total: usize,
    /// Integer percentage in `[0, 100]`.
    pub percentage: u8,
}

/// Optional payload carried by item and failure events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventData {
    /// Payload of a completed item.
    pub fn outcome(score: f64, recommendation: Recommendation) -> Self {
        Self {
            score: Some(score),
            recommendation: Some(recommendation),
            error: None,
        }
    }

    /// Payload of a failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// A progress notification for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub batch_id: Uuid,
    pub event_type: ProgressEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    /// Source reference before acquisition, the listing address after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_label: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
    pub progress: ProgressCounts,
}

impl ProgressEvent {
    pub fn new(batch_id: Uuid, event_type: ProgressEventType, progress: ProgressCounts) -> Self {
        Self {
            batch_id,
            event_type,
            item_id: None,
            item_label: None,
            timestamp: Utc::now(),
            data: None,
            progress,
        }
    }

    pub fn with_item(mut self, item_id: Uuid, label: impl Into<String>) -> Self {
        self.item_id = Some(item_id);
        self.item_label = Some(label.into());
        self
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }
}

/// Message delivered to a progress sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// Acknowledgement sent once to a new subscriber.
    #[serde(rename_all = "camelCase")]
    Connected {
        batch_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Progress(ProgressEvent),
}

impl ProgressMessage {
    pub fn connected(batch_id: Uuid) -> Self {
        Self::Connected {
            batch_id,
            timestamp: Utc::now(),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        match self {
            Self::Connected { batch_id, .. } => *batch_id,
            Self::Progress(event) => event.batch_id,
        }
    }

    /// The progress event, if this is not an acknowledgement.
    pub fn as_event(&self) -> Option<&ProgressEvent> {
        match self {
            Self::Progress(event) => Some(event),
            Self::Connected { .. } => None,
        }
    }
}
