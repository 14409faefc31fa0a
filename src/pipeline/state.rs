//! Lifecycle states of batches and items.
//!
//! Both lifecycles only move forward. A batch may skip ahead (a pending
//! batch can fail before it runs) but never go back; an item advances one
//! stage at a time and may fail from any non-terminal stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::final_validation::FinalValidation;

/// Status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    fn rank(&self) -> u8 {
        match self {
            BatchStatus::Pending => 0,
            BatchStatus::Running => 1,
            BatchStatus::Completed | BatchStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    /// Whether a batch in this status may move to `next`.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "running" => Ok(BatchStatus::Running),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

/// Pipeline stage of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStage {
    Pending,
    Acquiring,
    Analyzing,
    Reviewing,
    Validating,
    Completed,
    Failed,
}

impl ItemStage {
    /// The next stage on the success path.
    pub fn successor(&self) -> Option<ItemStage> {
        match self {
            ItemStage::Pending => Some(ItemStage::Acquiring),
            ItemStage::Acquiring => Some(ItemStage::Analyzing),
            ItemStage::Analyzing => Some(ItemStage::Reviewing),
            ItemStage::Reviewing => Some(ItemStage::Validating),
            ItemStage::Validating => Some(ItemStage::Completed),
            ItemStage::Completed | ItemStage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStage::Completed | ItemStage::Failed)
    }

    /// Whether an item at this stage may move to `next`.
    pub fn can_transition_to(&self, next: ItemStage) -> bool {
        if next == ItemStage::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStage::Pending => "Pending",
            ItemStage::Acquiring => "Acquiring",
            ItemStage::Analyzing => "Analyzing",
            ItemStage::Reviewing => "Reviewing",
            ItemStage::Validating => "Validating",
            ItemStage::Completed => "Completed",
            ItemStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ItemStage::Pending),
            "Acquiring" => Ok(ItemStage::Acquiring),
            "Analyzing" => Ok(ItemStage::Analyzing),
            "Reviewing" => Ok(ItemStage::Reviewing),
            "Validating" => Ok(ItemStage::Validating),
            "Completed" => Ok(ItemStage::Completed),
            "Failed" => Ok(ItemStage::Failed),
            other => Err(format!("unknown item stage '{}'", other)),
        }
    }
}

/// Rejected item stage change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid stage transition from '{from}' to '{to}'")]
pub struct StageTransitionError {
    pub from: ItemStage,
    pub to: ItemStage,
}

/// Why an item failed, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub stage: ItemStage,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(stage: ItemStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.reason)
    }
}

/// Result of driving one item through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Completed(Box<FinalValidation>),
    Failed(ItemFailure),
}

impl ItemOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ItemOutcome::Completed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_moves_forward_only() {
        assert!(BatchStatus::Pending.can_transition_to(BatchStatus::Running));
        assert!(BatchStatus::Running.can_transition_to(BatchStatus::Completed));
        assert!(BatchStatus::Running.can_transition_to(BatchStatus::Failed));
        assert!(BatchStatus::Pending.can_transition_to(BatchStatus::Failed));

        assert!(!BatchStatus::Running.can_transition_to(BatchStatus::Pending));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Running));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Failed));
        assert!(!BatchStatus::Running.can_transition_to(BatchStatus::Running));
    }

    #[test]
    fn test_item_stage_advances_one_step() {
        let path = [
            ItemStage::Pending,
            ItemStage::Acquiring,
            ItemStage::Analyzing,
            ItemStage::Reviewing,
            ItemStage::Validating,
            ItemStage::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }

        assert!(!ItemStage::Acquiring.can_transition_to(ItemStage::Reviewing));
        assert!(!ItemStage::Reviewing.can_transition_to(ItemStage::Completed));
        assert!(!ItemStage::Analyzing.can_transition_to(ItemStage::Acquiring));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for stage in [
            ItemStage::Pending,
            ItemStage::Acquiring,
            ItemStage::Analyzing,
            ItemStage::Reviewing,
            ItemStage::Validating,
        ] {
            assert!(stage.can_transition_to(ItemStage::Failed));
        }
        assert!(!ItemStage::Completed.can_transition_to(ItemStage::Failed));
        assert!(!ItemStage::Failed.can_transition_to(ItemStage::Failed));
    }

    #[test]
    fn test_string_round_trip() {
        for status in ["pending", "running", "completed", "failed"] {
            assert_eq!(status.parse::<BatchStatus>().unwrap().as_str(), status);
        }
        assert!("done".parse::<BatchStatus>().is_err());
        assert_eq!("Reviewing".parse::<ItemStage>().unwrap(), ItemStage::Reviewing);
        assert!("reviewing".parse::<ItemStage>().is_err());
    }

    #[test]
    fn test_item_failure_display() {
        let failure = ItemFailure::new(ItemStage::Acquiring, "timeout");
        assert_eq!(failure.to_string(), "Acquiring failed: timeout");
    }
}
