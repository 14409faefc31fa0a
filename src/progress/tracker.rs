//! Batch progress accounting.
//!
//! Finished items count fully; items still in the pipeline contribute a
//! fraction that depends on their current stage. The percentage never
//! decreases and only reaches 100 when the batch is finished.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::ItemStage;

use super::events::ProgressCounts;

/// Rejected stage weight settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageWeightsError {
    #[error("invalid weight '{0}'")]
    InvalidNumber(String),

    #[error("expected 4 weights, got {0}")]
    WrongCount(usize),

    #[error("progress weights must be within [0, 1)")]
    OutOfRange,

    #[error("progress weights must be non-decreasing")]
    Decreasing,
}

/// Fraction of an item credited while it sits in each in-flight stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageWeights {
    pub acquiring: f64,
    pub analyzing: f64,
    pub reviewing: f64,
    pub validating: f64,
}

impl Default for StageWeights {
    fn default() -> Self {
        Self {
            acquiring: 0.10,
            analyzing: 0.40,
            reviewing: 0.65,
            validating: 0.85,
        }
    }
}

impl StageWeights {
    /// Credit for an item at `stage`. Terminal stages get no partial credit.
    pub fn fraction(&self, stage: ItemStage) -> f64 {
        match stage {
            ItemStage::Acquiring => self.acquiring,
            ItemStage::Analyzing => self.analyzing,
            ItemStage::Reviewing => self.reviewing,
            ItemStage::Validating => self.validating,
            ItemStage::Pending | ItemStage::Completed | ItemStage::Failed => 0.0,
        }
    }

    /// Checks every weight lies in `[0, 1)` and the weights never decrease
    /// along the pipeline.
    pub fn validate(&self) -> Result<(), StageWeightsError> {
        let ordered = [self.acquiring, self.analyzing, self.reviewing, self.validating];
        if ordered.iter().any(|w| !w.is_finite() || !(0.0..1.0).contains(w)) {
            return Err(StageWeightsError::OutOfRange);
        }
        if ordered.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(StageWeightsError::Decreasing);
        }
        Ok(())
    }
}

impl FromStr for StageWeights {
    type Err = StageWeightsError;

    /// Parses four comma-separated fractions, e.g. `0.1,0.4,0.65,0.85`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| {
                let p = p.trim();
                p.parse::<f64>()
                    .map_err(|_| StageWeightsError::InvalidNumber(p.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let [acquiring, analyzing, reviewing, validating] = parts[..] else {
            return Err(StageWeightsError::WrongCount(parts.len()));
        };

        let weights = Self {
            acquiring,
            analyzing,
            reviewing,
            validating,
        };
        weights.validate()?;
        Ok(weights)
    }
}

/// Progress state of one batch.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    failed: usize,
    in_flight: HashMap<Uuid, f64>,
    weights: StageWeights,
    last_percentage: u8,
}

impl ProgressTracker {
    pub fn new(total: usize, weights: StageWeights) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            in_flight: HashMap::new(),
            weights,
            last_percentage: 0,
        }
    }

    /// Records that `item_id` entered `stage` and returns the new counts.
    pub fn enter_stage(&mut self, item_id: Uuid, stage: ItemStage) -> ProgressCounts {
        self.in_flight.insert(item_id, self.weights.fraction(stage));
        self.counts()
    }

    /// Records a successfully completed item.
    pub fn complete(&mut self, item_id: Uuid) -> ProgressCounts {
        self.in_flight.remove(&item_id);
        self.completed += 1;
        self.counts()
    }

    /// Records a failed item. It still counts as processed.
    pub fn fail(&mut self, item_id: Uuid) -> ProgressCounts {
        self.in_flight.remove(&item_id);
        self.failed += 1;
        self.counts()
    }

    /// Terminal counts: the percentage is exactly 100.
    pub fn finish(&mut self) -> ProgressCounts {
        self.in_flight.clear();
        self.last_percentage = 100;
        ProgressCounts {
            completed: self.completed,
            total: self.total,
            percentage: 100,
        }
    }

    /// Counts at the current position without finishing the batch.
    pub fn counts(&mut self) -> ProgressCounts {
        let percentage = self.percentage().max(self.last_percentage);
        self.last_percentage = percentage;
        ProgressCounts {
            completed: self.completed,
            total: self.total,
            percentage,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let in_flight: f64 = self.in_flight.values().sum();
        let processed = (self.completed + self.failed) as f64 + in_flight;
        let pct = (100.0 * processed / self.total as f64).round();
        pct.clamp(0.0, 100.0) as u8
    }
}
