//! Analysis quality scoring and validation.
//!
//! `ScoringEngine` turns a five-dimension rubric into a weighted score and
//! star rating; `QualityValidationEngine` adds issue detection,
//! recommendations and a rollback-capable snapshot history.

mod history;
mod scoring;
mod validation;

pub use history::{AnalysisSnapshot, HistoryStore, MAX_HISTORY_LENGTH};
pub use scoring::{
    Dimension, QualityLevel, ScoringCriteria, ScoringEngine, ScoringResult, ScoringWeights,
    QUALITY_THRESHOLD,
};
pub use validation::{QualityValidationEngine, Severity, ValidationIssue, ValidationResult};
