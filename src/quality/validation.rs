//! Quality validation on top of rubric scoring.
//!
//! Adds issue detection, human-readable recommendations and a snapshot
//! history per analysis id that can be rolled back to the last passing
//! validation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScoringError;

use super::history::{AnalysisSnapshot, HistoryStore};
use super::scoring::{Dimension, ScoringCriteria, ScoringEngine, ScoringResult};

/// Dimension scores below this are critical rather than warnings.
const CRITICAL_CUTOFF: f64 = 70.0;

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A problem found while validating an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub category: Dimension,
    pub description: String,
    pub suggested_fix: String,
}

/// Outcome of validating one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub scoring: ScoringResult,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationResult {
    /// Issues of the given severity, in detection order.
    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// Validates analyses against the quality threshold and keeps their history.
///
/// One engine is shared by every running batch; the history store is
/// internally synchronized.
#[derive(Debug, Clone)]
pub struct QualityValidationEngine {
    scoring: ScoringEngine,
    history: Arc<HistoryStore>,
}

impl Default for QualityValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityValidationEngine {
    /// Creates an engine with its own empty history.
    pub fn new() -> Self {
        Self::with_history(Arc::new(HistoryStore::new()))
    }

    /// Creates an engine backed by an existing history store.
    pub fn with_history(history: Arc<HistoryStore>) -> Self {
        Self {
            scoring: ScoringEngine::new(),
            history,
        }
    }

    /// Scores `criteria`, derives issues and recommendations, and records a
    /// snapshot of `content` under `analysis_id`.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidInput` if any criterion is out of range.
    /// Nothing is recorded in that case.
    pub fn validate_analysis(
        &self,
        analysis_id: &str,
        content: &serde_json::Value,
        criteria: &ScoringCriteria,
    ) -> Result<ValidationResult, ScoringError> {
        let scoring = self.scoring.calculate_score(criteria)?;
        let issues = self.identify_issues(criteria, &scoring);
        let recommendations = self.recommendations(&issues, &scoring);

        let result = ValidationResult {
            is_valid: scoring.meets_threshold,
            scoring,
            issues,
            recommendations,
            timestamp: Utc::now(),
        };

        debug!(
            analysis_id,
            score = result.scoring.score,
            is_valid = result.is_valid,
            issues = result.issues.len(),
            "Analysis validated"
        );

        self.history.push(
            analysis_id,
            AnalysisSnapshot::new(analysis_id, content.clone(), result.clone()),
        );

        Ok(result)
    }

    /// Returns the newest valid snapshot for `analysis_id`, discarding every
    /// newer snapshot. `None` when no valid snapshot exists.
    pub fn rollback_to_last_valid(&self, analysis_id: &str) -> Option<AnalysisSnapshot> {
        self.history.rollback_to_last_valid(analysis_id)
    }

    /// Copy of the snapshot history for `analysis_id`, oldest first.
    pub fn history(&self, analysis_id: &str) -> Vec<AnalysisSnapshot> {
        self.history.get(analysis_id)
    }

    pub fn clear_history(&self, analysis_id: &str) {
        self.history.clear(analysis_id);
    }

    pub fn quality_threshold(&self) -> f64 {
        self.scoring.quality_threshold()
    }

    pub fn scoring_engine(&self) -> &ScoringEngine {
        &self.scoring
    }

    fn identify_issues(&self, criteria: &ScoringCriteria, scoring: &ScoringResult) -> Vec<ValidationIssue> {
        let threshold = self.quality_threshold();

        let mut issues: Vec<ValidationIssue> = Dimension::all()
            .into_iter()
            .filter_map(|dimension| {
                let value = criteria.get(dimension);
                if value >= threshold {
                    return None;
                }
                let critical = value < CRITICAL_CUTOFF;
                Some(ValidationIssue {
                    severity: if critical { Severity::Critical } else { Severity::Warning },
                    category: dimension,
                    description: format!(
                        "{} score ({}) below threshold ({})",
                        dimension.display_name(),
                        value,
                        threshold
                    ),
                    suggested_fix: suggested_fix(dimension, critical).to_string(),
                })
            })
            .collect();

        if issues.is_empty() && !scoring.meets_threshold {
            issues.push(ValidationIssue {
                severity: Severity::Critical,
                category: Dimension::DataAccuracy,
                description: format!(
                    "Overall score ({}) below quality threshold ({})",
                    scoring.score, threshold
                ),
                suggested_fix: "Review and improve the lowest-scoring criteria".to_string(),
            });
        }

        issues
    }

    fn recommendations(&self, issues: &[ValidationIssue], scoring: &ScoringResult) -> Vec<String> {
        if issues.is_empty() {
            return vec![format!(
                "Excellent work! Analysis meets quality standards with {}⭐ rating.",
                scoring.stars
            )];
        }

        let mut lines = Vec::new();
        for (severity, header) in [
            (Severity::Critical, "🚨 Critical improvements needed:"),
            (Severity::Warning, "⚠️ Recommended improvements:"),
        ] {
            let mut matching = issues.iter().filter(|i| i.severity == severity).peekable();
            if matching.peek().is_none() {
                continue;
            }
            lines.push(header.to_string());
            lines.extend(matching.map(|i| format!("  • {}: {}", i.description, i.suggested_fix)));
        }

        lines.push(format!(
            "Target: Achieve {}+ score for 5⭐ quality rating.",
            self.quality_threshold()
        ));
        lines
    }
}

fn suggested_fix(dimension: Dimension, critical: bool) -> &'static str {
    match (dimension, critical) {
        (Dimension::DataAccuracy, true) => "Verify all facts and sources, remove speculation",
        (Dimension::DataAccuracy, false) => "Double-check key data points and add citations",
        (Dimension::LogicalConsistency, true) => "Restructure analysis with clear logical flow",
        (Dimension::LogicalConsistency, false) => "Review conclusions for logical gaps",
        (Dimension::Actionability, true) => "Add specific, measurable action items",
        (Dimension::Actionability, false) => "Clarify next steps and priorities",
        (Dimension::AnalysisCompleteness, true) => "Address missing key analysis areas",
        (Dimension::AnalysisCompleteness, false) => "Add supporting details to strengthen analysis",
        (Dimension::Presentation, true) => "Improve formatting, clarity, and organization",
        (Dimension::Presentation, false) => "Polish language and visual presentation",
    }
}
