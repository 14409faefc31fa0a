//! Weighted rubric scoring.
//!
//! Turns five per-dimension scores into a single 0-100 score, a 1-5 star
//! rating, a coarse quality level and a pass/fail verdict against the
//! fixed quality threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

/// Minimum overall score for an analysis to be considered acceptable.
pub const QUALITY_THRESHOLD: f64 = 85.0;

/// Weight of the data accuracy dimension.
const DATA_ACCURACY_WEIGHT: f64 = 0.25;

/// Weight of the logical consistency dimension.
const LOGICAL_CONSISTENCY_WEIGHT: f64 = 0.25;

/// Weight of the actionability dimension.
const ACTIONABILITY_WEIGHT: f64 = 0.20;

/// Weight of the analysis completeness dimension.
const ANALYSIS_COMPLETENESS_WEIGHT: f64 = 0.20;

/// Weight of the presentation dimension.
const PRESENTATION_WEIGHT: f64 = 0.10;

/// A rubric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    DataAccuracy,
    LogicalConsistency,
    Actionability,
    AnalysisCompleteness,
    Presentation,
}

impl Dimension {
    /// All dimensions in rubric order.
    pub fn all() -> [Dimension; 5] {
        [
            Dimension::DataAccuracy,
            Dimension::LogicalConsistency,
            Dimension::Actionability,
            Dimension::AnalysisCompleteness,
            Dimension::Presentation,
        ]
    }

    /// Human-readable name used in issue descriptions.
    pub fn display_name(&self) -> &'static str {
        match self {
            Dimension::DataAccuracy => "Data Accuracy",
            Dimension::LogicalConsistency => "Logical Consistency",
            Dimension::Actionability => "Actionability",
            Dimension::AnalysisCompleteness => "Analysis Completeness",
            Dimension::Presentation => "Presentation Quality",
        }
    }

    /// Snake-case identifier, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::DataAccuracy => "data_accuracy",
            Dimension::LogicalConsistency => "logical_consistency",
            Dimension::Actionability => "actionability",
            Dimension::AnalysisCompleteness => "analysis_completeness",
            Dimension::Presentation => "presentation",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension scores, each expected in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriteria {
    pub data_accuracy: f64,
    pub logical_consistency: f64,
    pub actionability: f64,
    pub analysis_completeness: f64,
    pub presentation: f64,
}

impl ScoringCriteria {
    /// Creates criteria from the five scores in rubric order.
    pub fn new(
        data_accuracy: f64,
        logical_consistency: f64,
        actionability: f64,
        analysis_completeness: f64,
        presentation: f64,
    ) -> Self {
        Self {
            data_accuracy,
            logical_consistency,
            actionability,
            analysis_completeness,
            presentation,
        }
    }

    /// Criteria with every dimension set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value)
    }

    /// Returns the score for one dimension.
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::DataAccuracy => self.data_accuracy,
            Dimension::LogicalConsistency => self.logical_consistency,
            Dimension::Actionability => self.actionability,
            Dimension::AnalysisCompleteness => self.analysis_completeness,
            Dimension::Presentation => self.presentation,
        }
    }

    /// Checks every dimension is a finite number in `[0, 100]`.
    pub fn validate(&self) -> Result<(), ScoringError> {
        for dimension in Dimension::all() {
            let value = self.get(dimension);
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ScoringError::InvalidInput { dimension, value });
            }
        }
        Ok(())
    }
}

/// Weights applied to each dimension. They sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub data_accuracy: f64,
    pub logical_consistency: f64,
    pub actionability: f64,
    pub analysis_completeness: f64,
    pub presentation: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            data_accuracy: DATA_ACCURACY_WEIGHT,
            logical_consistency: LOGICAL_CONSISTENCY_WEIGHT,
            actionability: ACTIONABILITY_WEIGHT,
            analysis_completeness: ANALYSIS_COMPLETENESS_WEIGHT,
            presentation: PRESENTATION_WEIGHT,
        }
    }
}

/// Coarse quality band derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Acceptable,
    #[serde(rename = "Below Standard")]
    BelowStandard,
    Poor,
}

impl QualityLevel {
    /// Band for an overall score.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityLevel::Excellent
        } else if score >= 85.0 {
            QualityLevel::Good
        } else if score >= 70.0 {
            QualityLevel::Acceptable
        } else if score >= 60.0 {
            QualityLevel::BelowStandard
        } else {
            QualityLevel::Poor
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLevel::Excellent => "Excellent",
            QualityLevel::Good => "Good",
            QualityLevel::Acceptable => "Acceptable",
            QualityLevel::BelowStandard => "Below Standard",
            QualityLevel::Poor => "Poor",
        };
        f.write_str(s)
    }
}

/// Result of scoring one rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Weighted score rounded to one decimal. Stars, level and threshold are
    /// derived from the unrounded sum.
    pub score: f64,
    /// Star rating from 1 to 5.
    pub stars: u8,
    pub quality_level: QualityLevel,
    pub meets_threshold: bool,
    /// Scored criteria.
    pub criteria: ScoringCriteria,
    /// Weights the score was computed with.
    pub weights: ScoringWeights,
}

/// Stateless weighted rubric scorer.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    /// Creates an engine with the standard weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores a rubric.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidInput` naming the first dimension that is
    /// not a finite number in `[0, 100]`.
    pub fn calculate_score(&self, criteria: &ScoringCriteria) -> Result<ScoringResult, ScoringError> {
        criteria.validate()?;

        let w = &self.weights;
        let weighted = criteria.data_accuracy * w.data_accuracy
            + criteria.logical_consistency * w.logical_consistency
            + criteria.actionability * w.actionability
            + criteria.analysis_completeness * w.analysis_completeness
            + criteria.presentation * w.presentation;

        // Bands use the exact sum; only the reported score is rounded.
        Ok(ScoringResult {
            score: (weighted * 10.0).round() / 10.0,
            stars: stars_for(weighted),
            quality_level: QualityLevel::from_score(weighted),
            meets_threshold: weighted >= QUALITY_THRESHOLD,
            criteria: *criteria,
            weights: *w,
        })
    }

    /// The pass/fail threshold.
    pub fn quality_threshold(&self) -> f64 {
        QUALITY_THRESHOLD
    }

    /// The weights in use.
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }
}

fn stars_for(score: f64) -> u8 {
    if score >= 90.0 {
        5
    } else if score >= 80.0 {
        4
    } else if score >= 70.0 {
        3
    } else if score >= 60.0 {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excellent_rubric() {
        let engine = ScoringEngine::new();
        let result = engine
            .calculate_score(&ScoringCriteria::new(95.0, 90.0, 85.0, 92.0, 88.0))
            .unwrap();

        assert!((result.score - 90.5).abs() < f64::EPSILON);
        assert_eq!(result.stars, 5);
        assert_eq!(result.quality_level, QualityLevel::Excellent);
        assert!(result.meets_threshold);
    }

    #[test]
    fn test_weighting_below_threshold() {
        let engine = ScoringEngine::new();
        let result = engine
            .calculate_score(&ScoringCriteria::new(80.0, 80.0, 90.0, 85.0, 95.0))
            .unwrap();

        assert!((result.score - 84.5).abs() < f64::EPSILON);
        assert_eq!(result.stars, 4);
        assert_eq!(result.quality_level, QualityLevel::Acceptable);
        assert!(!result.meets_threshold);
    }

    #[test]
    fn test_threshold_boundary() {
        let result = ScoringEngine::new()
            .calculate_score(&ScoringCriteria::uniform(85.0))
            .unwrap();

        assert!((result.score - 85.0).abs() < f64::EPSILON);
        assert_eq!(result.stars, 4);
        assert_eq!(result.quality_level, QualityLevel::Good);
        assert!(result.meets_threshold);
    }

    #[test]
    fn test_extremes() {
        let engine = ScoringEngine::new();

        let top = engine.calculate_score(&ScoringCriteria::uniform(100.0)).unwrap();
        assert!((top.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(top.stars, 5);
        assert_eq!(top.quality_level, QualityLevel::Excellent);

        let bottom = engine.calculate_score(&ScoringCriteria::uniform(0.0)).unwrap();
        assert!(bottom.score.abs() < f64::EPSILON);
        assert_eq!(bottom.stars, 1);
        assert_eq!(bottom.quality_level, QualityLevel::Poor);
        assert!(!bottom.meets_threshold);
    }

    #[test]
    fn test_bands_use_unrounded_score() {
        let engine = ScoringEngine::new();
        let cases = [
            (59.96, 60.0, 1, QualityLevel::Poor),
            (69.96, 70.0, 2, QualityLevel::BelowStandard),
            (79.96, 80.0, 3, QualityLevel::Acceptable),
            (84.96, 85.0, 4, QualityLevel::Acceptable),
            (89.96, 90.0, 4, QualityLevel::Good),
        ];

        for (value, rounded, stars, level) in cases {
            let result = engine.calculate_score(&ScoringCriteria::uniform(value)).unwrap();
            assert!((result.score - rounded).abs() < 1e-9, "{} -> {}", value, result.score);
            assert_eq!(result.stars, stars, "stars for {}", value);
            assert_eq!(result.quality_level, level, "level for {}", value);
            assert_eq!(result.meets_threshold, value >= QUALITY_THRESHOLD, "threshold for {}", value);
        }
    }

    #[test]
    fn test_star_and_level_bands() {
        assert_eq!(stars_for(89.9), 4);
        assert_eq!(stars_for(70.0), 3);
        assert_eq!(stars_for(60.0), 2);
        assert_eq!(stars_for(59.9), 1);

        assert_eq!(QualityLevel::from_score(65.0), QualityLevel::BelowStandard);
        assert_eq!(QualityLevel::from_score(65.0).to_string(), "Below Standard");
    }

    #[test]
    fn test_rejects_out_of_range() {
        let engine = ScoringEngine::new();

        let mut criteria = ScoringCriteria::uniform(90.0);
        criteria.actionability = 101.0;
        let err = engine.calculate_score(&criteria).unwrap_err();
        assert_eq!(
            err,
            ScoringError::InvalidInput {
                dimension: Dimension::Actionability,
                value: 101.0
            }
        );

        let mut criteria = ScoringCriteria::uniform(90.0);
        criteria.data_accuracy = -1.0;
        assert!(engine.calculate_score(&criteria).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let engine = ScoringEngine::new();
        let mut criteria = ScoringCriteria::uniform(90.0);
        criteria.presentation = f64::NAN;

        match engine.calculate_score(&criteria) {
            Err(ScoringError::InvalidInput { dimension, .. }) => {
                assert_eq!(dimension, Dimension::Presentation)
            }
            other => panic!("expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn test_monotonic_in_every_dimension() {
        let engine = ScoringEngine::new();
        let base = ScoringCriteria::uniform(50.0);
        let base_score = engine.calculate_score(&base).unwrap().score;

        for dimension in Dimension::all() {
            let mut previous = base_score;
            for step in 1..=10 {
                let mut raised = base;
                let value = 50.0 + step as f64 * 5.0;
                match dimension {
                    Dimension::DataAccuracy => raised.data_accuracy = value,
                    Dimension::LogicalConsistency => raised.logical_consistency = value,
                    Dimension::Actionability => raised.actionability = value,
                    Dimension::AnalysisCompleteness => raised.analysis_completeness = value,
                    Dimension::Presentation => raised.presentation = value,
                }
                let score = engine.calculate_score(&raised).unwrap().score;
                assert!(score >= previous, "{} not monotonic", dimension);
                previous = score;
            }
        }
    }

    #[test]
    fn test_result_carries_breakdown() {
        let engine = ScoringEngine::new();
        let criteria = ScoringCriteria::new(70.0, 75.0, 80.0, 85.0, 90.0);
        let result = engine.calculate_score(&criteria).unwrap();

        assert_eq!(result.criteria, criteria);
        assert_eq!(&result.weights, engine.weights());
        let w = engine.weights();
        let total = w.data_accuracy
            + w.logical_consistency
            + w.actionability
            + w.analysis_completeness
            + w.presentation;
        assert!((total - 1.0).abs() < 1e-9);
        assert!((engine.quality_threshold() - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dimension_names() {
        assert_eq!(Dimension::Presentation.display_name(), "Presentation Quality");
        assert_eq!(Dimension::DataAccuracy.to_string(), "data_accuracy");
        assert_eq!(
            serde_json::to_string(&Dimension::AnalysisCompleteness).unwrap(),
            "\"analysis_completeness\""
        );
    }
}
