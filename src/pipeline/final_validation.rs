//! Final validation: reconciles the primary analysis with its review and
//! runs the quality rubric.

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::providers::{AnalysisResult, ReviewAssessment, ReviewResult, ReviewSeverity};
use crate::quality::{Dimension, QualityValidationEngine, ScoringCriteria, ValidationResult};

use super::types::Recommendation;

/// Score ceiling applied when the reviewer rejects an analysis.
const REJECTED_SCORE_CAP: f64 = 50.0;

/// Multiplier applied when the reviewer has concerns.
const CONCERNS_FACTOR: f64 = 0.9;

/// Starting value of each derived rubric dimension.
const DERIVED_BASELINE: f64 = 95.0;

/// Verdict of the final validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalValidation {
    pub score: f64,
    pub recommendation: Recommendation,
    /// Blended confidence in `[0, 100]`.
    pub confidence: f64,
    pub quality: ValidationResult,
}

/// Applies the review's verdict to the analysis score and recommendation.
///
/// A rejection caps the score and forces REJECT. Concerns scale the score by
/// 0.9 (rounded to an integer) and tighten the recommendation below 80 and 60;
/// they never loosen it.
pub fn adjust_for_review(analysis: &AnalysisResult, review: &ReviewResult) -> (f64, Recommendation) {
    let score = analysis.score.clamp(0.0, 100.0);
    match review.overall_assessment {
        ReviewAssessment::Approved => (score, analysis.recommendation),
        ReviewAssessment::Rejected => (score.min(REJECTED_SCORE_CAP), Recommendation::Reject),
        ReviewAssessment::Concerns => {
            let adjusted = (score * CONCERNS_FACTOR).round();
            let recommendation = if adjusted < 60.0 {
                analysis.recommendation.at_least(Recommendation::Reject)
            } else if adjusted < 80.0 {
                analysis.recommendation.at_least(Recommendation::Caution)
            } else {
                analysis.recommendation
            };
            (adjusted, recommendation)
        }
    }
}

/// Mean of the analysis confidence (0-100) and the review confidence (0-1,
/// rescaled), rounded to two decimals.
pub fn blend_confidence(analysis: &AnalysisResult, review: &ReviewResult) -> f64 {
    let blended = (analysis.confidence + review.confidence_score * 100.0) / 2.0;
    let rounded = (blended * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Rubric for the quality check.
///
/// Uses the analyst's self-assessment when present. Otherwise every
/// dimension starts at 95 and loses points for each review issue filed
/// against it (critical 25, major 15, minor 5); an analysis with neither
/// findings nor opportunities loses 15 actionability, and an empty summary
/// loses 10 presentation.
pub fn rubric_for(analysis: &AnalysisResult, review: &ReviewResult) -> ScoringCriteria {
    if let Some(criteria) = analysis.criteria {
        return criteria;
    }

    let mut criteria = ScoringCriteria::uniform(DERIVED_BASELINE);
    for issue in &review.issues {
        let penalty = match issue.severity {
            ReviewSeverity::Critical => 25.0,
            ReviewSeverity::Major => 15.0,
            ReviewSeverity::Minor => 5.0,
        };
        deduct(&mut criteria, dimension_for_category(&issue.category), penalty);
    }
    if analysis.key_findings.is_empty() && analysis.opportunities.is_empty() {
        deduct(&mut criteria, Dimension::Actionability, 15.0);
    }
    if analysis.summary.trim().is_empty() {
        deduct(&mut criteria, Dimension::Presentation, 10.0);
    }
    criteria
}

/// Runs the whole final validation for one item.
///
/// The rubric is validated under `item_id`, so its history accumulates in
/// the shared engine.
pub fn finalize(
    engine: &QualityValidationEngine,
    item_id: &str,
    analysis: &AnalysisResult,
    review: &ReviewResult,
) -> Result<FinalValidation, ScoringError> {
    let (score, recommendation) = adjust_for_review(analysis, review);
    let confidence = blend_confidence(analysis, review);

    let content = serde_json::json!({
        "analysis": analysis,
        "review": review,
    });
    let quality = engine.validate_analysis(item_id, &content, &rubric_for(analysis, review))?;

    Ok(FinalValidation {
        score,
        recommendation,
        confidence,
        quality,
    })
}

fn dimension_for_category(category: &str) -> Dimension {
    match category.trim().to_lowercase().as_str() {
        "data_accuracy" | "calculation_error" => Dimension::DataAccuracy,
        "logic_flaw" | "inconsistency" => Dimension::LogicalConsistency,
        "missing_analysis" => Dimension::AnalysisCompleteness,
        "actionability" => Dimension::Actionability,
        _ => Dimension::Presentation,
    }
}

fn deduct(criteria: &mut ScoringCriteria, dimension: Dimension, points: f64) {
    let slot = match dimension {
        Dimension::DataAccuracy => &mut criteria.data_accuracy,
        Dimension::LogicalConsistency => &mut criteria.logical_consistency,
        Dimension::Actionability => &mut criteria.actionability,
        Dimension::AnalysisCompleteness => &mut criteria.analysis_completeness,
        Dimension::Presentation => &mut criteria.presentation,
    };
    *slot = (*slot - points).max(0.0);
}
