//! Collaborator contracts of the batch pipeline.
//!
//! The coordinator talks to three collaborators, each behind an async trait:
//! data acquisition, primary analysis and quality review. Thin adapters
//! over HTTP and an OpenAI-compatible chat API are provided in [`http`] and
//! [`llm`].

pub mod http;
pub mod llm;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::pipeline::{ItemType, Recommendation};
use crate::quality::ScoringCriteria;

pub use http::{extract_external_id, HttpListingFetcher};
pub use llm::{LlmAnalysisProvider, LlmReviewProvider};

/// Structured listing data returned by acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    /// Listing id parsed from the source, `"unknown"` when absent.
    pub external_id: String,
    pub source_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub living_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    /// Any other fields the acquirer could read.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ItemData {
    pub fn new(source_ref: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            external_id: external_id.into(),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// Label used in progress events: the address when known.
    pub fn label(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.source_ref)
    }
}

/// Output of the primary analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Score in `[0, 100]`.
    pub score: f64,
    pub recommendation: Recommendation,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Confidence in `[0, 100]`.
    pub confidence: f64,
    /// Self-assessed quality rubric, when the analyst supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<ScoringCriteria>,
}

/// Verdict of the quality reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewAssessment {
    Approved,
    Concerns,
    Rejected,
}

impl std::fmt::Display for ReviewAssessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewAssessment::Approved => write!(f, "APPROVED"),
            ReviewAssessment::Concerns => write!(f, "CONCERNS"),
            ReviewAssessment::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Severity of a reviewer finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSeverity {
    Critical,
    Major,
    Minor,
}

/// One problem found by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub severity: ReviewSeverity,
    /// Free-form category such as `data_accuracy` or `logic_flaw`.
    pub category: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_field: Option<String>,
}

/// Output of the quality review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub overall_assessment: ReviewAssessment,
    /// Confidence in `[0, 1]`.
    pub confidence_score: f64,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ReviewResult {
    pub fn approved(confidence_score: f64) -> Self {
        Self {
            overall_assessment: ReviewAssessment::Approved,
            confidence_score,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// Turns a source reference into structured item data.
#[async_trait]
pub trait DataAcquisitionProvider: Send + Sync {
    async fn fetch(&self, source_ref: &str) -> Result<ItemData, ProviderError>;
}

/// Produces the primary analysis of an item.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, data: &ItemData, item_type: ItemType) -> Result<AnalysisResult, ProviderError>;
}

/// Second-opinion review of a primary analysis.
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    async fn review(&self, data: &ItemData, analysis: &AnalysisResult) -> Result<ReviewResult, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_label_prefers_address() {
        let data = ItemData::new("https://listings.test/home/1_zpid/", "1");
        assert_eq!(data.label(), "https://listings.test/home/1_zpid/");

        let data = data.with_address("1 Main St");
        assert_eq!(data.label(), "1 Main St");
    }

    #[test]
    fn test_review_result_wire_names() {
        let json = r#"{
            "overall_assessment": "CONCERNS",
            "confidence_score": 0.7,
            "issues": [{"severity": "major", "category": "logic_flaw", "description": "gap"}]
        }"#;
        let review: ReviewResult = serde_json::from_str(json).unwrap();

        assert_eq!(review.overall_assessment, ReviewAssessment::Concerns);
        assert_eq!(review.issues[0].severity, ReviewSeverity::Major);
        assert!(review.suggestions.is_empty());
        assert_eq!(review.overall_assessment.to_string(), "CONCERNS");
    }

    #[test]
    fn test_analysis_result_defaults() {
        let json = r#"{"score": 88, "recommendation": "PROCEED", "summary": "ok", "confidence": 80}"#;
        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();

        assert!((analysis.score - 88.0).abs() < f64::EPSILON);
        assert_eq!(analysis.recommendation, Recommendation::Proceed);
        assert!(analysis.key_findings.is_empty());
        assert!(analysis.criteria.is_none());
    }
}
