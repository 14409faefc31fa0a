//! Analysis and review providers backed by a chat-completions model.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::{extract_json_object, GenerationRequest, LlmProvider, Message};
use crate::pipeline::{CoordinatorConfig, ItemType, Recommendation};
use crate::quality::ScoringCriteria;

use super::{
    AnalysisProvider, AnalysisResult, ItemData, ReviewAssessment, ReviewIssue, ReviewProvider,
    ReviewResult,
};

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert real estate analyst specializing in {item_type} property evaluation.
Your analysis must be comprehensive, data-driven and actionable.

{focus}

If a market estimate is missing, estimate it from comparable properties and say so.
Never penalize a property only because an estimate is unavailable.

Respond with a single JSON object:
{
  "score": 0-100,
  "recommendation": "PROCEED" | "CAUTION" | "REJECT",
  "summary": "200-300 words",
  "key_findings": ["..."],
  "risk_factors": ["..."],
  "opportunities": ["..."],
  "metrics": {"name": value},
  "confidence": 0-100
}"#;

const PRIMARY_FOCUS: &str = "Score lifestyle fit (35), property value (30), living experience (20) and long-term considerations (15).";

const RENTAL_FOCUS: &str = "Score financial performance (40), market position (25), property condition (20) and risk factors (15). Include estimated cash flow, cap rate and ROI in metrics.";

const REVIEW_SYSTEM_PROMPT: &str = r#"You are a quality assurance expert reviewing property analyses for accuracy and completeness.

Verify data accuracy, check calculations, identify logical flaws or inconsistencies
and flag missing analysis. Estimated market values with a stated method are not errors.

Respond with a single JSON object:
{
  "overall_assessment": "APPROVED" | "CONCERNS" | "REJECTED",
  "confidence_score": 0.0-1.0,
  "issues": [
    {
      "severity": "critical" | "major" | "minor",
      "category": "data_accuracy" | "calculation_error" | "logic_flaw" | "missing_analysis" | "inconsistency",
      "description": "...",
      "suggested_correction": "...",
      "affected_field": "..."
    }
  ],
  "suggestions": ["..."]
}"#;

/// Confidence used when the analyst omits one.
const DEFAULT_ANALYSIS_CONFIDENCE: f64 = 50.0;
/// Reviewer confidence used when the reviewer omits one.
const DEFAULT_REVIEW_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
struct LlmAnalysisResponse {
    score: Option<f64>,
    recommendation: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default, alias = "keyFindings")]
    key_findings: Vec<String>,
    #[serde(default, alias = "riskFactors")]
    risk_factors: Vec<String>,
    #[serde(default)]
    opportunities: Vec<String>,
    #[serde(default)]
    metrics: BTreeMap<String, Value>,
    confidence: Option<f64>,
    #[serde(default)]
    criteria: Option<ScoringCriteria>,
}

#[derive(Debug, Deserialize)]
struct LlmReviewResponse {
    #[serde(alias = "overallAssessment")]
    overall_assessment: Option<String>,
    #[serde(alias = "confidenceScore")]
    confidence_score: Option<f64>,
    #[serde(default)]
    issues: Vec<Value>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Primary analysis through an LLM.
pub struct LlmAnalysisProvider {
    client: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LlmAnalysisProvider {
    pub fn new(client: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    pub fn from_config(client: Arc<dyn LlmProvider>, config: &CoordinatorConfig) -> Self {
        Self::new(client, config.analysis_model.clone())
            .with_temperature(config.analysis_temperature)
            .with_max_tokens(config.max_tokens)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl AnalysisProvider for LlmAnalysisProvider {
    async fn analyze(&self, data: &ItemData, item_type: ItemType) -> Result<AnalysisResult, ProviderError> {
        let focus = match item_type {
            ItemType::Primary => PRIMARY_FOCUS,
            ItemType::Rental => RENTAL_FOCUS,
        };
        let system = ANALYSIS_SYSTEM_PROMPT
            .replace("{item_type}", item_type.as_str())
            .replace("{focus}", focus);
        let user = format!(
            "Analyze this property:\n\n{}\n\nProvide a comprehensive {} property analysis.",
            describe_item(data),
            item_type
        );

        let request = GenerationRequest::new(&self.model, vec![Message::system(system), Message::user(user)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.client.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| ProviderError::Analysis("empty LLM response".to_string()))?;

        parse_analysis(content)
    }
}

/// Quality review through an LLM.
pub struct LlmReviewProvider {
    client: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LlmReviewProvider {
    pub fn new(client: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.2,
            max_tokens: 4096,
        }
    }

    pub fn from_config(client: Arc<dyn LlmProvider>, config: &CoordinatorConfig) -> Self {
        Self::new(client, config.review_model.clone())
            .with_temperature(config.review_temperature)
            .with_max_tokens(config.max_tokens)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ReviewProvider for LlmReviewProvider {
    async fn review(&self, data: &ItemData, analysis: &AnalysisResult) -> Result<ReviewResult, ProviderError> {
        let user = format!(
            "Review this property analysis:\n\nPROPERTY DATA:\n{}\n\nPRIMARY ANALYSIS:\nScore: {}/100\nRecommendation: {}\nSummary: {}\nKey Findings: {}\nRisk Factors: {}\nOpportunities: {}",
            describe_item(data),
            analysis.score,
            analysis.recommendation,
            analysis.summary,
            analysis.key_findings.join(", "),
            analysis.risk_factors.join(", "),
            analysis.opportunities.join(", "),
        );

        let request = GenerationRequest::new(
            &self.model,
            vec![Message::system(REVIEW_SYSTEM_PROMPT), Message::user(user)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.client.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| ProviderError::Review("empty LLM response".to_string()))?;

        parse_review(content)
    }
}

fn describe_item(data: &ItemData) -> String {
    let mut lines = vec![format!("SOURCE: {}", data.source_ref)];
    if let Some(address) = &data.address {
        lines.push(format!("ADDRESS: {}", address));
    }
    if let Some(price) = data.price {
        lines.push(format!("PRICE: ${:.0}", price));
    }
    if let Some(bedrooms) = data.bedrooms {
        lines.push(format!("BEDROOMS: {}", bedrooms));
    }
    if let Some(bathrooms) = data.bathrooms {
        lines.push(format!("BATHROOMS: {}", bathrooms));
    }
    if let Some(area) = data.living_area {
        lines.push(format!("LIVING AREA: {} sqft", area));
    }
    if let Some(kind) = &data.property_type {
        lines.push(format!("PROPERTY TYPE: {}", kind));
    }
    for (key, value) in &data.attributes {
        if key == "raw_content" {
            continue;
        }
        lines.push(format!("{}: {}", key.to_uppercase(), value));
    }
    lines.join("\n")
}

fn extract(content: &str) -> Result<String, ProviderError> {
    extract_json_object(content).ok_or_else(|| {
        let preview: String = content.chars().take(200).collect();
        ProviderError::ResponseParse(format!(
            "Could not extract JSON from response. Content starts with: '{}'",
            preview
        ))
    })
}

fn parse_analysis(content: &str) -> Result<AnalysisResult, ProviderError> {
    let json = extract(content)?;
    let raw: LlmAnalysisResponse = serde_json::from_str(&json).map_err(|e| {
        let truncated: String = json.chars().take(500).collect();
        ProviderError::ResponseParse(format!("Failed to parse analysis JSON: {}. Content: {}", e, truncated))
    })?;

    let score = raw
        .score
        .filter(|s| s.is_finite())
        .ok_or_else(|| ProviderError::ResponseParse("analysis has no numeric score".to_string()))?
        .clamp(0.0, 100.0);

    let recommendation = match raw.recommendation.as_deref().map(str::parse::<Recommendation>) {
        Some(Ok(recommendation)) => recommendation,
        Some(Err(e)) => {
            warn!(error = %e, score, "Unrecognized recommendation, deriving from score");
            Recommendation::from_score(score)
        }
        None => Recommendation::from_score(score),
    };

    let criteria = raw.criteria.filter(|c| match c.validate() {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Discarding self-assessed rubric");
            false
        }
    });

    Ok(AnalysisResult {
        score,
        recommendation,
        summary: raw.summary,
        key_findings: raw.key_findings,
        risk_factors: raw.risk_factors,
        opportunities: raw.opportunities,
        metrics: raw.metrics,
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_ANALYSIS_CONFIDENCE)
            .clamp(0.0, 100.0),
        criteria,
    })
}

fn parse_review(content: &str) -> Result<ReviewResult, ProviderError> {
    let json = extract(content)?;
    let raw: LlmReviewResponse = serde_json::from_str(&json).map_err(|e| {
        let truncated: String = json.chars().take(500).collect();
        ProviderError::ResponseParse(format!("Failed to parse review JSON: {}. Content: {}", e, truncated))
    })?;

    let overall_assessment = match raw.overall_assessment.as_deref().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("APPROVED") => ReviewAssessment::Approved,
        Some(s) if s.eq_ignore_ascii_case("REJECTED") => ReviewAssessment::Rejected,
        _ => ReviewAssessment::Concerns,
    };

    let issues = raw
        .issues
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ReviewIssue>(value) {
            Ok(issue) => Some(issue),
            Err(e) => {
                debug!(error = %e, "Skipping malformed review issue");
                None
            }
        })
        .collect();

    Ok(ReviewResult {
        overall_assessment,
        confidence_score: raw
            .confidence_score
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_REVIEW_CONFIDENCE)
            .clamp(0.0, 1.0),
        issues,
        suggestions: raw.suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use crate::providers::ReviewSeverity;
    use std::sync::Mutex;

    struct MockLlmProvider {
        response: Mutex<String>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn new(response: &str) -> Self {
            Self {
                response: Mutex::new(response.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            self.requests.lock().expect("lock poisoned").push(request);
            let content = self.response.lock().expect("lock poisoned").clone();
            Ok(GenerationResponse {
                id: "test-id".to_string(),
                model: "test-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 200,
                    total_tokens: 300,
                },
            })
        }
    }

    fn item() -> ItemData {
        ItemData::new("https://listings.test/home/1_zpid/", "1")
            .with_address("1 Main St, Surprise, AZ")
            .with_price(425000.0)
    }

    #[tokio::test]
    async fn test_analysis_parses_fenced_json() {
        let mock = Arc::new(MockLlmProvider::new(
            "Here you go:\n```json\n{\"score\": 88, \"recommendation\": \"proceed\", \"summary\": \"Solid\", \"keyFindings\": [\"a\"], \"confidence\": 80}\n```",
        ));
        let provider = LlmAnalysisProvider::new(mock.clone(), "gpt-4o").with_temperature(0.1);

        let result = provider.analyze(&item(), ItemType::Rental).await.unwrap();
        assert_eq!(result.score, 88.0);
        assert_eq!(result.recommendation, Recommendation::Proceed);
        assert_eq!(result.key_findings, vec!["a".to_string()]);
        assert_eq!(result.confidence, 80.0);

        let requests = mock.requests.lock().unwrap();
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].temperature, Some(0.1));
        assert!(requests[0].messages[0].content.contains("rental"));
        assert!(requests[0].messages[1].content.contains("PRICE: $425000"));
    }

    #[tokio::test]
    async fn test_analysis_derives_missing_recommendation() {
        let mock = Arc::new(MockLlmProvider::new(r#"{"score": 140, "summary": "x"}"#));
        let provider = LlmAnalysisProvider::new(mock, "m");

        let result = provider.analyze(&item(), ItemType::Primary).await.unwrap();
        assert_eq!(result.score, 100.0);
        assert_eq!(result.recommendation, Recommendation::Proceed);
        assert_eq!(result.confidence, DEFAULT_ANALYSIS_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_analysis_without_score_fails() {
        let mock = Arc::new(MockLlmProvider::new(r#"{"summary": "no score"}"#));
        let provider = LlmAnalysisProvider::new(mock, "m");

        let err = provider.analyze(&item(), ItemType::Primary).await.unwrap_err();
        assert!(matches!(err, ProviderError::ResponseParse(_)));
    }

    #[tokio::test]
    async fn test_analysis_non_json_fails() {
        let mock = Arc::new(MockLlmProvider::new("I cannot analyze this."));
        let provider = LlmAnalysisProvider::new(mock, "m");

        let err = provider.analyze(&item(), ItemType::Primary).await.unwrap_err();
        assert!(err.to_string().contains("Could not extract JSON"));
    }

    #[test]
    fn test_invalid_rubric_is_discarded() {
        let content = r#"{"score": 70, "criteria": {"data_accuracy": 150, "logical_consistency": 80,
            "actionability": 80, "analysis_completeness": 80, "presentation": 80}}"#;
        let result = parse_analysis(content).unwrap();
        assert!(result.criteria.is_none());
        assert_eq!(result.recommendation, Recommendation::Caution);
    }

    #[tokio::test]
    async fn test_review_parses_camel_case() {
        let mock = Arc::new(MockLlmProvider::new(
            r#"{"overallAssessment": "CONCERNS", "confidenceScore": 0.8,
                "issues": [{"severity": "major", "category": "logic_flaw", "description": "gap",
                            "suggested_correction": "fix it"},
                           {"severity": "unknown", "description": "bad"}],
                "suggestions": ["add comps"]}"#,
        ));
        let provider = LlmReviewProvider::new(mock, "gpt-4o-mini");
        let analysis = parse_analysis(r#"{"score": 75, "summary": "ok"}"#).unwrap();

        let review = provider.review(&item(), &analysis).await.unwrap();
        assert_eq!(review.overall_assessment, ReviewAssessment::Concerns);
        assert_eq!(review.confidence_score, 0.8);
        assert_eq!(review.issues.len(), 1);
        assert_eq!(review.issues[0].severity, ReviewSeverity::Major);
        assert_eq!(review.suggestions, vec!["add comps".to_string()]);
    }

    #[test]
    fn test_review_defaults() {
        let review = parse_review("{}").unwrap();
        assert_eq!(review.overall_assessment, ReviewAssessment::Concerns);
        assert_eq!(review.confidence_score, DEFAULT_REVIEW_CONFIDENCE);
        assert!(review.issues.is_empty());

        let review = parse_review(r#"{"overall_assessment": "approved", "confidence_score": 3}"#).unwrap();
        assert_eq!(review.overall_assessment, ReviewAssessment::Approved);
        assert_eq!(review.confidence_score, 1.0);
    }

    #[test]
    fn test_describe_item_skips_raw_content() {
        let mut data = item();
        data.attributes.insert("raw_content".to_string(), Value::String("<html>".to_string()));
        data.attributes.insert("year_built".to_string(), Value::from(1998));

        let text = describe_item(&data);
        assert!(text.contains("ADDRESS: 1 Main St, Surprise, AZ"));
        assert!(text.contains("YEAR_BUILT: 1998"));
        assert!(!text.contains("<html>"));
    }
}
