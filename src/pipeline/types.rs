//! Batch and item records, requests and summaries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::{extract_external_id, AnalysisResult, ItemData, ReviewResult};
use crate::quality::{ValidationResult, QUALITY_THRESHOLD};

use super::final_validation::FinalValidation;
use super::state::{BatchStatus, ItemStage, StageTransitionError};

/// External id recorded when the source does not carry one.
pub const UNKNOWN_EXTERNAL_ID: &str = "unknown";

/// How an item is meant to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Primary,
    Rental,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Primary => "primary",
            ItemType::Rental => "rental",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ItemType::Primary),
            "rental" => Ok(ItemType::Rental),
            other => Err(format!("unknown item type '{}'", other)),
        }
    }
}

/// Item types a batch accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemTypeSelector {
    Primary,
    Rental,
    Both,
}

impl ItemTypeSelector {
    pub fn accepts(&self, item_type: ItemType) -> bool {
        match self {
            ItemTypeSelector::Both => true,
            ItemTypeSelector::Primary => item_type == ItemType::Primary,
            ItemTypeSelector::Rental => item_type == ItemType::Rental,
        }
    }

    /// Item type to use for entries that do not name one.
    pub fn default_item_type(&self) -> ItemType {
        match self {
            ItemTypeSelector::Rental => ItemType::Rental,
            ItemTypeSelector::Primary | ItemTypeSelector::Both => ItemType::Primary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemTypeSelector::Primary => "primary",
            ItemTypeSelector::Rental => "rental",
            ItemTypeSelector::Both => "both",
        }
    }
}

impl fmt::Display for ItemTypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemTypeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ItemTypeSelector::Primary),
            "rental" => Ok(ItemTypeSelector::Rental),
            "both" => Ok(ItemTypeSelector::Both),
            other => Err(format!("unknown item type selector '{}'", other)),
        }
    }
}

/// Final categorical verdict on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Proceed,
    Caution,
    Reject,
}

impl Recommendation {
    /// Verdict implied by a bare score: the quality threshold separates
    /// PROCEED from CAUTION, and 60 separates CAUTION from REJECT.
    pub fn from_score(score: f64) -> Self {
        if score >= QUALITY_THRESHOLD {
            Recommendation::Proceed
        } else if score >= 60.0 {
            Recommendation::Caution
        } else {
            Recommendation::Reject
        }
    }

    /// Higher is more severe.
    pub fn severity(&self) -> u8 {
        match self {
            Recommendation::Proceed => 0,
            Recommendation::Caution => 1,
            Recommendation::Reject => 2,
        }
    }

    /// The more severe of the two verdicts.
    pub fn at_least(self, floor: Recommendation) -> Recommendation {
        if floor.severity() > self.severity() {
            floor
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "PROCEED",
            Recommendation::Caution => "CAUTION",
            Recommendation::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PROCEED" => Ok(Recommendation::Proceed),
            "CAUTION" => Ok(Recommendation::Caution),
            "REJECT" => Ok(Recommendation::Reject),
            other => Err(format!("unknown recommendation '{}'", other)),
        }
    }
}

/// A batch of items analyzed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub owner_id: String,
    pub item_types: ItemTypeSelector,
    /// Fixed at creation.
    pub total_items: usize,
    pub completed_items: usize,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// A new pending batch.
    pub fn new(owner_id: impl Into<String>, item_types: ItemTypeSelector, total_items: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            item_types,
            total_items,
            completed_items: 0,
            status: BatchStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One item's analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAnalysis {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub owner_id: String,
    pub source_ref: String,
    pub external_id: String,
    pub item_type: ItemType,
    pub stage: ItemStage,
    pub data: Option<ItemData>,
    pub analysis: Option<AnalysisResult>,
    pub review: Option<ReviewResult>,
    pub validation: Option<ValidationResult>,
    pub final_score: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub confidence: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PropertyAnalysis {
    /// A pending record for `item` in `batch`.
    pub fn new(batch: &Batch, item: &ItemRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            batch_id: batch.id,
            owner_id: batch.owner_id.clone(),
            source_ref: item.source_ref.clone(),
            external_id: extract_external_id(&item.source_ref),
            item_type: item.item_type,
            stage: ItemStage::Pending,
            data: None,
            analysis: None,
            review: None,
            validation: None,
            final_score: None,
            recommendation: None,
            confidence: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next`, refusing skipped or backward steps.
    pub fn advance_to(&mut self, next: ItemStage) -> Result<(), StageTransitionError> {
        if !self.stage.can_transition_to(next) {
            return Err(StageTransitionError {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records acquired data and the external id it carries.
    pub fn set_data(&mut self, data: ItemData) {
        if !data.external_id.is_empty() && data.external_id != UNKNOWN_EXTERNAL_ID {
            self.external_id = data.external_id.clone();
        }
        self.data = Some(data);
    }

    /// Completes a validating item with its final verdict.
    pub fn complete(&mut self, result: &FinalValidation) -> Result<(), StageTransitionError> {
        self.advance_to(ItemStage::Completed)?;
        self.final_score = Some(result.score);
        self.recommendation = Some(result.recommendation);
        self.confidence = Some(result.confidence);
        self.validation = Some(result.quality.clone());
        self.error_message = None;
        Ok(())
    }

    /// Marks the item failed.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StageTransitionError> {
        self.advance_to(ItemStage::Failed)?;
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Label for progress events: the address once known, else the source.
    pub fn label(&self) -> &str {
        self.data.as_ref().map_or(self.source_ref.as_str(), ItemData::label)
    }
}

/// One entry of a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub source_ref: String,
    pub item_type: ItemType,
}

impl ItemRef {
    pub fn new(source_ref: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            source_ref: source_ref.into(),
            item_type,
        }
    }
}

/// Request to analyze a batch of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub owner_id: String,
    pub item_types: ItemTypeSelector,
    pub items: Vec<ItemRef>,
}

/// Immediate answer to a batch request; processing continues in the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub message: String,
    pub total_items: usize,
}

/// Count and average score of one item type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub count: usize,
    pub average_score: f64,
}

/// Verdict counts across completed items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationBreakdown {
    pub proceed: usize,
    pub caution: usize,
    pub reject: usize,
}

/// Aggregate view of a batch's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub total_items: usize,
    pub total_analyzed: usize,
    pub failed: usize,
    /// Mean final score of completed items, one decimal.
    pub average_score: f64,
    pub recommendations: RecommendationBreakdown,
    pub primary: TypeBreakdown,
    pub rental: TypeBreakdown,
}

impl BatchSummary {
    /// Summarizes `items` of `batch`.
    pub fn from_items(batch: &Batch, items: &[PropertyAnalysis]) -> Self {
        let completed: Vec<&PropertyAnalysis> = items
            .iter()
            .filter(|i| i.stage == ItemStage::Completed)
            .collect();

        let mut recommendations = RecommendationBreakdown::default();
        for item in &completed {
            match item.recommendation {
                Some(Recommendation::Proceed) => recommendations.proceed += 1,
                Some(Recommendation::Caution) => recommendations.caution += 1,
                Some(Recommendation::Reject) => recommendations.reject += 1,
                None => {}
            }
        }

        let breakdown = |item_type: ItemType| {
            let scores: Vec<f64> = completed
                .iter()
                .filter(|i| i.item_type == item_type)
                .filter_map(|i| i.final_score)
                .collect();
            TypeBreakdown {
                count: scores.len(),
                average_score: average(&scores),
            }
        };

        let all_scores: Vec<f64> = completed.iter().filter_map(|i| i.final_score).collect();

        Self {
            batch_id: batch.id,
            status: batch.status,
            total_items: batch.total_items,
            total_analyzed: completed.len(),
            failed: items.iter().filter(|i| i.stage == ItemStage::Failed).count(),
            average_score: average(&all_scores),
            recommendations,
            primary: breakdown(ItemType::Primary),
            rental: breakdown(ItemType::Rental),
        }
    }
}

fn average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}
