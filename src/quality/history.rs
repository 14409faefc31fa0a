//! Bounded per-analysis snapshot history with rollback.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::ValidationResult;

/// Maximum snapshots retained per analysis id.
pub const MAX_HISTORY_LENGTH: usize = 10;

/// One recorded validation of an analysis.
///
/// `content` is an owned copy of the validated payload; later changes to the
/// caller's value never reach the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub validation: ValidationResult,
}

impl AnalysisSnapshot {
    /// Creates a snapshot for `analysis_id`.
    pub fn new(analysis_id: &str, content: serde_json::Value, validation: ValidationResult) -> Self {
        Self {
            id: format!("{}-{}", analysis_id, Uuid::new_v4().simple()),
            content,
            created_at: Utc::now(),
            validation,
        }
    }

    /// Whether the snapshot passed validation.
    pub fn is_valid(&self) -> bool {
        self.validation.is_valid
    }
}

/// Snapshot histories keyed by analysis id, shared across batches.
#[derive(Debug)]
pub struct HistoryStore {
    entries: RwLock<HashMap<String, Vec<AnalysisSnapshot>>>,
    max_length: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    /// Creates an empty store capped at [`MAX_HISTORY_LENGTH`] per id.
    pub fn new() -> Self {
        Self::with_max_length(MAX_HISTORY_LENGTH)
    }

    /// Creates an empty store with a custom per-id cap (at least 1).
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_length: max_length.max(1),
        }
    }

    /// Appends a snapshot, evicting the oldest once the cap is exceeded.
    pub fn push(&self, analysis_id: &str, snapshot: AnalysisSnapshot) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let history = entries.entry(analysis_id.to_string()).or_default();
        history.push(snapshot);
        if history.len() > self.max_length {
            let excess = history.len() - self.max_length;
            history.drain(..excess);
        }
    }

    /// Copy of the snapshots for `analysis_id`, oldest first.
    pub fn get(&self, analysis_id: &str) -> Vec<AnalysisSnapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(analysis_id).cloned().unwrap_or_default()
    }

    /// Returns the newest valid snapshot and discards every snapshot after it.
    pub fn rollback_to_last_valid(&self, analysis_id: &str) -> Option<AnalysisSnapshot> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let history = entries.get_mut(analysis_id)?;
        let index = history.iter().rposition(AnalysisSnapshot::is_valid)?;
        history.truncate(index + 1);
        history.last().cloned()
    }

    /// Forgets every snapshot for `analysis_id`.
    pub fn clear(&self, analysis_id: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(analysis_id);
    }

    pub fn len(&self, analysis_id: &str) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(analysis_id).map_or(0, Vec::len)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}
