//! Database schema constants for the SQLite storage backend.

/// SQL schema for creating the batches table.
pub const CREATE_BATCHES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_batches (
    id              TEXT    PRIMARY KEY,
    owner_id        TEXT    NOT NULL,
    item_types      TEXT    NOT NULL,
    total_items     INTEGER NOT NULL,
    completed_items INTEGER NOT NULL DEFAULT 0,
    status          TEXT    NOT NULL DEFAULT 'pending',
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL
)
"#;

/// SQL schema for creating the per-item analysis table.
///
/// Nested payloads (acquired data, analysis, review, validation) are stored
/// as JSON text.
pub const CREATE_PROPERTY_ANALYSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS property_analyses (
    id              TEXT    PRIMARY KEY,
    batch_id        TEXT    NOT NULL REFERENCES analysis_batches(id) ON DELETE CASCADE,
    owner_id        TEXT    NOT NULL,
    source_ref      TEXT    NOT NULL,
    external_id     TEXT    NOT NULL DEFAULT 'unknown',
    item_type       TEXT    NOT NULL,
    stage           TEXT    NOT NULL,
    item_data       TEXT,
    primary_analysis TEXT,
    quality_review  TEXT,
    quality_validation TEXT,
    final_score     REAL,
    recommendation  TEXT,
    confidence      REAL,
    error_message   TEXT,
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL
)
"#;

/// Index for listing a batch's items.
pub const CREATE_ITEMS_BATCH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_property_analyses_batch_id ON property_analyses(batch_id)";

/// Index for listing an owner's batches.
pub const CREATE_BATCHES_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_analysis_batches_owner_id ON analysis_batches(owner_id)";

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_BATCHES_TABLE,
        CREATE_PROPERTY_ANALYSES_TABLE,
        CREATE_ITEMS_BATCH_INDEX,
        CREATE_BATCHES_OWNER_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    /// Batches table name.
    pub const BATCHES: &str = "analysis_batches";
    /// Item analyses table name.
    pub const PROPERTY_ANALYSES: &str = "property_analyses";
}
