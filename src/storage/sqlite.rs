//! SQLite-backed batch store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::{Batch, BatchStatus, ItemStage, ItemType, ItemTypeSelector, PropertyAnalysis, Recommendation};

use super::schema::all_schema_statements;
use super::{check_transition, BatchStore};

/// Batch store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteBatchStore {
    pool: SqlitePool,
}

impl SqliteBatchStore {
    /// Opens (creating if needed) the database at `database_url` and applies
    /// the schema.
    ///
    /// Accepts `sqlite://path`, a bare file path, or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let url = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        tracing::info!(url = %url, "Batch store opened");
        Ok(store)
    }

    /// Creates a store from an existing pool. The schema is not applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies every schema statement.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        for statement in all_schema_statements() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn batch_status(&self, batch_id: Uuid) -> Result<BatchStatus, StoreError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM analysis_batches WHERE id = ?1")
            .bind(batch_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let status = status.ok_or_else(|| StoreError::NotFound(format!("batch {}", batch_id)))?;
        parse_column(&status, "status")
    }
}

#[async_trait]
impl BatchStore for SqliteBatchStore {
    async fn create_batch(&self, batch: &Batch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_batches
                (id, owner_id, item_types, total_items, completed_items, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(batch.id.to_string())
        .bind(&batch.owner_id)
        .bind(batch.item_types.as_str())
        .bind(batch.total_items as i64)
        .bind(batch.completed_items as i64)
        .bind(batch.status.as_str())
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        let current = self.batch_status(batch_id).await?;
        check_transition(current, status)?;

        // Guard on the observed status so a concurrent writer cannot be overwritten.
        let result = sqlx::query(
            "UPDATE analysis_batches SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(batch_id.to_string())
        .bind(current.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidTransition {
                from: current.to_string(),
                to: status.to_string(),
            });
        }
        Ok(())
    }

    async fn update_batch_completed(&self, batch_id: Uuid, completed: usize) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_batches SET completed_items = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(completed as i64)
        .bind(Utc::now())
        .bind(batch_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("batch {}", batch_id)));
        }
        Ok(())
    }

    async fn save_item(&self, item: &PropertyAnalysis) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO property_analyses (
                id, batch_id, owner_id, source_ref, external_id, item_type, stage,
                item_data, primary_analysis, quality_review, quality_validation,
                final_score, recommendation, confidence, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(id) DO UPDATE SET
                external_id = excluded.external_id,
                stage = excluded.stage,
                item_data = excluded.item_data,
                primary_analysis = excluded.primary_analysis,
                quality_review = excluded.quality_review,
                quality_validation = excluded.quality_validation,
                final_score = excluded.final_score,
                recommendation = excluded.recommendation,
                confidence = excluded.confidence,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.batch_id.to_string())
        .bind(&item.owner_id)
        .bind(&item.source_ref)
        .bind(&item.external_id)
        .bind(item.item_type.as_str())
        .bind(item.stage.as_str())
        .bind(to_json(&item.data)?)
        .bind(to_json(&item.analysis)?)
        .bind(to_json(&item.review)?)
        .bind(to_json(&item.validation)?)
        .bind(item.final_score)
        .bind(item.recommendation.map(|r| r.as_str()))
        .bind(item.confidence)
        .bind(&item.error_message)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, item_types, total_items, completed_items, status, created_at, updated_at
            FROM analysis_batches
            WHERE id = ?1
            "#,
        )
        .bind(batch_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let id: String = row.get("id");
        let item_types: String = row.get("item_types");
        let status: String = row.get("status");
        let total_items: i64 = row.get("total_items");
        let completed_items: i64 = row.get("completed_items");

        Ok(Some(Batch {
            id: parse_uuid(&id)?,
            owner_id: row.get("owner_id"),
            item_types: parse_column::<ItemTypeSelector>(&item_types, "item_types")?,
            total_items: total_items as usize,
            completed_items: completed_items as usize,
            status: parse_column(&status, "status")?,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }))
    }

    async fn get_items(&self, batch_id: Uuid) -> Result<Vec<PropertyAnalysis>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM property_analyses
            WHERE batch_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(batch_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}

fn item_from_row(row: &SqliteRow) -> Result<PropertyAnalysis, StoreError> {
    let id: String = row.get("id");
    let batch_id: String = row.get("batch_id");
    let item_type: String = row.get("item_type");
    let stage: String = row.get("stage");
    let recommendation: Option<String> = row.get("recommendation");

    Ok(PropertyAnalysis {
        id: parse_uuid(&id)?,
        batch_id: parse_uuid(&batch_id)?,
        owner_id: row.get("owner_id"),
        source_ref: row.get("source_ref"),
        external_id: row.get("external_id"),
        item_type: parse_column::<ItemType>(&item_type, "item_type")?,
        stage: parse_column::<ItemStage>(&stage, "stage")?,
        data: from_json(row.get("item_data"))?,
        analysis: from_json(row.get("primary_analysis"))?,
        review: from_json(row.get("quality_review"))?,
        validation: from_json(row.get("quality_validation"))?,
        final_score: row.get("final_score"),
        recommendation: recommendation
            .map(|r| parse_column::<Recommendation>(&r, "recommendation"))
            .transpose()?,
        confidence: row.get("confidence"),
        error_message: row.get("error_message"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::from)
}

fn from_json<T: DeserializeOwned>(text: Option<String>) -> Result<Option<T>, StoreError> {
    text.as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StoreError::from)
}

fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Unavailable(format!("corrupt id '{}': {}", value, e)))
}

fn parse_column<T>(value: &str, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| StoreError::Unavailable(format!("corrupt {} column: {}", column, e)))
}
