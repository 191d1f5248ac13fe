use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use tracing::info;

use crate::models::{AnalysisRecord, AnalysisResult};
use crate::storage::{AnalysisStore, StoreResult};

type RecordRow = (String, String, DateTime<Utc>, Json<AnalysisResult>);

const SELECT_RECORD: &str = "SELECT id, owner_id, created_at, result FROM analyses";

/// Postgres-backed analysis history. Each record is one row; the full result
/// is kept as JSONB next to the columns the history list needs.
pub struct PostgresAnalysisStore {
    pool: Arc<Pool<Postgres>>,
}

impl PostgresAnalysisStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self {
            pool: Arc::new(pool),
        };
        store.migrate().await?;
        info!("Connected to analysis store");
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                document_type TEXT NOT NULL,
                urgency_level TEXT NOT NULL,
                summary TEXT NOT NULL,
                metrics_count INTEGER NOT NULL,
                result JSONB NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS analyses_owner_created_idx \
             ON analyses (owner_id, created_at DESC)",
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}

fn into_record((id, owner_id, created_at, Json(result)): RecordRow) -> AnalysisRecord {
    AnalysisRecord {
        id,
        owner_id,
        created_at,
        result,
    }
}

#[async_trait]
impl AnalysisStore for PostgresAnalysisStore {
    async fn insert(&self, record: AnalysisRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, owner_id, created_at, document_type, urgency_level, summary, metrics_count, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(record.created_at)
        .bind(record.result.document_type.as_str())
        .bind(record.result.urgency_level.as_str())
        .bind(&record.result.summary)
        .bind(record.result.metrics.len() as i32)
        .bind(Json(&record.result))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<AnalysisRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!("{SELECT_RECORD} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(into_record))
    }

    async fn recent_by_owner(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "{SELECT_RECORD} WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn all_by_owner(&self, owner_id: &str) -> StoreResult<Vec<AnalysisRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!("{SELECT_RECORD} WHERE owner_id = $1"))
            .bind(owner_id)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM analyses WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_owner(&self, owner_id: &str) -> StoreResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analyses WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&*self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }
}
