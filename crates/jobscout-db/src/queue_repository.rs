use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use jobscout_core::error::{AppError, ErrorCategory};
use jobscout_core::item::{ItemStatus, QueueItem};
use jobscout_core::payload::StagePayload;
use jobscout_core::queue::{QueueStats, QueueStore};
use jobscout_core::{ItemType, Stage};

/// PostgreSQL-backed queue store.
///
/// A partial unique index over non-terminal rows turns duplicate enqueues
/// into `AppError::Duplicate`, and claiming uses `FOR UPDATE SKIP LOCKED`
/// so no two workers ever hold the same item.
#[derive(Clone)]
pub struct QueueRepository {
    pool: Pool<Postgres>,
}

impl QueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct QueueItemRow {
    id: Uuid,
    item_type: String,
    stage: String,
    status: String,
    url: Option<String>,
    company_name: Option<String>,
    company_id: Option<Uuid>,
    source_id: Option<Uuid>,
    tracking_id: Uuid,
    ancestry: Vec<Uuid>,
    spawn_depth: i32,
    dedupe_key: String,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_category: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = AppError;

    fn try_from(row: QueueItemRow) -> Result<Self, AppError> {
        let item_type: ItemType = row
            .item_type
            .parse()
            .map_err(|e: String| AppError::Database(e))?;
        let payload: StagePayload = serde_json::from_value(row.payload)?;
        Ok(QueueItem {
            id: row.id,
            item_type,
            stage: row.stage.parse().unwrap_or(Stage::Run),
            status: row.status.parse().unwrap_or(ItemStatus::Pending),
            url: row.url,
            company_name: row.company_name,
            company_id: row.company_id,
            source_id: row.source_id,
            tracking_id: row.tracking_id,
            ancestry: row.ancestry,
            spawn_depth: row.spawn_depth as u32,
            dedupe_key: row.dedupe_key,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            next_retry_at: row.next_retry_at,
            last_error: row.last_error,
            last_error_category: row
                .last_error_category
                .and_then(|c| c.parse::<ErrorCategory>().ok()),
            payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn map_db_error(e: sqlx::Error, dedupe_key: &str) -> AppError {
    if let Some(db_err) = e.as_database_error()
        && db_err.code().as_deref() == Some("23505")
    {
        return AppError::Duplicate(dedupe_key.to_string());
    }
    AppError::Database(e.to_string())
}

impl QueueStore for QueueRepository {
    async fn insert(&self, item: QueueItem) -> Result<QueueItem, AppError> {
        let payload = serde_json::to_value(&item.payload)?;
        let row = sqlx::query_as::<_, QueueItemRow>(
            r#"
            INSERT INTO queue_items (
                id, item_type, stage, status, url, company_name, company_id,
                source_id, tracking_id, ancestry, spawn_depth, dedupe_key,
                retry_count, max_retries, payload, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(item.item_type.as_str())
        .bind(item.stage.as_str())
        .bind(item.status.as_str())
        .bind(&item.url)
        .bind(&item.company_name)
        .bind(item.company_id)
        .bind(item.source_id)
        .bind(item.tracking_id)
        .bind(&item.ancestry)
        .bind(item.spawn_depth as i32)
        .bind(&item.dedupe_key)
        .bind(item.retry_count as i32)
        .bind(item.max_retries as i32)
        .bind(payload)
        .bind(item.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, &item.dedupe_key))?;

        row.try_into()
    }

    async fn claim(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<QueueItem>, AppError> {
        let rows = sqlx::query_as::<_, QueueItemRow>(
            r#"
            UPDATE queue_items
            SET status = 'processing', started_at = $2, updated_at = $2
            WHERE id IN (
                SELECT id FROM queue_items
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= $2)
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(limit as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut items: Vec<QueueItem> = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<_, _>>()?;
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn mark_advanced(
        &self,
        id: Uuid,
        next_stage: Stage,
        payload: StagePayload,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_value(&payload)?;
        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET stage = $2, status = 'pending', payload = $3,
                next_retry_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(next_stage.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(format!(
                "conditional update failed: {id} not processing"
            )));
        }
        Ok(())
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: ItemStatus,
        note: Option<&str>,
        category: Option<ErrorCategory>,
        payload: Option<StagePayload>,
    ) -> Result<(), AppError> {
        let payload = payload.map(serde_json::to_value).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = $2, last_error = $3, last_error_category = $4,
                payload = COALESCE($5, payload),
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(note)
        .bind(category.map(|c| c.as_str()))
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(format!(
                "conditional update failed: {id} not processing"
            )));
        }
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
        error: &str,
        category: ErrorCategory,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'pending', retry_count = retry_count + 1,
                next_retry_at = $2, last_error = $3, last_error_category = $4,
                started_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(next_retry_at)
        .bind(error)
        .bind(category.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(format!(
                "conditional update failed: {id} not processing"
            )));
        }
        Ok(())
    }

    async fn release(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'pending', started_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>, AppError> {
        let row = sqlx::query_as::<_, QueueItemRow>(r#"SELECT * FROM queue_items WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn url_in_queue(&self, url: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM queue_items
                WHERE dedupe_key = 'job|' || $1
                  AND status IN ('pending', 'processing')
            )
            "#,
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(exists)
    }

    async fn counts(&self) -> Result<QueueStats, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as(r#"SELECT status, COUNT(*) FROM queue_items GROUP BY status"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status.parse::<ItemStatus>() {
                Ok(ItemStatus::Pending) => stats.pending = count,
                Ok(ItemStatus::Processing) => stats.processing = count,
                Ok(ItemStatus::Success) => stats.success = count,
                Ok(ItemStatus::Failed) => stats.failed = count,
                Ok(ItemStatus::Skipped) => stats.skipped = count,
                Ok(ItemStatus::Filtered) => stats.filtered = count,
                Err(_) => {}
            }
        }
        Ok(stats)
    }
}
