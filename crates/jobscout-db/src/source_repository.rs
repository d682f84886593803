use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use jobscout_core::error::AppError;
use jobscout_core::source::{NewSource, Source, SourceStatus, SourceTier};
use jobscout_core::traits::SourceStore;

/// Repository for scrape sources.
#[derive(Clone)]
pub struct SourceRepository {
    pool: Pool<Postgres>,
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Source>, AppError> {
        let rows =
            sqlx::query_as::<_, SourceRow>(r#"SELECT * FROM sources ORDER BY created_at ASC"#)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: Uuid,
    name: String,
    scraper_type: String,
    url: String,
    status: String,
    tier: String,
    consecutive_failures: i32,
    health_score: f32,
    last_scraped_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    company_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            id: row.id,
            name: row.name,
            scraper_type: row.scraper_type,
            url: row.url,
            status: row.status.parse().unwrap_or(SourceStatus::Disabled),
            tier: row.tier.parse().unwrap_or(SourceTier::C),
            consecutive_failures: row.consecutive_failures as u32,
            health_score: row.health_score,
            last_scraped_at: row.last_scraped_at,
            last_error: row.last_error,
            company_id: row.company_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl SourceStore for SourceRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Source>, AppError> {
        let row = sqlx::query_as::<_, SourceRow>(r#"SELECT * FROM sources WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn active(&self) -> Result<Vec<Source>, AppError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"SELECT * FROM sources WHERE status = 'active' ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn for_company(&self, company_id: Uuid) -> Result<Vec<Source>, AppError> {
        let rows =
            sqlx::query_as::<_, SourceRow>(r#"SELECT * FROM sources WHERE company_id = $1"#)
                .bind(company_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_health(&self, source: &Source) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE sources
            SET status = $2, consecutive_failures = $3, health_score = $4,
                last_scraped_at = $5, last_error = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(source.id)
        .bind(source.status.as_str())
        .bind(source.consecutive_failures as i32)
        .bind(source.health_score)
        .bind(source.last_scraped_at)
        .bind(&source.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn insert(&self, source: NewSource) -> Result<Source, AppError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            INSERT INTO sources (name, scraper_type, url, status, tier, company_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&source.name)
        .bind(&source.scraper_type)
        .bind(&source.url)
        .bind(source.status.as_str())
        .bind(source.tier.as_str())
        .bind(source.company_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.into())
    }
}
