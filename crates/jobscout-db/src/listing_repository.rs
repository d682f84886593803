use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use jobscout_core::error::AppError;
use jobscout_core::models::{JobListing, JobMatch, NewListing, NewMatch};
use jobscout_core::payload::{MatchAnalysis, WorkArrangement};
use jobscout_core::scoring::ScoreBreakdown;
use jobscout_core::traits::{ListingStore, MatchStore};

/// Repository for job listings, upserted by normalized URL.
#[derive(Clone)]
pub struct ListingRepository {
    pool: Pool<Postgres>,
}

impl ListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    url: String,
    title: String,
    company_name: String,
    company_id: Option<Uuid>,
    source_id: Option<Uuid>,
    description: String,
    location: Option<String>,
    work_arrangement: String,
    posted_at: Option<DateTime<Utc>>,
    salary_min: Option<i32>,
    salary_max: Option<i32>,
    content_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ListingRow> for JobListing {
    fn from(row: ListingRow) -> Self {
        JobListing {
            id: row.id,
            url: row.url,
            title: row.title,
            company_name: row.company_name,
            company_id: row.company_id,
            source_id: row.source_id,
            description: row.description,
            location: row.location,
            work_arrangement: row
                .work_arrangement
                .parse()
                .unwrap_or(WorkArrangement::Unknown),
            posted_at: row.posted_at,
            salary_min: row.salary_min.map(|s| s as u32),
            salary_max: row.salary_max.map(|s| s as u32),
            content_hash: row.content_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl ListingStore for ListingRepository {
    async fn url_exists(&self, url: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM job_listings WHERE url = $1)"#)
                .bind(url)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(exists)
    }

    async fn upsert(&self, listing: NewListing) -> Result<JobListing, AppError> {
        let row = sqlx::query_as::<_, ListingRow>(
            r#"
            INSERT INTO job_listings (
                url, title, company_name, company_id, source_id, description,
                location, work_arrangement, posted_at, salary_min, salary_max,
                content_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (url) DO UPDATE SET
                title = EXCLUDED.title,
                company_name = EXCLUDED.company_name,
                company_id = COALESCE(EXCLUDED.company_id, job_listings.company_id),
                source_id = COALESCE(EXCLUDED.source_id, job_listings.source_id),
                description = EXCLUDED.description,
                location = EXCLUDED.location,
                work_arrangement = EXCLUDED.work_arrangement,
                posted_at = EXCLUDED.posted_at,
                salary_min = EXCLUDED.salary_min,
                salary_max = EXCLUDED.salary_max,
                content_hash = EXCLUDED.content_hash,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&listing.url)
        .bind(&listing.title)
        .bind(&listing.company_name)
        .bind(listing.company_id)
        .bind(listing.source_id)
        .bind(&listing.description)
        .bind(&listing.location)
        .bind(listing.work_arrangement.as_str())
        .bind(listing.posted_at)
        .bind(listing.salary_min.map(|s| s as i32))
        .bind(listing.salary_max.map(|s| s as i32))
        .bind(&listing.content_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.into())
    }
}

/// Repository for qualifying matches, upserted by listing id.
#[derive(Clone)]
pub struct MatchRepository {
    pool: Pool<Postgres>,
}

impl MatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: Uuid,
    listing_id: Uuid,
    score: i16,
    breakdown: serde_json::Value,
    analysis: serde_json::Value,
    tracking_id: Uuid,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MatchRow> for JobMatch {
    type Error = AppError;

    fn try_from(row: MatchRow) -> Result<Self, AppError> {
        let breakdown: ScoreBreakdown = serde_json::from_value(row.breakdown)?;
        let analysis: MatchAnalysis = serde_json::from_value(row.analysis)?;
        Ok(JobMatch {
            id: row.id,
            listing_id: row.listing_id,
            score: row.score as u8,
            breakdown,
            analysis,
            tracking_id: row.tracking_id,
            reviewed_at: row.reviewed_at,
            review_notes: row.review_notes,
            created_at: row.created_at,
        })
    }
}

impl MatchStore for MatchRepository {
    async fn get(&self, id: Uuid) -> Result<Option<JobMatch>, AppError> {
        let row = sqlx::query_as::<_, MatchRow>(r#"SELECT * FROM job_matches WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(&self, m: NewMatch) -> Result<JobMatch, AppError> {
        let breakdown = serde_json::to_value(&m.breakdown)?;
        let analysis = serde_json::to_value(&m.analysis)?;
        let row = sqlx::query_as::<_, MatchRow>(
            r#"
            INSERT INTO job_matches (listing_id, score, breakdown, analysis, tracking_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (listing_id) DO UPDATE SET
                score = EXCLUDED.score,
                breakdown = EXCLUDED.breakdown,
                analysis = EXCLUDED.analysis,
                tracking_id = EXCLUDED.tracking_id
            RETURNING *
            "#,
        )
        .bind(m.listing_id)
        .bind(m.score as i16)
        .bind(breakdown)
        .bind(analysis)
        .bind(m.tracking_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.try_into()
    }

    async fn count_for_tracking(&self, tracking_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM job_matches WHERE tracking_id = $1"#)
                .bind(tracking_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count)
    }

    async fn record_review(
        &self,
        match_id: Uuid,
        analysis: &MatchAnalysis,
        notes: &str,
    ) -> Result<(), AppError> {
        let analysis = serde_json::to_value(analysis)?;
        let result = sqlx::query(
            r#"
            UPDATE job_matches
            SET analysis = $2, review_notes = $3, reviewed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(match_id)
        .bind(analysis)
        .bind(notes)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("match", match_id.to_string()));
        }
        Ok(())
    }
}
