use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use jobscout_core::error::AppError;
use jobscout_core::item::company_slug;
use jobscout_core::models::{Company, NewCompany, SizeBucket};
use jobscout_core::traits::CompanyStore;

/// Repository for company records, upserted by slug.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: Pool<Postgres>,
}

impl CompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    slug: String,
    website: Option<String>,
    city: Option<String>,
    size_estimate: Option<i32>,
    size_bucket: Option<String>,
    remote_first: Option<bool>,
    ai_focus: Option<bool>,
    description: Option<String>,
    careers_url: Option<String>,
    enriched_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Company {
            id: row.id,
            name: row.name,
            slug: row.slug,
            website: row.website,
            city: row.city,
            size_estimate: row.size_estimate.map(|s| s as u32),
            size_bucket: row
                .size_bucket
                .and_then(|b| b.parse::<SizeBucket>().ok()),
            remote_first: row.remote_first,
            ai_focus: row.ai_focus,
            description: row.description,
            careers_url: row.careers_url,
            enriched_at: row.enriched_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl CompanyStore for CompanyRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, AppError> {
        let row = sqlx::query_as::<_, CompanyRow>(r#"SELECT * FROM companies WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>, AppError> {
        let row = sqlx::query_as::<_, CompanyRow>(r#"SELECT * FROM companies WHERE slug = $1"#)
            .bind(company_slug(name))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, company: NewCompany) -> Result<Company, AppError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            r#"
            INSERT INTO companies (
                name, slug, website, city, size_estimate, size_bucket,
                remote_first, ai_focus, description, careers_url, enriched_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name,
                website = COALESCE(EXCLUDED.website, companies.website),
                city = COALESCE(EXCLUDED.city, companies.city),
                size_estimate = COALESCE(EXCLUDED.size_estimate, companies.size_estimate),
                size_bucket = COALESCE(EXCLUDED.size_bucket, companies.size_bucket),
                remote_first = COALESCE(EXCLUDED.remote_first, companies.remote_first),
                ai_focus = COALESCE(EXCLUDED.ai_focus, companies.ai_focus),
                description = COALESCE(EXCLUDED.description, companies.description),
                careers_url = COALESCE(EXCLUDED.careers_url, companies.careers_url),
                enriched_at = COALESCE(EXCLUDED.enriched_at, companies.enriched_at),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&company.name)
        .bind(&company.slug)
        .bind(&company.website)
        .bind(&company.city)
        .bind(company.size_estimate.map(|s| s as i32))
        .bind(company.size_bucket.map(|b| b.as_str()))
        .bind(company.remote_first)
        .bind(company.ai_focus)
        .bind(&company.description)
        .bind(&company.careers_url)
        .bind(company.enriched_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.into())
    }
}
