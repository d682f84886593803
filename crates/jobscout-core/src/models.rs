use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::item::company_slug;
use crate::payload::{CompanyFacts, ListingDraft, MatchAnalysis, WorkArrangement};
use crate::scoring::ScoreBreakdown;

/// Company size bucket derived from the headcount estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Startup,
    Small,
    Mid,
    Large,
    Enterprise,
}

impl SizeBucket {
    pub fn from_headcount(headcount: u32) -> SizeBucket {
        match headcount {
            0..=25 => SizeBucket::Startup,
            26..=100 => SizeBucket::Small,
            101..=1000 => SizeBucket::Mid,
            1001..=10000 => SizeBucket::Large,
            _ => SizeBucket::Enterprise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Startup => "startup",
            SizeBucket::Small => "small",
            SizeBucket::Mid => "mid",
            SizeBucket::Large => "large",
            SizeBucket::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for SizeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "startup" => Ok(SizeBucket::Startup),
            "small" => Ok(SizeBucket::Small),
            "mid" => Ok(SizeBucket::Mid),
            "large" => Ok(SizeBucket::Large),
            "enterprise" => Ok(SizeBucket::Enterprise),
            _ => Err(format!("Unknown size bucket: {}", s)),
        }
    }
}

/// A company record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
    pub city: Option<String>,
    pub size_estimate: Option<u32>,
    pub size_bucket: Option<SizeBucket>,
    pub remote_first: Option<bool>,
    pub ai_focus: Option<bool>,
    pub description: Option<String>,
    pub careers_url: Option<String>,
    /// Set once the enrichment pipeline has completed for this record.
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn is_enriched(&self) -> bool {
        self.enriched_at.is_some()
    }
}

/// DTO for upserting a company, keyed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
    pub city: Option<String>,
    pub size_estimate: Option<u32>,
    pub size_bucket: Option<SizeBucket>,
    pub remote_first: Option<bool>,
    pub ai_focus: Option<bool>,
    pub description: Option<String>,
    pub careers_url: Option<String>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl NewCompany {
    /// Build an enriched company record from extracted facts.
    pub fn from_facts(name: &str, facts: &CompanyFacts, now: DateTime<Utc>) -> NewCompany {
        NewCompany {
            name: name.to_string(),
            slug: company_slug(name),
            website: facts.website.clone(),
            city: facts.city.clone(),
            size_estimate: facts.size_estimate,
            size_bucket: facts.size_estimate.map(SizeBucket::from_headcount),
            remote_first: facts.remote_first,
            ai_focus: facts.ai_focus,
            description: facts.description.clone(),
            careers_url: facts.careers_url.clone(),
            enriched_at: Some(now),
        }
    }
}

/// A persisted job listing, keyed by normalized URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub company_name: String,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub description: String,
    pub location: Option<String>,
    pub work_arrangement: WorkArrangement,
    pub posted_at: Option<DateTime<Utc>>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for upserting a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub url: String,
    pub title: String,
    pub company_name: String,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub description: String,
    pub location: Option<String>,
    pub work_arrangement: WorkArrangement,
    pub posted_at: Option<DateTime<Utc>>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    pub content_hash: String,
}

impl NewListing {
    pub fn from_draft(draft: &ListingDraft, company_id: Option<Uuid>) -> NewListing {
        NewListing {
            url: draft.url.clone(),
            title: draft.title.clone(),
            company_name: draft.company_name.clone(),
            company_id,
            source_id: draft.source_id,
            description: draft.description.clone(),
            location: draft.location.clone(),
            work_arrangement: draft.work_arrangement,
            posted_at: draft.posted_at,
            salary_min: draft.salary_min,
            salary_max: draft.salary_max,
            content_hash: draft.content_hash.clone(),
        }
    }
}

/// A qualifying match, one per listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMatch {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub score: u8,
    pub breakdown: ScoreBreakdown,
    pub analysis: MatchAnalysis,
    pub tracking_id: Uuid,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// DTO for upserting a match, keyed by listing id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub listing_id: Uuid,
    pub score: u8,
    pub breakdown: ScoreBreakdown,
    pub analysis: MatchAnalysis,
    pub tracking_id: Uuid,
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
