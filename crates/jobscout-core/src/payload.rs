use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::NewCompany;
use crate::scoring::ScoreBreakdown;

/// A posting as delivered by a scraper adapter, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub title: String,
    pub company: String,
    pub url: String,
    pub description: String,
    pub location: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    /// Present when the board exposes it in structured data.
    pub employment_type: Option<String>,
    /// UTC offset in whole hours, when the board exposes it.
    pub timezone_offset: Option<i32>,
}

/// Working arrangement, inferred from posting text before any AI call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkArrangement {
    Remote,
    Hybrid,
    Onsite,
    Unknown,
}

impl WorkArrangement {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkArrangement::Remote => "remote",
            WorkArrangement::Hybrid => "hybrid",
            WorkArrangement::Onsite => "onsite",
            WorkArrangement::Unknown => "unknown",
        }
    }

    /// Keyword scan over location and description. Location wins over
    /// description; "hybrid" wins over "remote" because hybrid postings
    /// routinely mention remote days.
    pub fn infer(location: Option<&str>, description: &str) -> WorkArrangement {
        let scan = |text: &str| {
            let lower = text.to_lowercase();
            if lower.contains("hybrid") {
                Some(WorkArrangement::Hybrid)
            } else if lower.contains("remote") || lower.contains("work from home") {
                Some(WorkArrangement::Remote)
            } else if lower.contains("on-site") || lower.contains("onsite") || lower.contains("in office")
            {
                Some(WorkArrangement::Onsite)
            } else {
                None
            }
        };
        location
            .and_then(scan)
            .or_else(|| scan(description))
            .unwrap_or(WorkArrangement::Unknown)
    }
}

impl std::str::FromStr for WorkArrangement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" => Ok(WorkArrangement::Remote),
            "hybrid" => Ok(WorkArrangement::Hybrid),
            "onsite" => Ok(WorkArrangement::Onsite),
            "unknown" => Ok(WorkArrangement::Unknown),
            _ => Err(format!("Unknown work arrangement: {}", s)),
        }
    }
}

/// A validated, normalized posting flowing through the job pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    /// Normalized URL; also the listing upsert key.
    pub url: String,
    pub title: String,
    pub company_name: String,
    pub description: String,
    pub location: Option<String>,
    pub work_arrangement: WorkArrangement,
    pub posted_at: Option<DateTime<Utc>>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    pub employment_type: Option<String>,
    pub timezone_offset: Option<i32>,
    /// SHA-256 of the description, for change detection on re-scrapes.
    pub content_hash: String,
    pub source_id: Option<Uuid>,
}

/// Structured fields the inference service extracts from a posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobExtraction {
    pub seniority: Option<String>,
    pub work_arrangement: Option<WorkArrangement>,
    pub timezone_offset: Option<i32>,
    pub city: Option<String>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    pub experience_min: Option<u32>,
    pub experience_max: Option<u32>,
    pub technologies: Vec<String>,
    pub employment_type: Option<String>,
    pub role_category: Option<String>,
}

/// Fit assessment from the inference service; `match_score` seeds the
/// deterministic scoring engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub match_score: u8,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub key_strengths: Vec<String>,
    pub concerns: Vec<String>,
}

/// Company facts extracted during enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyFacts {
    pub website: Option<String>,
    pub city: Option<String>,
    pub size_estimate: Option<u32>,
    pub remote_first: Option<bool>,
    pub ai_focus: Option<bool>,
    pub description: Option<String>,
    pub careers_url: Option<String>,
}

/// Stage input/output, tagged by kind and validated at stage boundaries.
///
/// An item carrying the wrong variant for its stage is a permanent error,
/// never a panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StagePayload {
    /// Scrape root: fan-out constraints.
    ScrapeRequest {
        target_matches: u32,
        max_sources: u32,
        source_ids: Option<Vec<Uuid>>,
    },
    /// ScrapeSource run input; the source id lives on the item.
    SourceScrape,
    /// Job Scrape input.
    JobPosting { posting: RawPosting },
    /// Job Filter and Analyze input.
    JobListing { listing: ListingDraft },
    /// Job Save input.
    JobScored {
        listing: ListingDraft,
        extraction: JobExtraction,
        analysis: MatchAnalysis,
        breakdown: ScoreBreakdown,
        company_id: Option<Uuid>,
    },
    /// Company Fetch input; company references live on the item.
    CompanyLookup,
    /// Company Extract input.
    CompanySite { content: String },
    /// Company Analyze input.
    CompanyExtracted { facts: CompanyFacts },
    /// Company Save input.
    CompanyEnriched { company: NewCompany },
    /// SourceDiscovery run input; the company id lives on the item.
    Discovery,
    /// AgentReview run input.
    Review {
        match_id: Uuid,
        listing: ListingDraft,
        extraction: JobExtraction,
    },
    /// Terminal summary recorded by fan-out processors.
    FanoutSummary { spawned: u32, skipped: u32 },
}

impl StagePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            StagePayload::ScrapeRequest { .. } => "scrape_request",
            StagePayload::SourceScrape => "source_scrape",
            StagePayload::JobPosting { .. } => "job_posting",
            StagePayload::JobListing { .. } => "job_listing",
            StagePayload::JobScored { .. } => "job_scored",
            StagePayload::CompanyLookup => "company_lookup",
            StagePayload::CompanySite { .. } => "company_site",
            StagePayload::CompanyExtracted { .. } => "company_extracted",
            StagePayload::CompanyEnriched { .. } => "company_enriched",
            StagePayload::Discovery => "discovery",
            StagePayload::Review { .. } => "review",
            StagePayload::FanoutSummary { .. } => "fanout_summary",
        }
    }

    fn mismatch(stage: &'static str, expected: &'static str) -> AppError {
        AppError::Payload { stage, expected }
    }

    pub fn expect_scrape_request(&self) -> Result<(u32, u32, Option<&Vec<Uuid>>), AppError> {
        match self {
            StagePayload::ScrapeRequest {
                target_matches,
                max_sources,
                source_ids,
            } => Ok((*target_matches, *max_sources, source_ids.as_ref())),
            _ => Err(Self::mismatch("scrape/run", "scrape_request")),
        }
    }

    pub fn expect_posting(&self) -> Result<&RawPosting, AppError> {
        match self {
            StagePayload::JobPosting { posting } => Ok(posting),
            _ => Err(Self::mismatch("job/scrape", "job_posting")),
        }
    }

    pub fn expect_listing(&self) -> Result<&ListingDraft, AppError> {
        match self {
            StagePayload::JobListing { listing } => Ok(listing),
            _ => Err(Self::mismatch("job/filter|analyze", "job_listing")),
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn expect_scored(
        &self,
    ) -> Result<
        (
            &ListingDraft,
            &JobExtraction,
            &MatchAnalysis,
            &ScoreBreakdown,
            Option<Uuid>,
        ),
        AppError,
    > {
        match self {
            StagePayload::JobScored {
                listing,
                extraction,
                analysis,
                breakdown,
                company_id,
            } => Ok((listing, extraction, analysis, breakdown, *company_id)),
            _ => Err(Self::mismatch("job/save", "job_scored")),
        }
    }

    pub fn expect_site(&self) -> Result<&str, AppError> {
        match self {
            StagePayload::CompanySite { content } => Ok(content),
            _ => Err(Self::mismatch("company/extract", "company_site")),
        }
    }

    pub fn expect_facts(&self) -> Result<&CompanyFacts, AppError> {
        match self {
            StagePayload::CompanyExtracted { facts } => Ok(facts),
            _ => Err(Self::mismatch("company/analyze", "company_extracted")),
        }
    }

    pub fn expect_enriched(&self) -> Result<&NewCompany, AppError> {
        match self {
            StagePayload::CompanyEnriched { company } => Ok(company),
            _ => Err(Self::mismatch("company/save", "company_enriched")),
        }
    }

    pub fn expect_review(&self) -> Result<(Uuid, &ListingDraft, &JobExtraction), AppError> {
        match self {
            StagePayload::Review {
                match_id,
                listing,
                extraction,
            } => Ok((*match_id, listing, extraction)),
            _ => Err(Self::mismatch("agent_review/run", "review")),
        }
    }
}
