//! Collaborator traits. The pipeline is generic over all of these, so unit
//! tests inject handwritten mocks and the binaries inject real adapters.

use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Company, JobListing, JobMatch, NewCompany, NewListing, NewMatch};
use crate::payload::{CompanyFacts, JobExtraction, ListingDraft, MatchAnalysis, RawPosting};
use crate::policy::Profile;
use crate::source::{NewSource, Source};

/// Scrapes one source into raw postings. Site-specific adapters live outside
/// the core; blocked/auth/transient conditions surface as typed [`AppError`]
/// variants for the classifier.
pub trait ScraperAdapter: Send + Sync + Clone {
    fn scrape(
        &self,
        source: &Source,
    ) -> impl Future<Output = Result<Vec<RawPosting>, AppError>> + Send;
}

/// Fetches raw content from a URL (company sites, careers-page probes).
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Structured inference over postings and companies. All methods must be
/// safe to call again after a retry.
pub trait Inference: Send + Sync + Clone {
    fn extract(
        &self,
        title: &str,
        description: &str,
    ) -> impl Future<Output = Result<JobExtraction, AppError>> + Send;

    fn analyze(
        &self,
        listing: &ListingDraft,
        extraction: &JobExtraction,
        profile: &Profile,
    ) -> impl Future<Output = Result<MatchAnalysis, AppError>> + Send;

    fn enrich_company(
        &self,
        name: &str,
        content: &str,
    ) -> impl Future<Output = Result<CompanyFacts, AppError>> + Send;
}

/// Persistence for scrape sources.
pub trait SourceStore: Send + Sync + Clone {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Source>, AppError>> + Send;

    fn active(&self) -> impl Future<Output = Result<Vec<Source>, AppError>> + Send;

    fn for_company(
        &self,
        company_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Source>, AppError>> + Send;

    /// Persist health/status fields mutated by the pipeline.
    fn update_health(&self, source: &Source) -> impl Future<Output = Result<(), AppError>> + Send;

    fn insert(&self, source: NewSource) -> impl Future<Output = Result<Source, AppError>> + Send;
}

/// Persistence for companies.
pub trait CompanyStore: Send + Sync + Clone {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Company>, AppError>> + Send;

    fn find_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Company>, AppError>> + Send;

    /// Upsert keyed by slug.
    fn upsert(&self, company: NewCompany)
    -> impl Future<Output = Result<Company, AppError>> + Send;
}

/// Persistence for job listings.
pub trait ListingStore: Send + Sync + Clone {
    /// Has this normalized URL already been persisted?
    fn url_exists(&self, url: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Upsert keyed by normalized URL.
    fn upsert(&self, listing: NewListing)
    -> impl Future<Output = Result<JobListing, AppError>> + Send;
}

/// Persistence for qualifying matches.
pub trait MatchStore: Send + Sync + Clone {
    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<JobMatch>, AppError>> + Send;

    /// Upsert keyed by listing id.
    fn upsert(&self, m: NewMatch) -> impl Future<Output = Result<JobMatch, AppError>> + Send;

    /// Matches recorded under a tracking id (target_matches accounting).
    fn count_for_tracking(
        &self,
        tracking_id: Uuid,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    fn record_review(
        &self,
        match_id: Uuid,
        analysis: &MatchAnalysis,
        notes: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
