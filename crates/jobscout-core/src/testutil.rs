//! Test utilities: in-memory stores and mock collaborators.
//!
//! Handwritten mocks for dependency injection in unit tests, using
//! `Arc<Mutex<_>>` for interior mutability so tests can assert on recorded
//! calls. The in-memory queue store implements the same dedupe and
//! conditional-transition guarantees the Postgres repository enforces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::{AppError, ErrorCategory};
use crate::item::{ItemStatus, QueueItem, Stage};
use crate::models::{Company, JobListing, JobMatch, NewCompany, NewListing, NewMatch};
use crate::payload::{
    CompanyFacts, JobExtraction, ListingDraft, MatchAnalysis, RawPosting, StagePayload,
};
use crate::policy::{PolicyBundle, Profile};
use crate::queue::{QueueStats, QueueStore};
use crate::source::{NewSource, Source, SourceStatus, SourceTier};
use crate::traits::{
    CompanyStore, Fetcher, Inference, ListingStore, MatchStore, ScraperAdapter, SourceStore,
};

// ---------------------------------------------------------------------------
// InMemoryQueueStore
// ---------------------------------------------------------------------------

/// Vec-backed queue store with the full dedupe + conditional-transition
/// contract of the durable store.
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    items: Arc<Mutex<Vec<QueueItem>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move every pending retry deadline into the past, so tests can claim
    /// retried items without sleeping.
    pub fn make_all_due(&self) {
        let mut items = self.items.lock().unwrap();
        let past = Utc::now() - TimeDelta::hours(1);
        for item in items.iter_mut() {
            if item.next_retry_at.is_some() {
                item.next_retry_at = Some(past);
            }
        }
    }

    pub fn all(&self) -> Vec<QueueItem> {
        self.items.lock().unwrap().clone()
    }

    fn with_processing<R>(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut QueueItem) -> R,
    ) -> Result<R, AppError> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| i.id == id && i.status == ItemStatus::Processing)
            .ok_or_else(|| {
                AppError::Database(format!("conditional update failed: {id} not processing"))
            })?;
        Ok(mutate(item))
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn insert(&self, item: QueueItem) -> Result<QueueItem, AppError> {
        let mut items = self.items.lock().unwrap();
        if items
            .iter()
            .any(|i| !i.status.is_terminal() && i.dedupe_key == item.dedupe_key)
        {
            return Err(AppError::Duplicate(item.dedupe_key));
        }
        items.push(item.clone());
        Ok(item)
    }

    async fn claim(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<QueueItem>, AppError> {
        let mut items = self.items.lock().unwrap();
        let mut due: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| {
                i.status == ItemStatus::Pending
                    && i.next_retry_at.is_none_or(|at| at <= now)
            })
            .map(|(idx, _)| idx)
            .collect();
        due.sort_by_key(|&idx| items[idx].created_at);
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for idx in due {
            let item = &mut items[idx];
            // Same compare-and-swap the SQL claim performs.
            if item.status == ItemStatus::Pending {
                item.status = ItemStatus::Processing;
                item.started_at = Some(now);
                item.updated_at = now;
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_advanced(
        &self,
        id: Uuid,
        next_stage: Stage,
        payload: StagePayload,
    ) -> Result<(), AppError> {
        self.with_processing(id, |item| {
            item.stage = next_stage;
            item.status = ItemStatus::Pending;
            item.payload = payload;
            item.next_retry_at = None;
            item.updated_at = Utc::now();
        })
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: ItemStatus,
        note: Option<&str>,
        category: Option<ErrorCategory>,
        payload: Option<StagePayload>,
    ) -> Result<(), AppError> {
        self.with_processing(id, |item| {
            item.status = status;
            item.last_error = note.map(str::to_string);
            item.last_error_category = category;
            if let Some(payload) = payload {
                item.payload = payload;
            }
            item.completed_at = Some(Utc::now());
            item.updated_at = Utc::now();
        })
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
        error: &str,
        category: ErrorCategory,
    ) -> Result<(), AppError> {
        self.with_processing(id, |item| {
            item.status = ItemStatus::Pending;
            item.retry_count += 1;
            item.next_retry_at = Some(next_retry_at);
            item.last_error = Some(error.to_string());
            item.last_error_category = Some(category);
            item.started_at = None;
            item.updated_at = Utc::now();
        })
    }

    async fn release(&self, id: Uuid) -> Result<(), AppError> {
        self.with_processing(id, |item| {
            item.status = ItemStatus::Pending;
            item.started_at = None;
            item.updated_at = Utc::now();
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>, AppError> {
        Ok(self.items.lock().unwrap().iter().find(|i| i.id == id).cloned())
    }

    async fn url_in_queue(&self, url: &str) -> Result<bool, AppError> {
        let key = format!("job|{url}");
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .any(|i| !i.status.is_terminal() && i.dedupe_key == key))
    }

    async fn counts(&self) -> Result<QueueStats, AppError> {
        let items = self.items.lock().unwrap();
        let mut stats = QueueStats::default();
        for item in items.iter() {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Success => stats.success += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Skipped => stats.skipped += 1,
                ItemStatus::Filtered => stats.filtered += 1,
            }
        }
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// In-memory persistence stores
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemorySourceStore {
    sources: Arc<Mutex<Vec<Source>>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self {
            sources: Arc::new(Mutex::new(sources)),
        }
    }

    pub fn all(&self) -> Vec<Source> {
        self.sources.lock().unwrap().clone()
    }
}

impl SourceStore for InMemorySourceStore {
    async fn get(&self, id: Uuid) -> Result<Option<Source>, AppError> {
        Ok(self.sources.lock().unwrap().iter().find(|s| s.id == id).cloned())
    }

    async fn active(&self) -> Result<Vec<Source>, AppError> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.status == SourceStatus::Active)
            .cloned()
            .collect())
    }

    async fn for_company(&self, company_id: Uuid) -> Result<Vec<Source>, AppError> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.company_id == Some(company_id))
            .cloned()
            .collect())
    }

    async fn update_health(&self, source: &Source) -> Result<(), AppError> {
        let mut sources = self.sources.lock().unwrap();
        if let Some(existing) = sources.iter_mut().find(|s| s.id == source.id) {
            *existing = source.clone();
        }
        Ok(())
    }

    async fn insert(&self, source: NewSource) -> Result<Source, AppError> {
        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            name: source.name,
            scraper_type: source.scraper_type,
            url: source.url,
            status: source.status,
            tier: source.tier,
            consecutive_failures: 0,
            health_score: 1.0,
            last_scraped_at: None,
            last_error: None,
            company_id: source.company_id,
            created_at: now,
            updated_at: now,
        };
        self.sources.lock().unwrap().push(source.clone());
        Ok(source)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCompanyStore {
    companies: Arc<Mutex<Vec<Company>>>,
}

impl InMemoryCompanyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_companies(companies: Vec<Company>) -> Self {
        Self {
            companies: Arc::new(Mutex::new(companies)),
        }
    }

    pub fn all(&self) -> Vec<Company> {
        self.companies.lock().unwrap().clone()
    }
}

impl CompanyStore for InMemoryCompanyStore {
    async fn get(&self, id: Uuid) -> Result<Option<Company>, AppError> {
        Ok(self
            .companies
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Company>, AppError> {
        let slug = crate::item::company_slug(name);
        Ok(self
            .companies
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn upsert(&self, company: NewCompany) -> Result<Company, AppError> {
        let mut companies = self.companies.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = companies.iter_mut().find(|c| c.slug == company.slug) {
            existing.name = company.name;
            existing.website = company.website;
            existing.city = company.city;
            existing.size_estimate = company.size_estimate;
            existing.size_bucket = company.size_bucket;
            existing.remote_first = company.remote_first;
            existing.ai_focus = company.ai_focus;
            existing.description = company.description;
            existing.careers_url = company.careers_url;
            existing.enriched_at = company.enriched_at;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = Company {
            id: Uuid::new_v4(),
            name: company.name,
            slug: company.slug,
            website: company.website,
            city: company.city,
            size_estimate: company.size_estimate,
            size_bucket: company.size_bucket,
            remote_first: company.remote_first,
            ai_focus: company.ai_focus,
            description: company.description,
            careers_url: company.careers_url,
            enriched_at: company.enriched_at,
            created_at: now,
            updated_at: now,
        };
        companies.push(created.clone());
        Ok(created)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryListingStore {
    listings: Arc<Mutex<Vec<JobListing>>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<JobListing> {
        self.listings.lock().unwrap().clone()
    }
}

impl ListingStore for InMemoryListingStore {
    async fn url_exists(&self, url: &str) -> Result<bool, AppError> {
        Ok(self.listings.lock().unwrap().iter().any(|l| l.url == url))
    }

    async fn upsert(&self, listing: NewListing) -> Result<JobListing, AppError> {
        let mut listings = self.listings.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = listings.iter_mut().find(|l| l.url == listing.url) {
            existing.title = listing.title;
            existing.company_name = listing.company_name;
            existing.company_id = listing.company_id;
            existing.source_id = listing.source_id;
            existing.description = listing.description;
            existing.location = listing.location;
            existing.work_arrangement = listing.work_arrangement;
            existing.posted_at = listing.posted_at;
            existing.salary_min = listing.salary_min;
            existing.salary_max = listing.salary_max;
            existing.content_hash = listing.content_hash;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = JobListing {
            id: Uuid::new_v4(),
            url: listing.url,
            title: listing.title,
            company_name: listing.company_name,
            company_id: listing.company_id,
            source_id: listing.source_id,
            description: listing.description,
            location: listing.location,
            work_arrangement: listing.work_arrangement,
            posted_at: listing.posted_at,
            salary_min: listing.salary_min,
            salary_max: listing.salary_max,
            content_hash: listing.content_hash,
            created_at: now,
            updated_at: now,
        };
        listings.push(created.clone());
        Ok(created)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMatchStore {
    matches: Arc<Mutex<Vec<JobMatch>>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<JobMatch> {
        self.matches.lock().unwrap().clone()
    }
}

impl MatchStore for InMemoryMatchStore {
    async fn get(&self, id: Uuid) -> Result<Option<JobMatch>, AppError> {
        Ok(self.matches.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn upsert(&self, m: NewMatch) -> Result<JobMatch, AppError> {
        let mut matches = self.matches.lock().unwrap();
        if let Some(existing) = matches.iter_mut().find(|x| x.listing_id == m.listing_id) {
            existing.score = m.score;
            existing.breakdown = m.breakdown;
            existing.analysis = m.analysis;
            existing.tracking_id = m.tracking_id;
            return Ok(existing.clone());
        }
        let created = JobMatch {
            id: Uuid::new_v4(),
            listing_id: m.listing_id,
            score: m.score,
            breakdown: m.breakdown,
            analysis: m.analysis,
            tracking_id: m.tracking_id,
            reviewed_at: None,
            review_notes: None,
            created_at: Utc::now(),
        };
        matches.push(created.clone());
        Ok(created)
    }

    async fn count_for_tracking(&self, tracking_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.tracking_id == tracking_id)
            .count() as i64)
    }

    async fn record_review(
        &self,
        match_id: Uuid,
        analysis: &MatchAnalysis,
        notes: &str,
    ) -> Result<(), AppError> {
        let mut matches = self.matches.lock().unwrap();
        let m = matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| AppError::NotFound("match", match_id.to_string()))?;
        m.analysis = analysis.clone();
        m.review_notes = Some(notes.to_string());
        m.reviewed_at = Some(Utc::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Scraper adapter with scripted per-source responses. Each call pops the
/// next scripted result; an exhausted script returns no postings.
#[derive(Clone, Default)]
pub struct MockAdapter {
    responses: Arc<Mutex<HashMap<Uuid, Vec<Result<Vec<RawPosting>, AppError>>>>>,
    pub scraped: Arc<Mutex<Vec<Uuid>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_postings(self, source_id: Uuid, postings: Vec<RawPosting>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(source_id)
            .or_default()
            .push(Ok(postings));
        self
    }

    pub fn with_error(self, source_id: Uuid, error: AppError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(source_id)
            .or_default()
            .push(Err(error));
        self
    }
}

impl ScraperAdapter for MockAdapter {
    async fn scrape(&self, source: &Source) -> Result<Vec<RawPosting>, AppError> {
        self.scraped.lock().unwrap().push(source.id);
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(&source.id) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Fetcher with scripted per-URL responses; unknown URLs 404.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, Result<String, AppError>>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.to_string()));
        self
    }

    pub fn with_error(self, url: &str, error: AppError) -> Self {
        self.responses.lock().unwrap().insert(url.to_string(), Err(error));
        self
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.fetched.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().remove(url) {
            Some(result) => result,
            None => Err(AppError::Http(format!("HTTP 404 for {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockInference
// ---------------------------------------------------------------------------

/// Inference service returning configurable fixed responses, with call
/// counters so tests can assert zero AI cost on filtered postings.
#[derive(Clone)]
pub struct MockInference {
    extraction: Arc<Mutex<Vec<Result<JobExtraction, AppError>>>>,
    analysis: Arc<Mutex<Vec<Result<MatchAnalysis, AppError>>>>,
    facts: Arc<Mutex<Vec<Result<CompanyFacts, AppError>>>>,
    default_extraction: JobExtraction,
    default_score: u8,
    pub extract_calls: Arc<Mutex<u32>>,
    pub analyze_calls: Arc<Mutex<u32>>,
    pub enrich_calls: Arc<Mutex<u32>>,
}

impl MockInference {
    /// All calls succeed: default extraction, the given base score, empty
    /// company facts.
    pub fn scoring(default_score: u8) -> Self {
        Self {
            extraction: Arc::new(Mutex::new(Vec::new())),
            analysis: Arc::new(Mutex::new(Vec::new())),
            facts: Arc::new(Mutex::new(Vec::new())),
            default_extraction: JobExtraction::default(),
            default_score,
            extract_calls: Arc::new(Mutex::new(0)),
            analyze_calls: Arc::new(Mutex::new(0)),
            enrich_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_default_extraction(mut self, extraction: JobExtraction) -> Self {
        self.default_extraction = extraction;
        self
    }

    pub fn with_extraction(self, result: Result<JobExtraction, AppError>) -> Self {
        self.extraction.lock().unwrap().push(result);
        self
    }

    pub fn with_analysis(self, result: Result<MatchAnalysis, AppError>) -> Self {
        self.analysis.lock().unwrap().push(result);
        self
    }

    pub fn with_facts(self, result: Result<CompanyFacts, AppError>) -> Self {
        self.facts.lock().unwrap().push(result);
        self
    }

    pub fn extract_count(&self) -> u32 {
        *self.extract_calls.lock().unwrap()
    }

    pub fn analyze_count(&self) -> u32 {
        *self.analyze_calls.lock().unwrap()
    }
}

impl Inference for MockInference {
    async fn extract(&self, _title: &str, _description: &str) -> Result<JobExtraction, AppError> {
        *self.extract_calls.lock().unwrap() += 1;
        let mut scripted = self.extraction.lock().unwrap();
        if scripted.is_empty() {
            Ok(self.default_extraction.clone())
        } else {
            scripted.remove(0)
        }
    }

    async fn analyze(
        &self,
        _listing: &ListingDraft,
        _extraction: &JobExtraction,
        _profile: &Profile,
    ) -> Result<MatchAnalysis, AppError> {
        *self.analyze_calls.lock().unwrap() += 1;
        let mut scripted = self.analysis.lock().unwrap();
        if scripted.is_empty() {
            Ok(MatchAnalysis {
                match_score: self.default_score,
                matched_skills: vec!["rust".into()],
                ..Default::default()
            })
        } else {
            scripted.remove(0)
        }
    }

    async fn enrich_company(&self, _name: &str, _content: &str) -> Result<CompanyFacts, AppError> {
        *self.enrich_calls.lock().unwrap() += 1;
        let mut scripted = self.facts.lock().unwrap();
        if scripted.is_empty() {
            Ok(CompanyFacts::default())
        } else {
            scripted.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A permissive policy bundle for pipeline tests: no keyword gates, no
/// blacklists, min score 60.
pub fn test_bundle() -> PolicyBundle {
    let mut bundle = PolicyBundle::default();
    bundle.scoring.min_score = 60;
    bundle.scoring.review_threshold = 90;
    bundle.profile = Profile {
        headline: "Backend engineer".into(),
        skills: vec!["rust".into(), "postgres".into()],
        years_experience: 8,
        city: "Berlin".into(),
        timezone_offset: 1,
    };
    bundle
}

pub fn make_posting(url: &str) -> RawPosting {
    RawPosting {
        title: "Senior Rust Engineer".into(),
        company: "Acme".into(),
        url: url.to_string(),
        description: "Build backend services in Rust.".into(),
        location: Some("Remote".into()),
        posted_at: Some(Utc::now() - TimeDelta::days(1)),
        salary_min: Some(120_000),
        salary_max: Some(160_000),
        employment_type: Some("full_time".into()),
        timezone_offset: Some(1),
    }
}

pub fn make_active_source(name: &str) -> Source {
    let now = Utc::now();
    Source {
        id: Uuid::new_v4(),
        name: name.into(),
        scraper_type: "greenhouse".into(),
        url: format!("https://boards.example.com/{name}"),
        status: SourceStatus::Active,
        tier: SourceTier::B,
        consecutive_failures: 0,
        health_score: 1.0,
        last_scraped_at: None,
        last_error: None,
        company_id: None,
        created_at: now,
        updated_at: now,
    }
}
