//! Pipeline router: dispatches a claimed item to the processor for its
//! (type, stage) pair.
//!
//! Generic over every collaborator trait, so tests drive the full pipeline
//! with in-memory stores and mocks. The policy bundle is loaded once per
//! processed item, never cached for the life of the process.

mod company;
mod job;
mod scrape;

use std::sync::Arc;

use chrono::Utc;

use crate::breaker::{BreakerConfig, ResourceBreaker};
use crate::error::AppError;
use crate::item::{ItemType, QueueItem, Stage};
use crate::policy::PolicyProvider;
use crate::queue::{ProcessOutcome, QueueManager, QueueStore};
use crate::rotation::RotationConfig;
use crate::traits::{
    CompanyStore, Fetcher, Inference, ListingStore, MatchStore, ScraperAdapter, SourceStore,
};

pub struct Pipeline<Q, A, F, I, SS, CS, LS, MS, P>
where
    Q: QueueStore,
    A: ScraperAdapter,
    F: Fetcher,
    I: Inference,
    SS: SourceStore,
    CS: CompanyStore,
    LS: ListingStore,
    MS: MatchStore,
    P: PolicyProvider,
{
    pub(crate) queue: QueueManager<Q>,
    pub(crate) adapter: A,
    pub(crate) fetcher: F,
    pub(crate) inference: I,
    pub(crate) sources: SS,
    pub(crate) companies: CS,
    pub(crate) listings: LS,
    pub(crate) matches: MS,
    pub(crate) policies: Arc<P>,
    pub(crate) breaker: ResourceBreaker,
    pub(crate) rotation: RotationConfig,
}

impl<Q, A, F, I, SS, CS, LS, MS, P> Clone for Pipeline<Q, A, F, I, SS, CS, LS, MS, P>
where
    Q: QueueStore,
    A: ScraperAdapter,
    F: Fetcher,
    I: Inference,
    SS: SourceStore,
    CS: CompanyStore,
    LS: ListingStore,
    MS: MatchStore,
    P: PolicyProvider,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            adapter: self.adapter.clone(),
            fetcher: self.fetcher.clone(),
            inference: self.inference.clone(),
            sources: self.sources.clone(),
            companies: self.companies.clone(),
            listings: self.listings.clone(),
            matches: self.matches.clone(),
            policies: Arc::clone(&self.policies),
            breaker: self.breaker.clone(),
            rotation: self.rotation.clone(),
        }
    }
}

impl<Q, A, F, I, SS, CS, LS, MS, P> Pipeline<Q, A, F, I, SS, CS, LS, MS, P>
where
    Q: QueueStore,
    A: ScraperAdapter,
    F: Fetcher,
    I: Inference,
    SS: SourceStore,
    CS: CompanyStore,
    LS: ListingStore,
    MS: MatchStore,
    P: PolicyProvider,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: QueueManager<Q>,
        adapter: A,
        fetcher: F,
        inference: I,
        sources: SS,
        companies: CS,
        listings: LS,
        matches: MS,
        policies: Arc<P>,
    ) -> Self {
        Self {
            queue,
            adapter,
            fetcher,
            inference,
            sources,
            companies,
            listings,
            matches,
            policies,
            breaker: ResourceBreaker::new("inference", BreakerConfig::default()),
            rotation: RotationConfig::default(),
        }
    }

    pub fn with_breaker(mut self, breaker: ResourceBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn queue(&self) -> &QueueManager<Q> {
        &self.queue
    }

    /// Process one claimed item. The caller (worker loop) feeds the result
    /// into [`QueueManager::complete`], which owns classification and
    /// status transitions.
    pub async fn process(&self, item: &QueueItem) -> Result<ProcessOutcome, AppError> {
        let policy = self.policies.load()?;
        let now = Utc::now();

        tracing::debug!(
            item = %item.id,
            item_type = %item.item_type,
            stage = %item.stage,
            tracking = %item.tracking_id,
            "Processing item"
        );

        match (item.item_type, item.stage) {
            (ItemType::Scrape, Stage::Run) => self.run_scrape(item, now).await,
            (ItemType::ScrapeSource, Stage::Run) => self.run_scrape_source(item, now).await,
            (ItemType::Job, stage) => self.run_job_stage(item, stage, &policy, now).await,
            (ItemType::Company, stage) => self.run_company_stage(item, stage, now).await,
            (ItemType::SourceDiscovery, Stage::Run) => self.run_source_discovery(item).await,
            (ItemType::AgentReview, Stage::Run) => self.run_agent_review(item, &policy).await,
            (item_type, stage) => Err(AppError::Generic(format!(
                "stage {stage} is not valid for {item_type} items"
            ))),
        }
    }
}
