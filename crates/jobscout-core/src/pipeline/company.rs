//! Company enrichment (Fetch → Extract → Analyze → Save) and scrape-source
//! discovery for enriched companies.

use chrono::{DateTime, Utc};

use crate::error::{AppError, ErrorCategory};
use crate::item::{NewQueueItem, QueueItem, Stage};
use crate::models::{Company, NewCompany};
use crate::payload::StagePayload;
use crate::policy::PolicyProvider;
use crate::queue::{ProcessOutcome, QueueStore};
use crate::source::{NewSource, SourceStatus, SourceTier};
use crate::traits::{
    CompanyStore, Fetcher, Inference, ListingStore, MatchStore, ScraperAdapter, SourceStore,
};

use super::Pipeline;

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
    pub(super) async fn run_company_stage(
        &self,
        item: &QueueItem,
        stage: Stage,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        match stage {
            Stage::Fetch => self.company_fetch(item).await,
            Stage::Extract => self.company_extract(item).await,
            Stage::Analyze => self.company_analyze(item, now).await,
            Stage::Save => self.company_save(item).await,
            other => Err(AppError::Generic(format!(
                "stage {other} is not valid for company items"
            ))),
        }
    }

    /// Look up the existing record and fetch its website when one is known.
    /// Transient fetch failures retry; anything else enriches from an empty
    /// page rather than losing the company.
    async fn company_fetch(&self, item: &QueueItem) -> Result<ProcessOutcome, AppError> {
        let (record, name) = self.resolve_company(item).await?;
        if name.is_none() {
            return Ok(ProcessOutcome::Skipped(
                "company item has no id or name to enrich".into(),
            ));
        }

        let content = match record.as_ref().and_then(|c| c.website.as_deref()) {
            Some(website) => match self.fetcher.fetch(website).await {
                Ok(html) => html,
                Err(e) if e.category() == ErrorCategory::Transient => return Err(e),
                Err(e) => {
                    tracing::warn!(%website, error = %e, "Company site unreachable, enriching without it");
                    String::new()
                }
            },
            None => String::new(),
        };

        Ok(ProcessOutcome::Advance(StagePayload::CompanySite { content }))
    }

    async fn company_extract(&self, item: &QueueItem) -> Result<ProcessOutcome, AppError> {
        let content = item.payload.expect_site()?;
        let (_, name) = self.resolve_company(item).await?;
        let name = name.ok_or_else(|| {
            AppError::Config("company item lost its name between stages".into())
        })?;

        let facts = self
            .breaker
            .call(|| self.inference.enrich_company(&name, content))
            .await?;

        Ok(ProcessOutcome::Advance(StagePayload::CompanyExtracted {
            facts,
        }))
    }

    /// Deterministic derivations over the extracted facts.
    async fn company_analyze(
        &self,
        item: &QueueItem,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        let facts = item.payload.expect_facts()?;
        let (record, name) = self.resolve_company(item).await?;
        let name = name.ok_or_else(|| {
            AppError::Config("company item lost its name between stages".into())
        })?;

        let mut company = NewCompany::from_facts(&name, facts, now);
        // Extraction may come back sparse; keep whatever the existing
        // record already knows.
        if let Some(existing) = record {
            company.website = company.website.or(existing.website);
            company.city = company.city.or(existing.city);
            company.careers_url = company.careers_url.or(existing.careers_url);
            company.description = company.description.or(existing.description);
        }

        Ok(ProcessOutcome::Advance(StagePayload::CompanyEnriched {
            company,
        }))
    }

    /// Upsert the enriched record; a company without any scrape source gets
    /// one deduped discovery item.
    async fn company_save(&self, item: &QueueItem) -> Result<ProcessOutcome, AppError> {
        let company = item.payload.expect_enriched()?;
        let saved = self.companies.upsert(company.clone()).await?;

        if self.sources.for_company(saved.id).await?.is_empty() {
            match self
                .queue
                .spawn(item, NewQueueItem::source_discovery(saved.id))
                .await
            {
                Ok(_) => {}
                Err(AppError::SpawnDepthExceeded { depth, max }) => {
                    tracing::warn!(depth, max, "Spawn depth cap hit, skipping source discovery");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(company = %saved.name, id = %saved.id, "Company enriched");
        Ok(ProcessOutcome::Complete(None))
    }

    /// SOURCE_DISCOVERY: probe deterministic candidate URLs and register
    /// the first reachable one as a pending-validation source.
    pub(super) async fn run_source_discovery(
        &self,
        item: &QueueItem,
    ) -> Result<ProcessOutcome, AppError> {
        let company_id = item
            .company_id
            .ok_or_else(|| AppError::Config("source_discovery item has no company_id".into()))?;
        let Some(company) = self.companies.get(company_id).await? else {
            return Ok(ProcessOutcome::Skipped(format!(
                "company {company_id} no longer exists"
            )));
        };

        let mut candidates: Vec<String> = Vec::new();
        if let Some(careers) = &company.careers_url {
            candidates.push(careers.clone());
        }
        if let Some(website) = &company.website {
            let base = website.trim_end_matches('/');
            candidates.push(format!("{base}/careers"));
            candidates.push(format!("{base}/jobs"));
        }
        candidates.dedup();

        if candidates.is_empty() {
            return Ok(ProcessOutcome::Skipped(format!(
                "no candidate career URLs for {}",
                company.name
            )));
        }

        for candidate in &candidates {
            match self.fetcher.fetch(candidate).await {
                Ok(_) => {
                    let source = self
                        .sources
                        .insert(NewSource {
                            name: format!("{} careers", company.name),
                            scraper_type: "generic".into(),
                            url: candidate.clone(),
                            status: SourceStatus::PendingValidation,
                            tier: SourceTier::C,
                            company_id: Some(company.id),
                        })
                        .await?;
                    tracing::info!(
                        company = %company.name,
                        url = %candidate,
                        source = %source.id,
                        "Discovered scrape source"
                    );
                    return Ok(ProcessOutcome::Complete(None));
                }
                Err(e) => {
                    tracing::debug!(url = %candidate, error = %e, "Candidate careers URL not reachable");
                }
            }
        }

        Ok(ProcessOutcome::Skipped(format!(
            "no reachable careers endpoint for {}",
            company.name
        )))
    }

    /// Resolve the company record and display name an item refers to.
    async fn resolve_company(
        &self,
        item: &QueueItem,
    ) -> Result<(Option<Company>, Option<String>), AppError> {
        let record = if let Some(id) = item.company_id {
            self.companies.get(id).await?
        } else if let Some(name) = item.company_name.as_deref() {
            self.companies.find_by_name(name).await?
        } else {
            None
        };
        let name = item
            .company_name
            .clone()
            .or_else(|| record.as_ref().map(|c| c.name.clone()));
        Ok((record, name))
    }
}
