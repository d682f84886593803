//! The job pipeline: Scrape → Filter → Analyze → Save, plus agent review.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::filter::run_filters;
use crate::item::{NewQueueItem, QueueItem, Stage};
use crate::models::{NewListing, NewMatch, compute_hash};
use crate::payload::{ListingDraft, StagePayload, WorkArrangement};
use crate::policy::{PolicyBundle, PolicyProvider};
use crate::queue::{ProcessOutcome, QueueStore};
use crate::scoring::{ScoreContext, score};
use crate::traits::{
    CompanyStore, Fetcher, Inference, ListingStore, MatchStore, ScraperAdapter, SourceStore,
};
use crate::url::normalize_url;

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
    pub(super) async fn run_job_stage(
        &self,
        item: &QueueItem,
        stage: Stage,
        policy: &PolicyBundle,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        match stage {
            Stage::Scrape => self.job_scrape(item).await,
            Stage::Filter => self.job_filter(item, policy, now),
            Stage::Analyze => self.job_analyze(item, policy, now).await,
            Stage::Save => self.job_save(item, policy).await,
            other => Err(AppError::Generic(format!(
                "stage {other} is not valid for job items"
            ))),
        }
    }

    /// Normalize the raw posting into a listing draft. Pure given the
    /// payload; a posting without a usable title or URL is skipped, not
    /// failed.
    async fn job_scrape(&self, item: &QueueItem) -> Result<ProcessOutcome, AppError> {
        let posting = item.payload.expect_posting()?;
        if posting.title.trim().is_empty() {
            return Ok(ProcessOutcome::Skipped("posting has no title".into()));
        }
        let url = normalize_url(&posting.url)?;

        let work_arrangement =
            WorkArrangement::infer(posting.location.as_deref(), &posting.description);
        let listing = ListingDraft {
            url,
            title: posting.title.trim().to_string(),
            company_name: posting.company.trim().to_string(),
            description: posting.description.clone(),
            location: posting.location.clone(),
            work_arrangement,
            posted_at: posting.posted_at,
            salary_min: posting.salary_min,
            salary_max: posting.salary_max,
            employment_type: posting.employment_type.clone(),
            timezone_offset: posting.timezone_offset,
            content_hash: compute_hash(&posting.description),
            source_id: item.source_id,
        };

        Ok(ProcessOutcome::Advance(StagePayload::JobListing { listing }))
    }

    /// Title gate, then the strike-based pre-filter. A rejection here costs
    /// zero AI calls.
    fn job_filter(
        &self,
        item: &QueueItem,
        policy: &PolicyBundle,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        let listing = item.payload.expect_listing()?;
        let result = run_filters(listing, policy, now);
        if !result.passed {
            tracing::debug!(url = %listing.url, reason = %result.reason(), "Pre-filter rejected posting");
            return Ok(ProcessOutcome::Filtered(result.reason()));
        }
        Ok(ProcessOutcome::Advance(StagePayload::JobListing {
            listing: listing.clone(),
        }))
    }

    /// AI extraction + deterministic scoring. Below-threshold postings end
    /// as filtered; passing postings may spawn a deduped company item
    /// without blocking their own completion.
    async fn job_analyze(
        &self,
        item: &QueueItem,
        policy: &PolicyBundle,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        let listing = item.payload.expect_listing()?;

        let extraction = self
            .breaker
            .call(|| self.inference.extract(&listing.title, &listing.description))
            .await?;
        let analysis = self
            .breaker
            .call(|| self.inference.analyze(listing, &extraction, &policy.profile))
            .await?;

        let company = if listing.company_name.is_empty() {
            None
        } else {
            self.companies.find_by_name(&listing.company_name).await?
        };

        let breakdown = score(
            &ScoreContext {
                listing,
                extraction: &extraction,
                analysis: &analysis,
                company: company.as_ref(),
                profile: &policy.profile,
                now,
            },
            &policy.scoring,
        );

        if !breakdown.passed {
            let reason = breakdown
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "below score threshold".into());
            tracing::debug!(url = %listing.url, score = breakdown.final_score, %reason, "Scoring rejected posting");
            return Ok(ProcessOutcome::Filtered(reason));
        }

        // Companies we have never seen, or never enriched, get their own
        // pipeline run. Dedupe makes this idempotent across sibling jobs.
        let needs_enrichment = company.as_ref().is_none_or(|c| !c.is_enriched());
        if needs_enrichment && !listing.company_name.is_empty() {
            let child = NewQueueItem::company(
                Some(listing.company_name.clone()),
                company.as_ref().map(|c| c.id),
            );
            match self.queue.spawn(item, child).await {
                Ok(_) => {}
                Err(AppError::SpawnDepthExceeded { depth, max }) => {
                    tracing::warn!(depth, max, "Spawn depth cap hit, skipping company enrichment");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ProcessOutcome::Advance(StagePayload::JobScored {
            listing: listing.clone(),
            extraction,
            analysis,
            breakdown,
            company_id: company.map(|c| c.id),
        }))
    }

    /// Upsert the listing and match. Idempotent: re-running after a retry
    /// updates the same rows.
    async fn job_save(
        &self,
        item: &QueueItem,
        policy: &PolicyBundle,
    ) -> Result<ProcessOutcome, AppError> {
        let (listing, extraction, analysis, breakdown, company_id) =
            item.payload.expect_scored()?;

        let saved = self
            .listings
            .upsert(NewListing::from_draft(listing, company_id))
            .await?;
        let saved_match = self
            .matches
            .upsert(NewMatch {
                listing_id: saved.id,
                score: breakdown.final_score,
                breakdown: breakdown.clone(),
                analysis: analysis.clone(),
                tracking_id: item.tracking_id,
            })
            .await?;

        tracing::info!(
            url = %listing.url,
            score = breakdown.final_score,
            match_id = %saved_match.id,
            "Match saved"
        );

        if breakdown.final_score >= policy.scoring.review_threshold {
            let child =
                NewQueueItem::agent_review(saved_match.id, listing.clone(), extraction.clone());
            match self.queue.spawn(item, child).await {
                Ok(_) => {}
                Err(AppError::SpawnDepthExceeded { depth, max }) => {
                    tracing::warn!(depth, max, "Spawn depth cap hit, skipping agent review");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ProcessOutcome::Complete(None))
    }

    /// AGENT_REVIEW: a second analysis pass over a saved high-scoring
    /// match, recorded as reviewer annotations.
    pub(super) async fn run_agent_review(
        &self,
        item: &QueueItem,
        policy: &PolicyBundle,
    ) -> Result<ProcessOutcome, AppError> {
        let (match_id, listing, extraction) = item.payload.expect_review()?;
        if self.matches.get(match_id).await?.is_none() {
            return Ok(ProcessOutcome::Skipped(format!(
                "match {match_id} no longer exists"
            )));
        }

        let analysis = self
            .breaker
            .call(|| self.inference.analyze(listing, extraction, &policy.profile))
            .await?;

        let notes = format!(
            "strengths: {}; concerns: {}",
            join_or_none(&analysis.key_strengths),
            join_or_none(&analysis.concerns),
        );
        self.matches.record_review(match_id, &analysis, &notes).await?;

        Ok(ProcessOutcome::Complete(None))
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none noted".to_string()
    } else {
        items.join(", ")
    }
}
