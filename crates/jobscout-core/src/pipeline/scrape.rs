//! Scrape fan-out and per-source intake.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::item::{NewQueueItem, QueueItem};
use crate::payload::StagePayload;
use crate::policy::PolicyProvider;
use crate::queue::{ProcessOutcome, QueueStore};
use crate::rotation::plan_rotation;
use crate::source::SourceStatus;
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
    /// SCRAPE root: fan out into per-source items chosen by the rotation
    /// scheduler, bounded by `max_sources`, stopping early once matches
    /// recorded under this lineage already reach `target_matches` (which
    /// only bites on re-runs and retries).
    pub(super) async fn run_scrape(
        &self,
        item: &QueueItem,
        _now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        let (target_matches, max_sources, source_ids) = item.payload.expect_scrape_request()?;

        let mut sources = self.sources.active().await?;
        if let Some(ids) = source_ids {
            sources.retain(|s| ids.contains(&s.id));
        }
        if sources.is_empty() {
            return Ok(ProcessOutcome::Skipped("no active sources to scrape".into()));
        }

        let plan = plan_rotation(&sources, max_sources as usize, &self.rotation);

        let mut spawned = 0u32;
        let mut skipped = 0u32;
        for source in plan {
            if target_matches > 0 {
                let have = self.matches.count_for_tracking(item.tracking_id).await?;
                if have >= target_matches as i64 {
                    tracing::info!(
                        tracking = %item.tracking_id,
                        matches = have,
                        "Target match count reached, stopping fan-out"
                    );
                    break;
                }
            }
            match self
                .queue
                .spawn(item, NewQueueItem::scrape_source(source.id))
                .await?
            {
                Some(_) => spawned += 1,
                None => skipped += 1,
            }
        }

        tracing::info!(spawned, skipped, "Scrape fan-out complete");
        Ok(ProcessOutcome::Complete(Some(StagePayload::FanoutSummary {
            spawned,
            skipped,
        })))
    }

    /// SCRAPE_SOURCE: run the adapter for one source, intake discovered
    /// postings as job items, and keep source health current. A blocked
    /// signal disables the source instead of retrying forever.
    pub(super) async fn run_scrape_source(
        &self,
        item: &QueueItem,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, AppError> {
        let source_id = item
            .source_id
            .ok_or_else(|| AppError::Config("scrape_source item has no source_id".into()))?;
        let Some(mut source) = self.sources.get(source_id).await? else {
            return Ok(ProcessOutcome::Skipped(format!(
                "source {source_id} no longer exists"
            )));
        };
        if source.status != SourceStatus::Active {
            return Ok(ProcessOutcome::Skipped(format!(
                "source {} is {}",
                source.name, source.status
            )));
        }

        match self.adapter.scrape(&source).await {
            Ok(postings) => {
                source.record_success(now);
                self.sources.update_health(&source).await?;

                let total = postings.len();
                let mut spawned = 0u32;
                let mut skipped = 0u32;
                for posting in postings {
                    let normalized = match normalize_url(&posting.url) {
                        Ok(url) => url,
                        Err(e) => {
                            tracing::debug!(url = %posting.url, error = %e, "Dropping unparseable posting URL");
                            skipped += 1;
                            continue;
                        }
                    };
                    // Already persisted from an earlier run?
                    if self.listings.url_exists(&normalized).await? {
                        skipped += 1;
                        continue;
                    }
                    // The dedupe key guards the in-queue side.
                    let child =
                        NewQueueItem::job(posting.url.clone(), posting, Some(source.id));
                    match self.queue.spawn(item, child).await {
                        Ok(Some(_)) => spawned += 1,
                        Ok(None) => skipped += 1,
                        Err(AppError::SpawnDepthExceeded { depth, max }) => {
                            tracing::warn!(depth, max, "Spawn depth cap hit during intake");
                            skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }

                tracing::info!(
                    source = %source.name,
                    discovered = total,
                    spawned,
                    skipped,
                    "Source intake complete"
                );
                Ok(ProcessOutcome::Complete(Some(StagePayload::FanoutSummary {
                    spawned,
                    skipped,
                })))
            }
            Err(AppError::Blocked(reason)) => {
                source.disable(format!("blocked: {reason}"));
                self.sources.update_health(&source).await?;
                tracing::warn!(source = %source.name, %reason, "Source blocked, disabling");
                Ok(ProcessOutcome::Skipped(format!(
                    "source {} disabled: {reason}",
                    source.name
                )))
            }
            Err(e) => {
                source.record_failure(&e, now);
                self.sources.update_health(&source).await?;
                Err(e)
            }
        }
    }
}
