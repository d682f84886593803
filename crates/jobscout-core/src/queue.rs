//! Queue manager: dedup-guarded enqueue, atomic claim, retry-classified
//! completion, and ancestry-bounded spawning.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ErrorCategory};
use crate::item::{ItemStatus, NewQueueItem, QueueItem, RetryConfig, SpawnPolicy, Stage};
use crate::payload::StagePayload;

/// Aggregate queue counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
    pub filtered: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.success + self.failed + self.skipped + self.filtered
    }
}

/// Durable queue item store.
///
/// Implementations must enforce two guarantees from the data model:
/// dedupe-key uniqueness among non-terminal rows (insert returns
/// [`AppError::Duplicate`]), and atomic claiming so no two workers ever hold
/// the same item (conditional transitions keyed by the expected status).
pub trait QueueStore: Send + Sync + Clone {
    fn insert(&self, item: QueueItem) -> impl Future<Output = Result<QueueItem, AppError>> + Send;

    /// Atomically transition up to `limit` of the oldest due pending items
    /// to processing and return them.
    fn claim(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<QueueItem>, AppError>> + Send;

    /// processing → pending with the next stage and payload (stage advance).
    fn mark_advanced(
        &self,
        id: Uuid,
        next_stage: Stage,
        payload: StagePayload,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// processing → a terminal status, with an optional note (error message
    /// or filter reason), category, and final payload (fan-out summary).
    fn mark_terminal(
        &self,
        id: Uuid,
        status: ItemStatus,
        note: Option<&str>,
        category: Option<ErrorCategory>,
        payload: Option<StagePayload>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// processing → pending with retry_count + 1 and a backoff deadline.
    fn mark_retry(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
        error: &str,
        category: ErrorCategory,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// processing → pending without counting a retry (graceful shutdown of
    /// a worker that claimed more than it processed).
    fn release(&self, id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<QueueItem>, AppError>> + Send;

    /// Is a non-terminal job item already queued for this normalized URL?
    fn url_in_queue(&self, url: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn counts(&self) -> impl Future<Output = Result<QueueStats, AppError>> + Send;
}

/// What a processor decided about the item it was handed.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Move to the next stage with this payload.
    Advance(StagePayload),
    /// The final stage finished; optionally record a summary payload.
    Complete(Option<StagePayload>),
    /// Rejected by a deterministic gate. An ordinary terminal state, not a
    /// failure.
    Filtered(String),
    /// Nothing to do (duplicate work, empty input, blocked source).
    Skipped(String),
}

/// What the queue did with a completed item, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionAction {
    Advanced(Stage),
    Succeeded,
    Filtered,
    Skipped,
    Retrying {
        attempt: u32,
        category: ErrorCategory,
        at: DateTime<Utc>,
    },
    Failed(ErrorCategory),
}

/// Coordinates all queue item mutations. Processors own payloads; everything
/// that touches status, retries, or lineage goes through here.
#[derive(Clone)]
pub struct QueueManager<Q: QueueStore> {
    store: Q,
    retry: RetryConfig,
    spawn_policy: SpawnPolicy,
}

impl<Q: QueueStore> QueueManager<Q> {
    pub fn new(store: Q, retry: RetryConfig, spawn_policy: SpawnPolicy) -> Self {
        Self {
            store,
            retry,
            spawn_policy,
        }
    }

    pub fn with_defaults(store: Q) -> Self {
        Self::new(store, RetryConfig::default(), SpawnPolicy::default())
    }

    pub fn store(&self) -> &Q {
        &self.store
    }

    /// Enqueue a root item (fresh tracking id, depth 0).
    ///
    /// Returns [`AppError::Duplicate`] when a non-terminal item with the
    /// same dedupe key exists; callers treat that as "already queued".
    pub async fn enqueue(&self, new_item: NewQueueItem) -> Result<QueueItem, AppError> {
        let tracking_id = Uuid::new_v4();
        let item = self.build_item(new_item, tracking_id, Vec::new(), 0)?;
        self.store.insert(item).await
    }

    /// Enqueue a child of `parent`: same tracking id, parent appended to the
    /// ancestry, depth + 1, bounded by the spawn cap. A dedupe hit is not an
    /// error here; it returns `Ok(None)` ("already queued").
    pub async fn spawn(
        &self,
        parent: &QueueItem,
        new_item: NewQueueItem,
    ) -> Result<Option<QueueItem>, AppError> {
        let depth = parent.spawn_depth + 1;
        if depth > self.spawn_policy.max_depth {
            return Err(AppError::SpawnDepthExceeded {
                depth,
                max: self.spawn_policy.max_depth,
            });
        }

        let mut ancestry = parent.ancestry.clone();
        ancestry.push(parent.id);

        let item = self.build_item(new_item, parent.tracking_id, ancestry, depth)?;
        match self.store.insert(item).await {
            Ok(item) => Ok(Some(item)),
            Err(AppError::Duplicate(key)) => {
                tracing::debug!(%key, parent = %parent.id, "Spawn deduplicated");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn build_item(
        &self,
        new_item: NewQueueItem,
        tracking_id: Uuid,
        ancestry: Vec<Uuid>,
        spawn_depth: u32,
    ) -> Result<QueueItem, AppError> {
        let dedupe_key = new_item.dedupe_key(tracking_id)?;
        let now = Utc::now();
        Ok(QueueItem {
            id: Uuid::new_v4(),
            item_type: new_item.item_type,
            stage: Stage::initial(new_item.item_type),
            status: ItemStatus::Pending,
            url: new_item.url,
            company_name: new_item.company_name,
            company_id: new_item.company_id,
            source_id: new_item.source_id,
            tracking_id,
            ancestry,
            spawn_depth,
            dedupe_key,
            retry_count: 0,
            max_retries: new_item.max_retries.unwrap_or(self.retry.max_retries),
            next_retry_at: None,
            last_error: None,
            last_error_category: None,
            payload: new_item.payload,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    /// Claim up to `limit` pending items for processing.
    pub async fn claim(&self, limit: u32) -> Result<Vec<QueueItem>, AppError> {
        self.store.claim(limit, Utc::now()).await
    }

    /// Release a claimed item untouched (no retry counted).
    pub async fn release(&self, item: &QueueItem) -> Result<(), AppError> {
        self.store.release(item.id).await
    }

    /// Apply a processor verdict (or error) to a claimed item.
    ///
    /// Errors are classified: TRANSIENT and RESOURCE retry with backoff up
    /// to `max_retries`, UNKNOWN gets a bounded conservative retry,
    /// PERMANENT fails immediately.
    pub async fn complete(
        &self,
        item: &QueueItem,
        outcome: Result<ProcessOutcome, AppError>,
    ) -> Result<CompletionAction, AppError> {
        match outcome {
            Ok(ProcessOutcome::Advance(payload)) => {
                let next = item.stage.next(item.item_type).ok_or_else(|| {
                    AppError::Generic(format!(
                        "{} item {} cannot advance past {}",
                        item.item_type, item.id, item.stage
                    ))
                })?;
                self.store.mark_advanced(item.id, next, payload).await?;
                Ok(CompletionAction::Advanced(next))
            }
            Ok(ProcessOutcome::Complete(summary)) => {
                self.store
                    .mark_terminal(item.id, ItemStatus::Success, None, None, summary)
                    .await?;
                Ok(CompletionAction::Succeeded)
            }
            Ok(ProcessOutcome::Filtered(reason)) => {
                self.store
                    .mark_terminal(item.id, ItemStatus::Filtered, Some(&reason), None, None)
                    .await?;
                Ok(CompletionAction::Filtered)
            }
            Ok(ProcessOutcome::Skipped(reason)) => {
                self.store
                    .mark_terminal(item.id, ItemStatus::Skipped, Some(&reason), None, None)
                    .await?;
                Ok(CompletionAction::Skipped)
            }
            Err(error) => {
                let category = error.category();
                let message = error.to_string();
                let attempts_allowed =
                    std::cmp::min(self.retry.attempts_for(category), item.max_retries);

                if item.retry_count < attempts_allowed {
                    let at = item.next_retry(&self.retry, Utc::now());
                    self.store
                        .mark_retry(item.id, at, &message, category)
                        .await?;
                    Ok(CompletionAction::Retrying {
                        attempt: item.retry_count + 1,
                        category,
                        at,
                    })
                } else {
                    self.store
                        .mark_terminal(
                            item.id,
                            ItemStatus::Failed,
                            Some(&message),
                            Some(category),
                            None,
                        )
                        .await?;
                    Ok(CompletionAction::Failed(category))
                }
            }
        }
    }

    pub async fn stats(&self) -> Result<QueueStats, AppError> {
        self.store.counts().await
    }
}
