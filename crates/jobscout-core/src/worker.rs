//! Worker loop: claim a batch, process each item synchronously, observe the
//! stop signal between items. Parallelism comes from running several worker
//! loops against the shared store; the atomic claim keeps them disjoint.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::item::QueueItem;
use crate::pipeline::Pipeline;
use crate::policy::PolicyProvider;
use crate::queue::{CompletionAction, QueueStore};
use crate::traits::{
    CompanyStore, Fetcher, Inference, ListingStore, MatchStore, ScraperAdapter, SourceStore,
};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    BatchClaimed {
        count: usize,
    },
    ItemStarted {
        item: &'a QueueItem,
    },
    ItemFinished {
        item_id: Uuid,
        action: &'a CompletionAction,
    },
    /// Claimed but handed back untouched during shutdown.
    ItemReleased {
        item_id: Uuid,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for items");
            }
            WorkerEvent::BatchClaimed { count } => {
                tracing::debug!(count, "Claimed batch");
            }
            WorkerEvent::ItemStarted { item } => {
                tracing::info!(
                    item = %item.id,
                    item_type = %item.item_type,
                    stage = %item.stage,
                    "Processing item"
                );
            }
            WorkerEvent::ItemFinished { item_id, action } => match action {
                CompletionAction::Failed(category) => {
                    tracing::warn!(item = %item_id, %category, "Item failed");
                }
                CompletionAction::Retrying {
                    attempt, category, ..
                } => {
                    tracing::warn!(item = %item_id, attempt, %category, "Item will retry");
                }
                other => {
                    tracing::info!(item = %item_id, action = ?other, "Item finished");
                }
            },
            WorkerEvent::ItemReleased { item_id } => {
                tracing::info!(item = %item_id, "Item released during shutdown");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Configuration for one worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub batch_size: u32,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            batch_size: 8,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Drives a [`Pipeline`] from the queue until cancellation.
pub struct Worker<Q, A, F, I, SS, CS, LS, MS, P>
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
    pipeline: Pipeline<Q, A, F, I, SS, CS, LS, MS, P>,
    config: WorkerConfig,
}

impl<Q, A, F, I, SS, CS, LS, MS, P> Worker<Q, A, F, I, SS, CS, LS, MS, P>
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
    pub fn new(pipeline: Pipeline<Q, A, F, I, SS, CS, LS, MS, P>, config: WorkerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Run until the token is cancelled. The current item is always finished
    /// before exiting; remaining claimed items are released back to pending.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        'outer: loop {
            if cancel.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.pipeline.queue().claim(self.config.batch_size).await {
                Ok(batch) if !batch.is_empty() => {
                    reporter.report(WorkerEvent::BatchClaimed { count: batch.len() });

                    let mut items = batch.into_iter();
                    while let Some(item) = items.next() {
                        reporter.report(WorkerEvent::ItemStarted { item: &item });

                        let outcome = self.pipeline.process(&item).await;
                        match self.pipeline.queue().complete(&item, outcome).await {
                            Ok(action) => reporter.report(WorkerEvent::ItemFinished {
                                item_id: item.id,
                                action: &action,
                            }),
                            Err(e) => {
                                tracing::error!(item = %item.id, error = %e, "Failed to record completion");
                            }
                        }

                        // Finish the current item, then stop; hand back
                        // whatever else this batch claimed.
                        if cancel.is_cancelled() {
                            for rest in items {
                                if let Err(e) = self.pipeline.queue().release(&rest).await {
                                    tracing::error!(item = %rest.id, error = %e, "Failed to release item");
                                } else {
                                    reporter.report(WorkerEvent::ItemReleased { item_id: rest.id });
                                }
                            }
                            break 'outer;
                        }
                    }
                }
                Ok(_) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim batch");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel.cancelled() => break,
                    }
                }
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
        Ok(())
    }
}
