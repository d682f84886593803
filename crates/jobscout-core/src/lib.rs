//! jobscout-core: the multi-stage work-queue pipeline behind jobscout.
//!
//! Everything here is deterministic library code driven through collaborator
//! traits; adapters, inference clients, and the Postgres repositories live
//! in sibling crates.

pub mod breaker;
pub mod error;
pub mod filter;
pub mod item;
pub mod models;
pub mod payload;
pub mod pipeline;
pub mod policy;
pub mod queue;
pub mod rotation;
pub mod scoring;
pub mod source;
#[cfg(test)]
mod testutil;
pub mod traits;
pub mod url;
pub mod worker;

pub use error::{AppError, ErrorCategory};
pub use item::{ItemStatus, ItemType, NewQueueItem, QueueItem, RetryConfig, SpawnPolicy, Stage};
pub use pipeline::Pipeline;
pub use queue::{CompletionAction, ProcessOutcome, QueueManager, QueueStats, QueueStore};
pub use url::normalize_url;
pub use worker::{TracingWorkerReporter, Worker, WorkerConfig};
