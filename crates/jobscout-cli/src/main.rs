use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use jobscout_client::{OpenAiInference, ReqwestFetcher};
use jobscout_core::Pipeline;
use jobscout_core::error::AppError;
use jobscout_core::item::NewQueueItem;
use jobscout_core::payload::RawPosting;
use jobscout_core::policy::{FilePolicyProvider, PolicyProvider};
use jobscout_core::queue::QueueManager;
use jobscout_core::source::Source;
use jobscout_core::traits::{Fetcher, ScraperAdapter};
use jobscout_core::worker::{TracingWorkerReporter, Worker, WorkerConfig};
use jobscout_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "jobscout", version, about = "Automated job discovery pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a scrape run across the rotation
    Scrape {
        /// Stop fanning out once this many matches are recorded
        #[arg(short, long, default_value_t = 5)]
        target_matches: u32,

        /// Scrape at most this many sources
        #[arg(short, long, default_value_t = 10)]
        max_sources: u32,

        /// Restrict the run to specific source ids (repeatable)
        #[arg(short, long = "source")]
        source_ids: Vec<Uuid>,
    },

    /// Run worker loops until interrupted
    Worker {
        /// Number of concurrent worker loops
        #[arg(short, long, default_value_t = 2)]
        workers: usize,

        /// Items claimed per poll
        #[arg(short, long, default_value_t = 8)]
        batch_size: u32,

        /// Seconds to sleep when the queue is empty
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,

        /// Path to the JSON policy file (re-read per item)
        #[arg(short = 'p', long, env = "JOBSCOUT_POLICY")]
        policy: PathBuf,

        /// Inference model (e.g. "gpt-4o-mini", "gemini-2.5-flash")
        #[arg(short, long, env = "JOBSCOUT_MODEL")]
        model: String,

        /// OpenAI-compatible API base URL
        #[arg(
            long,
            env = "JOBSCOUT_BASE_URL",
            default_value = "https://api.openai.com/v1"
        )]
        base_url: String,

        /// API key for the inference backend
        #[arg(short, long, env = "JOBSCOUT_API_KEY")]
        api_key: String,
    },

    /// Show queue counts per status
    Stats,

    /// List configured scrape sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobscout=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            target_matches,
            max_sources,
            source_ids,
        } => cmd_scrape(target_matches, max_sources, source_ids).await,
        Commands::Worker {
            workers,
            batch_size,
            poll_interval,
            policy,
            model,
            base_url,
            api_key,
        } => {
            cmd_worker(
                workers,
                batch_size,
                poll_interval,
                policy,
                &model,
                &base_url,
                &api_key,
            )
            .await
        }
        Commands::Stats => cmd_stats().await,
        Commands::Sources => cmd_sources().await,
    }
}

async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn cmd_scrape(target_matches: u32, max_sources: u32, source_ids: Vec<Uuid>) -> Result<()> {
    let db = connect_db().await?;
    let queue = QueueManager::with_defaults(db.queue_repo());

    let ids = if source_ids.is_empty() {
        None
    } else {
        Some(source_ids)
    };
    match queue
        .enqueue(NewQueueItem::scrape(target_matches, max_sources, ids))
        .await
    {
        Ok(item) => {
            println!("Enqueued scrape {} (tracking {})", item.id, item.tracking_id);
            Ok(())
        }
        Err(AppError::Duplicate(key)) => {
            println!("A scrape request is already queued ({key})");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}

async fn cmd_worker(
    workers: usize,
    batch_size: u32,
    poll_interval: u64,
    policy: PathBuf,
    model: &str,
    base_url: &str,
    api_key: &str,
) -> Result<()> {
    let db = connect_db().await?;
    let fetcher = ReqwestFetcher::new().map_err(|e| anyhow::anyhow!(e))?;
    let inference =
        OpenAiInference::with_base_url(api_key, model, base_url).map_err(|e| anyhow::anyhow!(e))?;

    // Fail fast on an unreadable policy file; workers re-read it per item.
    let provider = FilePolicyProvider::new(policy);
    provider.load().map_err(|e| anyhow::anyhow!(e))?;

    let pipeline = Pipeline::new(
        QueueManager::with_defaults(db.queue_repo()),
        FeedAdapter::new(fetcher.clone()),
        fetcher,
        inference,
        db.source_repo(),
        db.company_repo(),
        db.listing_repo(),
        db.match_repo(),
        Arc::new(provider),
    );

    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(workers);
    for i in 0..workers {
        let worker = Worker::new(
            pipeline.clone(),
            WorkerConfig::default()
                .with_worker_id(format!("worker-{i}"))
                .with_batch_size(batch_size)
                .with_poll_interval(Duration::from_secs(poll_interval)),
        );
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            worker.run(token, &TracingWorkerReporter).await
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested, finishing current items");
    cancel.cancel();

    for handle in handles {
        handle.await.context("Worker task panicked")??;
    }
    Ok(())
}

async fn cmd_stats() -> Result<()> {
    let db = connect_db().await?;
    let queue = QueueManager::with_defaults(db.queue_repo());
    let stats = queue.stats().await.map_err(|e| anyhow::anyhow!(e))?;

    println!("pending     {:>8}", stats.pending);
    println!("processing  {:>8}", stats.processing);
    println!("success     {:>8}", stats.success);
    println!("failed      {:>8}", stats.failed);
    println!("skipped     {:>8}", stats.skipped);
    println!("filtered    {:>8}", stats.filtered);
    println!("total       {:>8}", stats.total());
    Ok(())
}

async fn cmd_sources() -> Result<()> {
    let db = connect_db().await?;
    let sources = db.source_repo().list().await.map_err(|e| anyhow::anyhow!(e))?;

    if sources.is_empty() {
        println!("No sources configured");
        return Ok(());
    }

    for source in sources {
        let last = source
            .last_scraped_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  [{}/{}] health={:.2} last={}  {}",
            source.id, source.tier, source.status, source.health_score, last, source.name
        );
    }
    Ok(())
}

/// Adapter for sources whose URL serves a JSON array of raw postings.
///
/// Board-specific adapters (Greenhouse, Workday, RSS) plug in through the
/// same trait; this binary ships the feed shape because it needs no
/// per-site parsing.
#[derive(Clone)]
struct FeedAdapter {
    fetcher: ReqwestFetcher,
}

impl FeedAdapter {
    fn new(fetcher: ReqwestFetcher) -> Self {
        Self { fetcher }
    }
}

impl ScraperAdapter for FeedAdapter {
    async fn scrape(&self, source: &Source) -> Result<Vec<RawPosting>, AppError> {
        let body = self.fetcher.fetch(&source.url).await?;
        serde_json::from_str(&body).map_err(|e| {
            AppError::Extraction(format!(
                "source {} did not return a posting feed: {e}",
                source.name
            ))
        })
    }
}
