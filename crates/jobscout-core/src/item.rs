use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ErrorCategory};
use crate::payload::StagePayload;
use crate::url::normalize_url;

/// Kind of work a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Job,
    Company,
    Scrape,
    ScrapeSource,
    SourceDiscovery,
    AgentReview,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Job => "job",
            ItemType::Company => "company",
            ItemType::Scrape => "scrape",
            ItemType::ScrapeSource => "scrape_source",
            ItemType::SourceDiscovery => "source_discovery",
            ItemType::AgentReview => "agent_review",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "job" => Ok(ItemType::Job),
            "company" => Ok(ItemType::Company),
            "scrape" => Ok(ItemType::Scrape),
            "scrape_source" => Ok(ItemType::ScrapeSource),
            "source_discovery" => Ok(ItemType::SourceDiscovery),
            "agent_review" => Ok(ItemType::AgentReview),
            _ => Err(format!("Unknown item type: {}", s)),
        }
    }
}

/// Sub-stage within an item's pipeline. Which stages apply depends on the
/// item type: jobs run Scrape→Filter→Analyze→Save, companies run
/// Fetch→Extract→Analyze→Save, everything else is single-stage `Run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Filter,
    Analyze,
    Save,
    Fetch,
    Extract,
    Run,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Filter => "filter",
            Stage::Analyze => "analyze",
            Stage::Save => "save",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Run => "run",
        }
    }

    /// The stage a freshly enqueued item of the given type starts in.
    pub fn initial(item_type: ItemType) -> Stage {
        match item_type {
            ItemType::Job => Stage::Scrape,
            ItemType::Company => Stage::Fetch,
            _ => Stage::Run,
        }
    }

    /// The successor stage for the given item type, or `None` if this stage
    /// is the last one.
    pub fn next(self, item_type: ItemType) -> Option<Stage> {
        match item_type {
            ItemType::Job => match self {
                Stage::Scrape => Some(Stage::Filter),
                Stage::Filter => Some(Stage::Analyze),
                Stage::Analyze => Some(Stage::Save),
                _ => None,
            },
            ItemType::Company => match self {
                Stage::Fetch => Some(Stage::Extract),
                Stage::Extract => Some(Stage::Analyze),
                Stage::Analyze => Some(Stage::Save),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn valid_for(self, item_type: ItemType) -> bool {
        match item_type {
            ItemType::Job => matches!(
                self,
                Stage::Scrape | Stage::Filter | Stage::Analyze | Stage::Save
            ),
            ItemType::Company => matches!(
                self,
                Stage::Fetch | Stage::Extract | Stage::Analyze | Stage::Save
            ),
            _ => self == Stage::Run,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scrape" => Ok(Stage::Scrape),
            "filter" => Ok(Stage::Filter),
            "analyze" => Ok(Stage::Analyze),
            "save" => Ok(Stage::Save),
            "fetch" => Ok(Stage::Fetch),
            "extract" => Ok(Stage::Extract),
            "run" => Ok(Stage::Run),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Status of a queue item.
///
/// Transition graph: pending→processing→{success,failed,skipped,filtered},
/// processing→pending (stage advance or retry), failed→pending (manual
/// requeue while retries remain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Skipped,
    Filtered,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Success => "success",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Filtered => "filtered",
        }
    }

    /// Terminal items are retained for audit history and no longer count
    /// toward dedupe uniqueness.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Success | ItemStatus::Failed | ItemStatus::Skipped | ItemStatus::Filtered
        )
    }

    pub fn can_transition(self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (ItemStatus::Pending, ItemStatus::Processing)
                | (ItemStatus::Processing, ItemStatus::Success)
                | (ItemStatus::Processing, ItemStatus::Failed)
                | (ItemStatus::Processing, ItemStatus::Skipped)
                | (ItemStatus::Processing, ItemStatus::Filtered)
                | (ItemStatus::Processing, ItemStatus::Pending)
                | (ItemStatus::Failed, ItemStatus::Pending)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "processing" => Ok(ItemStatus::Processing),
            "success" => Ok(ItemStatus::Success),
            "failed" => Ok(ItemStatus::Failed),
            "skipped" => Ok(ItemStatus::Skipped),
            "filtered" => Ok(ItemStatus::Filtered),
            _ => Err(format!("Unknown item status: {}", s)),
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// How many attempts an UNKNOWN-category failure gets before failing.
    pub unknown_retry_cap: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            unknown_retry_cap: 1,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }

    /// Attempts permitted for a failure of the given category.
    pub fn attempts_for(&self, category: ErrorCategory) -> u32 {
        match category {
            ErrorCategory::Transient | ErrorCategory::Resource => self.max_retries,
            ErrorCategory::Unknown => std::cmp::min(self.max_retries, self.unknown_retry_cap),
            ErrorCategory::Permanent => 0,
        }
    }
}

/// Bound on cascading item spawning (company → source-discovery → company).
#[derive(Debug, Clone)]
pub struct SpawnPolicy {
    pub max_depth: u32,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

/// A unit of pipeline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub item_type: ItemType,
    pub stage: Stage,
    pub status: ItemStatus,
    pub url: Option<String>,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    /// Correlation id shared by this item's entire spawn lineage.
    pub tracking_id: Uuid,
    /// Ordered ancestor item ids, root first.
    pub ancestry: Vec<Uuid>,
    pub spawn_depth: u32,
    /// Canonical key; unique among non-terminal items.
    pub dedupe_key: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_category: Option<ErrorCategory>,
    pub payload: StagePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn next_retry(&self, config: &RetryConfig, now: DateTime<Utc>) -> DateTime<Utc> {
        now + config.delay_for_attempt(self.retry_count + 1)
    }
}

/// Request to enqueue a new item. Lineage fields (tracking id, ancestry,
/// depth) are filled in by the queue manager.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub item_type: ItemType,
    pub url: Option<String>,
    pub company_name: Option<String>,
    pub company_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub payload: StagePayload,
    pub max_retries: Option<u32>,
}

impl NewQueueItem {
    pub fn scrape(target_matches: u32, max_sources: u32, source_ids: Option<Vec<Uuid>>) -> Self {
        Self {
            item_type: ItemType::Scrape,
            url: None,
            company_name: None,
            company_id: None,
            source_id: None,
            payload: StagePayload::ScrapeRequest {
                target_matches,
                max_sources,
                source_ids,
            },
            max_retries: None,
        }
    }

    pub fn scrape_source(source_id: Uuid) -> Self {
        Self {
            item_type: ItemType::ScrapeSource,
            url: None,
            company_name: None,
            company_id: None,
            source_id: Some(source_id),
            payload: StagePayload::SourceScrape,
            max_retries: None,
        }
    }

    pub fn job(url: String, posting: crate::payload::RawPosting, source_id: Option<Uuid>) -> Self {
        Self {
            item_type: ItemType::Job,
            company_name: if posting.company.is_empty() {
                None
            } else {
                Some(posting.company.clone())
            },
            company_id: None,
            source_id,
            url: Some(url),
            payload: StagePayload::JobPosting { posting },
            max_retries: None,
        }
    }

    pub fn company(name: Option<String>, company_id: Option<Uuid>) -> Self {
        Self {
            item_type: ItemType::Company,
            url: None,
            company_name: name,
            company_id,
            source_id: None,
            payload: StagePayload::CompanyLookup,
            max_retries: None,
        }
    }

    pub fn source_discovery(company_id: Uuid) -> Self {
        Self {
            item_type: ItemType::SourceDiscovery,
            url: None,
            company_name: None,
            company_id: Some(company_id),
            source_id: None,
            payload: StagePayload::Discovery,
            max_retries: None,
        }
    }

    pub fn agent_review(
        match_id: Uuid,
        listing: crate::payload::ListingDraft,
        extraction: crate::payload::JobExtraction,
    ) -> Self {
        Self {
            item_type: ItemType::AgentReview,
            url: None,
            company_name: None,
            company_id: None,
            source_id: None,
            payload: StagePayload::Review {
                match_id,
                listing,
                extraction,
            },
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    /// Derive the canonical dedupe key for this item.
    ///
    /// Jobs key on the normalized URL, companies on id → name slug →
    /// tracking id, scrape-source on the source id, source-discovery on the
    /// company id, reviews on the match id. Everything else keys on the
    /// tracking id, which permits one active item of that type per lineage.
    pub fn dedupe_key(&self, tracking_id: Uuid) -> Result<String, AppError> {
        match self.item_type {
            ItemType::Job => {
                let url = self.url.as_deref().ok_or_else(|| {
                    AppError::Config("job item requires a url for dedupe".into())
                })?;
                Ok(format!("job|{}", normalize_url(url)?))
            }
            ItemType::Company => {
                if let Some(id) = self.company_id {
                    Ok(format!("company|{id}"))
                } else if let Some(name) = self.company_name.as_deref().filter(|n| !n.is_empty()) {
                    Ok(format!("company|{}", company_slug(name)))
                } else {
                    Ok(format!("company|{tracking_id}"))
                }
            }
            ItemType::ScrapeSource => {
                let source_id = self.source_id.ok_or_else(|| {
                    AppError::Config("scrape_source item requires a source_id".into())
                })?;
                Ok(format!("scrape_source|{source_id}"))
            }
            ItemType::SourceDiscovery => match self.company_id {
                Some(id) => Ok(format!("source_discovery|{id}")),
                None => Ok(format!("source_discovery|{tracking_id}")),
            },
            ItemType::AgentReview => match &self.payload {
                StagePayload::Review { match_id, .. } => Ok(format!("agent_review|{match_id}")),
                _ => Ok(format!("agent_review|{tracking_id}")),
            },
            other => Ok(format!("{other}|{tracking_id}")),
        }
    }
}

/// Lowercase alphanumeric slug of a company name, used in dedupe keys.
pub fn company_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
