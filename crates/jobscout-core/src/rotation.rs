//! Source rotation: which sources get the next slice of scrape budget.
//!
//! Ordering law: healthy sources always precede unhealthy ones; within equal
//! health, the longest-unscraped (never-scraped first) precedes more recent
//! ones; tier only breaks exact-recency ties.

use chrono::{DateTime, Utc};

use crate::source::{Source, SourceStatus};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Sources at or above this health score form the healthy partition.
    pub healthy_threshold: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            healthy_threshold: 0.5,
        }
    }
}

/// Select up to `limit` active sources to scrape next.
pub fn plan_rotation<'a>(
    sources: &'a [Source],
    limit: usize,
    config: &RotationConfig,
) -> Vec<&'a Source> {
    let mut active: Vec<&Source> = sources
        .iter()
        .filter(|s| s.status == SourceStatus::Active)
        .collect();

    active.sort_by_key(|s| {
        (
            !s.is_healthy(config.healthy_threshold),
            s.last_scraped_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            s.tier.priority(),
        )
    });
    active.truncate(limit);
    active
}
