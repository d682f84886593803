use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ErrorCategory};

/// Consecutive permanent failures after which a source auto-disables.
pub const AUTO_DISABLE_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Disabled,
    Failed,
    PendingValidation,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Disabled => "disabled",
            SourceStatus::Failed => "failed",
            SourceStatus::PendingValidation => "pending_validation",
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SourceStatus::Active),
            "disabled" => Ok(SourceStatus::Disabled),
            "failed" => Ok(SourceStatus::Failed),
            "pending_validation" => Ok(SourceStatus::PendingValidation),
            _ => Err(format!("Unknown source status: {}", s)),
        }
    }
}

/// Priority bucket used to break rotation ties. S outranks A outranks B …
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    S,
    A,
    B,
    C,
    D,
}

impl SourceTier {
    /// Lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            SourceTier::S => 0,
            SourceTier::A => 1,
            SourceTier::B => 2,
            SourceTier::C => 3,
            SourceTier::D => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::S => "S",
            SourceTier::A => "A",
            SourceTier::B => "B",
            SourceTier::C => "C",
            SourceTier::D => "D",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "S" => Ok(SourceTier::S),
            "A" => Ok(SourceTier::A),
            "B" => Ok(SourceTier::B),
            "C" => Ok(SourceTier::C),
            "D" => Ok(SourceTier::D),
            _ => Err(format!("Unknown source tier: {}", s)),
        }
    }
}

/// A scrape source: one board, feed, or careers page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    /// Which adapter handles this source (e.g. "greenhouse", "rss").
    pub scraper_type: String,
    pub url: String,
    pub status: SourceStatus,
    pub tier: SourceTier,
    pub consecutive_failures: u32,
    /// Running reliability measure in [0, 1]. Success pulls toward 1,
    /// failure toward 0.
    pub health_score: f32,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.health_score = (self.health_score * 0.8 + 0.2).min(1.0);
        self.consecutive_failures = 0;
        self.last_scraped_at = Some(now);
        self.last_error = None;
        if self.status == SourceStatus::Failed {
            self.status = SourceStatus::Active;
        }
        self.updated_at = now;
    }

    /// Record a scrape failure. Permanent failures that reach the
    /// consecutive threshold disable the source with a recorded reason.
    pub fn record_failure(&mut self, error: &AppError, now: DateTime<Utc>) {
        self.health_score *= 0.8;
        self.consecutive_failures += 1;
        self.last_scraped_at = Some(now);
        self.last_error = Some(error.to_string());
        self.updated_at = now;

        if error.category() == ErrorCategory::Permanent
            && self.consecutive_failures >= AUTO_DISABLE_AFTER
        {
            self.disable(format!(
                "auto-disabled after {} consecutive permanent failures: {}",
                self.consecutive_failures, error
            ));
        } else if self.consecutive_failures >= AUTO_DISABLE_AFTER {
            self.status = SourceStatus::Failed;
        }
    }

    pub fn disable(&mut self, reason: String) {
        self.status = SourceStatus::Disabled;
        self.last_error = Some(reason);
    }

    pub fn is_healthy(&self, threshold: f32) -> bool {
        self.health_score >= threshold
    }
}

/// DTO for registering a discovered source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub scraper_type: String,
    pub url: String,
    pub status: SourceStatus,
    pub tier: SourceTier,
    pub company_id: Option<Uuid>,
}
