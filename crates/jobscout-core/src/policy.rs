//! Operator-editable policy: title keyword lists, pre-filter rules, scoring
//! weights, and the candidate profile.
//!
//! The pipeline loads the bundle once per processed item through a
//! [`PolicyProvider`], so an operator editing the policy file changes
//! behavior without a restart. Nothing here may be cached for the life of
//! the process.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Keyword gates applied to the raw title before anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitlePolicy {
    /// Any match rejects the posting outright.
    pub excluded_keywords: Vec<String>,
    /// When non-empty, at least one must match.
    pub required_keywords: Vec<String>,
}

/// Strike-based pre-filter rules. Each category yields a hard reject or a
/// strike worth N points; reaching `strike_threshold` fails the posting even
/// without any hard reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterPolicy {
    pub strike_threshold: u32,

    /// Postings older than this accrue `stale_strike`.
    pub stale_after_days: i64,
    /// Postings older than this are hard-rejected.
    pub reject_after_days: i64,
    pub stale_strike: u32,
    /// Strike for postings with no detectable date.
    pub unknown_age_strike: u32,

    /// Word-boundary match in the description hard-rejects.
    pub technology_blacklist: Vec<String>,

    /// Known salary ceiling below this floor hard-rejects.
    pub salary_floor: Option<u32>,

    /// Employment types that pass without a strike (e.g. "full_time").
    pub allowed_employment_types: Vec<String>,
    pub employment_type_strike: u32,

    pub user_city: String,
    pub user_timezone_offset: i32,
    /// Onsite/hybrid outside the user's city: hard reject, or this strike
    /// when relocation is acceptable.
    pub allow_relocation: bool,
    pub relocation_strike: u32,
    /// Remote postings: strike per hour of timezone difference …
    pub timezone_strike_per_hour: u32,
    /// … and a hard reject beyond this difference.
    pub max_timezone_diff_hours: i32,
}

impl Default for PrefilterPolicy {
    fn default() -> Self {
        Self {
            strike_threshold: 6,
            stale_after_days: 21,
            reject_after_days: 60,
            stale_strike: 2,
            unknown_age_strike: 1,
            technology_blacklist: Vec::new(),
            salary_floor: None,
            allowed_employment_types: vec!["full_time".into()],
            employment_type_strike: 3,
            user_city: String::new(),
            user_timezone_offset: 0,
            allow_relocation: false,
            relocation_strike: 4,
            timezone_strike_per_hour: 1,
            max_timezone_diff_hours: 6,
        }
    }
}

/// One step of the escalating freshness penalty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgePenaltyStep {
    pub after_days: i64,
    pub penalty: i32,
}

/// Deterministic scoring weights applied on top of the AI base score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// A match must reach this final score.
    pub min_score: u8,
    /// Matches at or above this additionally get an agent review pass.
    pub review_threshold: u8,

    pub seniority_bonus: Vec<String>,
    pub seniority_bonus_points: i32,
    pub seniority_penalty: Vec<String>,
    pub seniority_penalty_points: i32,

    pub required_technologies: Vec<String>,
    pub missing_required_penalty: i32,
    pub preferred_technologies: Vec<String>,
    pub preferred_bonus: i32,
    pub disliked_technologies: Vec<String>,
    pub disliked_penalty: i32,
    /// Presence of any of these fails the posting outright.
    pub rejected_technologies: Vec<String>,

    pub target_salary: Option<u32>,
    pub salary_bonus: i32,
    pub salary_penalty: i32,

    /// Postings capping required experience below the candidate's years.
    pub overqualified_penalty: i32,

    pub preferred_role_categories: Vec<String>,
    pub role_fit_bonus: i32,
    pub role_mismatch_penalty: i32,

    pub fresh_within_days: i64,
    pub fresh_bonus: i32,
    /// Sorted ascending by `after_days`; the last applicable step wins.
    pub age_penalty_steps: Vec<AgePenaltyStep>,

    pub remote_first_bonus: i32,
    pub ai_focus_bonus: i32,
    pub small_company_max: u32,
    pub small_company_bonus: i32,
    pub large_company_min: u32,
    pub large_company_penalty: i32,
    pub preferred_cities: Vec<String>,
    pub preferred_city_bonus: i32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            min_score: 65,
            review_threshold: 85,
            seniority_bonus: vec!["senior".into(), "staff".into()],
            seniority_bonus_points: 8,
            seniority_penalty: vec!["junior".into(), "intern".into()],
            seniority_penalty_points: -25,
            required_technologies: Vec::new(),
            missing_required_penalty: -10,
            preferred_technologies: Vec::new(),
            preferred_bonus: 3,
            disliked_technologies: Vec::new(),
            disliked_penalty: -4,
            rejected_technologies: Vec::new(),
            target_salary: None,
            salary_bonus: 5,
            salary_penalty: -8,
            overqualified_penalty: -6,
            preferred_role_categories: Vec::new(),
            role_fit_bonus: 5,
            role_mismatch_penalty: -5,
            fresh_within_days: 3,
            fresh_bonus: 5,
            age_penalty_steps: vec![
                AgePenaltyStep {
                    after_days: 14,
                    penalty: -3,
                },
                AgePenaltyStep {
                    after_days: 30,
                    penalty: -8,
                },
                AgePenaltyStep {
                    after_days: 45,
                    penalty: -15,
                },
            ],
            remote_first_bonus: 4,
            ai_focus_bonus: 4,
            small_company_max: 100,
            small_company_bonus: 3,
            large_company_min: 10000,
            large_company_penalty: -3,
            preferred_cities: Vec::new(),
            preferred_city_bonus: 3,
        }
    }
}

/// The candidate the pipeline matches against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub headline: String,
    pub skills: Vec<String>,
    pub years_experience: u32,
    pub city: String,
    pub timezone_offset: i32,
}

/// The complete reloadable policy bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyBundle {
    pub version: u32,
    pub title: TitlePolicy,
    pub prefilter: PrefilterPolicy,
    pub scoring: ScoringPolicy,
    pub profile: Profile,
}

impl PolicyBundle {
    /// Validate cross-field constraints at load time.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.prefilter.strike_threshold == 0 {
            return Err(AppError::Config(
                "prefilter.strike_threshold must be at least 1".into(),
            ));
        }
        if self.prefilter.reject_after_days < self.prefilter.stale_after_days {
            return Err(AppError::Config(format!(
                "prefilter.reject_after_days ({}) must not be below stale_after_days ({})",
                self.prefilter.reject_after_days, self.prefilter.stale_after_days
            )));
        }
        if self.prefilter.max_timezone_diff_hours < 0 {
            return Err(AppError::Config(
                "prefilter.max_timezone_diff_hours must be non-negative".into(),
            ));
        }
        if self.scoring.min_score > 100 {
            return Err(AppError::Config(
                "scoring.min_score must be within 0..=100".into(),
            ));
        }
        if self.scoring.review_threshold < self.scoring.min_score {
            return Err(AppError::Config(format!(
                "scoring.review_threshold ({}) must not be below min_score ({})",
                self.scoring.review_threshold, self.scoring.min_score
            )));
        }
        Ok(())
    }
}

/// Vends the current policy bundle. Implementations must reflect external
/// edits on the next call; callers load once per processed item.
pub trait PolicyProvider: Send + Sync {
    fn load(&self) -> Result<PolicyBundle, AppError>;
}

/// Reads a JSON policy file on every call.
#[derive(Debug, Clone)]
pub struct FilePolicyProvider {
    path: PathBuf,
}

impl FilePolicyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicyProvider for FilePolicyProvider {
    fn load(&self) -> Result<PolicyBundle, AppError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read policy file {}: {e}",
                self.path.display()
            ))
        })?;
        let bundle: PolicyBundle = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!(
                "Invalid JSON in policy file {}: {e}",
                self.path.display()
            ))
        })?;
        bundle.validate()?;
        Ok(bundle)
    }
}

/// Fixed in-memory bundle, for tests and defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyProvider(pub PolicyBundle);

impl PolicyProvider for StaticPolicyProvider {
    fn load(&self) -> Result<PolicyBundle, AppError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
