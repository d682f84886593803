//! Cheap deterministic rejection gates, run before any AI cost is spent.

mod prefilter;
mod title;

pub use prefilter::prefilter;
pub use title::title_filter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::ListingDraft;
use crate::policy::PolicyBundle;

/// How a single rule rejected a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Immediate fail regardless of accumulated strikes.
    Hard,
    /// Penalty points; enough of them fail the posting.
    Strike(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub rule: String,
    pub kind: RejectionKind,
}

impl Rejection {
    pub fn hard(rule: impl Into<String>) -> Rejection {
        Rejection {
            rule: rule.into(),
            kind: RejectionKind::Hard,
        }
    }

    pub fn strike(rule: impl Into<String>, points: u32) -> Rejection {
        Rejection {
            rule: rule.into(),
            kind: RejectionKind::Strike(points),
        }
    }
}

/// Outcome of the filter gates for one posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub rejections: Vec<Rejection>,
    pub strike_total: u32,
    pub strike_threshold: u32,
}

impl FilterResult {
    pub(crate) fn from_rejections(rejections: Vec<Rejection>, threshold: u32) -> FilterResult {
        let strike_total = rejections
            .iter()
            .map(|r| match r.kind {
                RejectionKind::Strike(points) => points,
                RejectionKind::Hard => 0,
            })
            .sum();
        let any_hard = rejections.iter().any(|r| r.kind == RejectionKind::Hard);
        FilterResult {
            passed: !any_hard && strike_total < threshold,
            rejections,
            strike_total,
            strike_threshold: threshold,
        }
    }

    /// Short human-readable reason for the terminal status message.
    pub fn reason(&self) -> String {
        if let Some(hard) = self
            .rejections
            .iter()
            .find(|r| r.kind == RejectionKind::Hard)
        {
            return hard.rule.clone();
        }
        format!(
            "strikes {}/{}: {}",
            self.strike_total,
            self.strike_threshold,
            self.rejections
                .iter()
                .map(|r| r.rule.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Run the title filter, then the full strike-based pre-filter.
///
/// Title rejections short-circuit: the pre-filter never runs for them.
pub fn run_filters(listing: &ListingDraft, policy: &PolicyBundle, now: DateTime<Utc>) -> FilterResult {
    if let Some(rejection) = title_filter(&listing.title, &policy.title) {
        return FilterResult::from_rejections(vec![rejection], policy.prefilter.strike_threshold);
    }
    prefilter(listing, &policy.prefilter, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::compute_hash;
    use crate::payload::WorkArrangement;

    pub(crate) fn make_listing() -> ListingDraft {
        let description = "Build backend services in Rust.".to_string();
        ListingDraft {
            url: "https://example.com/jobs/1".into(),
            title: "Senior Rust Engineer".into(),
            company_name: "Acme".into(),
            content_hash: compute_hash(&description),
            description,
            location: Some("Remote".into()),
            work_arrangement: WorkArrangement::Remote,
            posted_at: Some(Utc::now()),
            salary_min: Some(120_000),
            salary_max: Some(160_000),
            employment_type: Some("full_time".into()),
            timezone_offset: Some(0),
            source_id: None,
        }
    }

    #[test]
    fn title_reject_short_circuits_prefilter() {
        let mut policy = PolicyBundle::default();
        policy.title.excluded_keywords = vec!["engineer".into()];
        // Would also hard-reject on age, but the title gate runs first.
        let mut listing = make_listing();
        listing.posted_at = Some(Utc::now() - chrono::TimeDelta::days(400));

        let result = run_filters(&listing, &policy, Utc::now());
        assert!(!result.passed);
        assert_eq!(result.rejections.len(), 1);
        assert!(result.rejections[0].rule.starts_with("title_excluded"));
    }

    #[test]
    fn clean_listing_passes_both_gates() {
        let policy = PolicyBundle::default();
        let result = run_filters(&make_listing(), &policy, Utc::now());
        assert!(result.passed, "{:?}", result.rejections);
        assert_eq!(result.strike_total, 0);
    }

    #[test]
    fn reason_prefers_hard_rejection() {
        let result = FilterResult::from_rejections(
            vec![
                Rejection::strike("stale_posting", 2),
                Rejection::hard("technology_blacklisted:php"),
            ],
            6,
        );
        assert_eq!(result.reason(), "technology_blacklisted:php");
    }

    #[test]
    fn reason_lists_strikes() {
        let result = FilterResult::from_rejections(
            vec![
                Rejection::strike("stale_posting", 2),
                Rejection::strike("timezone_offset:4h", 4),
            ],
            6,
        );
        assert!(!result.passed);
        assert!(result.reason().starts_with("strikes 6/6"));
    }
}
