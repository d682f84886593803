use chrono::{DateTime, Utc};

use crate::filter::title::keyword_matches;
use crate::filter::{FilterResult, Rejection};
use crate::payload::{ListingDraft, WorkArrangement};
use crate::policy::PrefilterPolicy;

/// Strike-based pre-filter over independent rule categories.
///
/// Every category is evaluated (no short-circuit) so the result lists all
/// grounds for rejection, not just the first.
pub fn prefilter(
    listing: &ListingDraft,
    policy: &PrefilterPolicy,
    now: DateTime<Utc>,
) -> FilterResult {
    let rules = [
        location_rule(listing, policy),
        age_rule(listing, policy, now),
        technology_rule(listing, policy),
        salary_rule(listing, policy),
        employment_rule(listing, policy),
    ];
    let rejections = rules.into_iter().flatten().collect();
    FilterResult::from_rejections(rejections, policy.strike_threshold)
}

/// Onsite/hybrid outside the user's city hard-rejects (or takes the
/// relocation strike); remote accrues per-hour timezone strikes up to a
/// hard-reject cap.
fn location_rule(listing: &ListingDraft, policy: &PrefilterPolicy) -> Option<Rejection> {
    match listing.work_arrangement {
        WorkArrangement::Onsite | WorkArrangement::Hybrid => {
            if policy.user_city.is_empty() {
                return None;
            }
            let in_city = listing
                .location
                .as_deref()
                .is_some_and(|loc| loc.to_lowercase().contains(&policy.user_city.to_lowercase()));
            if in_city {
                None
            } else if policy.allow_relocation {
                Some(Rejection::strike(
                    "relocation_required",
                    policy.relocation_strike,
                ))
            } else {
                Some(Rejection::hard("onsite_outside_city"))
            }
        }
        WorkArrangement::Remote => {
            let offset = listing.timezone_offset?;
            let diff = (offset - policy.user_timezone_offset).abs();
            if diff > policy.max_timezone_diff_hours {
                Some(Rejection::hard(format!("timezone_gap:{diff}h")))
            } else {
                let points = diff as u32 * policy.timezone_strike_per_hour;
                (points > 0)
                    .then(|| Rejection::strike(format!("timezone_offset:{diff}h"), points))
            }
        }
        WorkArrangement::Unknown => None,
    }
}

fn age_rule(
    listing: &ListingDraft,
    policy: &PrefilterPolicy,
    now: DateTime<Utc>,
) -> Option<Rejection> {
    match listing.posted_at {
        Some(posted) => {
            let age_days = (now - posted).num_days();
            if age_days > policy.reject_after_days {
                Some(Rejection::hard(format!("posting_too_old:{age_days}d")))
            } else if age_days > policy.stale_after_days {
                Some(Rejection::strike(
                    format!("stale_posting:{age_days}d"),
                    policy.stale_strike,
                ))
            } else {
                None
            }
        }
        None => (policy.unknown_age_strike > 0)
            .then(|| Rejection::strike("posting_age_unknown", policy.unknown_age_strike)),
    }
}

fn technology_rule(listing: &ListingDraft, policy: &PrefilterPolicy) -> Option<Rejection> {
    policy
        .technology_blacklist
        .iter()
        .find(|tech| {
            keyword_matches(&listing.title, tech) || keyword_matches(&listing.description, tech)
        })
        .map(|tech| Rejection::hard(format!("technology_blacklisted:{tech}")))
}

fn salary_rule(listing: &ListingDraft, policy: &PrefilterPolicy) -> Option<Rejection> {
    let floor = policy.salary_floor?;
    let ceiling = listing.salary_max?;
    (ceiling < floor).then(|| Rejection::hard(format!("salary_below_floor:{ceiling}<{floor}")))
}

fn employment_rule(listing: &ListingDraft, policy: &PrefilterPolicy) -> Option<Rejection> {
    if policy.allowed_employment_types.is_empty() {
        return None;
    }
    let declared = listing.employment_type.as_deref()?;
    let normalized = normalize_employment_type(declared);
    let allowed = policy
        .allowed_employment_types
        .iter()
        .any(|t| normalize_employment_type(t) == normalized);
    (!allowed).then(|| {
        Rejection::strike(
            format!("employment_type:{normalized}"),
            policy.employment_type_strike,
        )
    })
}

fn normalize_employment_type(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}
