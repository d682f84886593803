//! Deterministic, explainable match scoring.
//!
//! The engine starts from the AI-estimated base fit score and applies ordered
//! signed adjustments from independent axes. Identical inputs and policy
//! produce a byte-identical breakdown, and the full adjustment ledger is
//! retained so every accepted or rejected match is auditable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Company;
use crate::payload::{JobExtraction, ListingDraft, MatchAnalysis};
use crate::policy::{Profile, ScoringPolicy};

/// One signed adjustment with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub reason: String,
    pub delta: i32,
}

/// Auditable scoring verdict.
///
/// Invariant: `base_score + Σ adjustments[i].delta` equals the pre-clamp
/// total; `final_score` is that total clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_score: i32,
    pub adjustments: Vec<ScoreAdjustment>,
    pub final_score: u8,
    pub passed: bool,
    pub rejection_reason: Option<String>,
}

impl ScoreBreakdown {
    /// Pre-clamp total, for invariant checks.
    pub fn raw_total(&self) -> i32 {
        self.base_score + self.adjustments.iter().map(|a| a.delta).sum::<i32>()
    }
}

/// Everything the scorer looks at for one posting.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    pub listing: &'a ListingDraft,
    pub extraction: &'a JobExtraction,
    pub analysis: &'a MatchAnalysis,
    pub company: Option<&'a Company>,
    pub profile: &'a Profile,
    pub now: DateTime<Utc>,
}

/// Score a posting. Axis order is fixed: seniority, technologies, salary,
/// overqualification, role category, freshness, company modifiers.
pub fn score(ctx: &ScoreContext<'_>, policy: &ScoringPolicy) -> ScoreBreakdown {
    let base_score = ctx.analysis.match_score as i32;
    let mut adjustments = Vec::new();
    let mut hard_rejection: Option<String> = None;

    seniority_axis(ctx, policy, &mut adjustments);
    technology_axis(ctx, policy, &mut adjustments, &mut hard_rejection);
    salary_axis(ctx, policy, &mut adjustments);
    overqualification_axis(ctx, policy, &mut adjustments);
    role_axis(ctx, policy, &mut adjustments);
    freshness_axis(ctx, policy, &mut adjustments);
    company_axis(ctx, policy, &mut adjustments);

    let raw = base_score + adjustments.iter().map(|a| a.delta).sum::<i32>();
    let final_score = raw.clamp(0, 100) as u8;

    let rejection_reason = match hard_rejection {
        Some(reason) => Some(reason),
        None if final_score < policy.min_score => Some(format!(
            "below_min_score:{final_score}<{}",
            policy.min_score
        )),
        None => None,
    };

    ScoreBreakdown {
        base_score,
        adjustments,
        final_score,
        passed: rejection_reason.is_none(),
        rejection_reason,
    }
}

fn push(adjustments: &mut Vec<ScoreAdjustment>, reason: String, delta: i32) {
    if delta != 0 {
        adjustments.push(ScoreAdjustment { reason, delta });
    }
}

fn contains_ci(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

fn seniority_axis(ctx: &ScoreContext<'_>, policy: &ScoringPolicy, out: &mut Vec<ScoreAdjustment>) {
    let Some(seniority) = ctx.extraction.seniority.as_deref() else {
        return;
    };
    if contains_ci(&policy.seniority_bonus, seniority) {
        push(
            out,
            format!("seniority_fit:{}", seniority.to_lowercase()),
            policy.seniority_bonus_points,
        );
    } else if contains_ci(&policy.seniority_penalty, seniority) {
        push(
            out,
            format!("seniority_mismatch:{}", seniority.to_lowercase()),
            policy.seniority_penalty_points,
        );
    }
}

fn technology_axis(
    ctx: &ScoreContext<'_>,
    policy: &ScoringPolicy,
    out: &mut Vec<ScoreAdjustment>,
    hard_rejection: &mut Option<String>,
) {
    let techs = &ctx.extraction.technologies;

    if let Some(rejected) = policy
        .rejected_technologies
        .iter()
        .find(|t| contains_ci(techs, t))
        && hard_rejection.is_none()
    {
        *hard_rejection = Some(format!("technology_rejected:{}", rejected.to_lowercase()));
    }

    for required in &policy.required_technologies {
        if !contains_ci(techs, required) {
            push(
                out,
                format!("tech_required_missing:{}", required.to_lowercase()),
                policy.missing_required_penalty,
            );
        }
    }
    for preferred in &policy.preferred_technologies {
        if contains_ci(techs, preferred) {
            push(
                out,
                format!("tech_preferred:{}", preferred.to_lowercase()),
                policy.preferred_bonus,
            );
        }
    }
    for disliked in &policy.disliked_technologies {
        if contains_ci(techs, disliked) {
            push(
                out,
                format!("tech_disliked:{}", disliked.to_lowercase()),
                policy.disliked_penalty,
            );
        }
    }
}

fn salary_axis(ctx: &ScoreContext<'_>, policy: &ScoringPolicy, out: &mut Vec<ScoreAdjustment>) {
    let Some(target) = policy.target_salary else {
        return;
    };
    // Extraction wins over the raw posting when both are present.
    let ceiling = ctx.extraction.salary_max.or(ctx.listing.salary_max);
    match ceiling {
        Some(max) if max >= target => push(out, "salary_meets_target".into(), policy.salary_bonus),
        Some(_) => push(out, "salary_below_target".into(), policy.salary_penalty),
        None => {}
    }
}

fn overqualification_axis(
    ctx: &ScoreContext<'_>,
    policy: &ScoringPolicy,
    out: &mut Vec<ScoreAdjustment>,
) {
    if let Some(cap) = ctx.extraction.experience_max
        && cap < ctx.profile.years_experience
    {
        push(
            out,
            format!("overqualified:role_caps_at_{cap}y"),
            policy.overqualified_penalty,
        );
    }
}

fn role_axis(ctx: &ScoreContext<'_>, policy: &ScoringPolicy, out: &mut Vec<ScoreAdjustment>) {
    if policy.preferred_role_categories.is_empty() {
        return;
    }
    let Some(category) = ctx.extraction.role_category.as_deref() else {
        return;
    };
    if contains_ci(&policy.preferred_role_categories, category) {
        push(
            out,
            format!("role_fit:{}", category.to_lowercase()),
            policy.role_fit_bonus,
        );
    } else {
        push(
            out,
            format!("role_mismatch:{}", category.to_lowercase()),
            policy.role_mismatch_penalty,
        );
    }
}

fn freshness_axis(ctx: &ScoreContext<'_>, policy: &ScoringPolicy, out: &mut Vec<ScoreAdjustment>) {
    let Some(posted) = ctx.listing.posted_at else {
        return;
    };
    let age_days = (ctx.now - posted).num_days();
    if age_days <= policy.fresh_within_days {
        push(
            out,
            format!("fresh_posting:{age_days}d"),
            policy.fresh_bonus,
        );
        return;
    }
    // Escalating penalty: the last step the age has passed wins.
    let step = policy
        .age_penalty_steps
        .iter()
        .filter(|s| age_days > s.after_days)
        .next_back();
    if let Some(step) = step {
        push(out, format!("posting_age:{age_days}d"), step.penalty);
    }
}

fn company_axis(ctx: &ScoreContext<'_>, policy: &ScoringPolicy, out: &mut Vec<ScoreAdjustment>) {
    let Some(company) = ctx.company else {
        return;
    };
    if company.remote_first == Some(true) {
        push(out, "company_remote_first".into(), policy.remote_first_bonus);
    }
    if company.ai_focus == Some(true) {
        push(out, "company_ai_focus".into(), policy.ai_focus_bonus);
    }
    if let Some(size) = company.size_estimate {
        if size <= policy.small_company_max {
            push(
                out,
                format!("company_small:{size}"),
                policy.small_company_bonus,
            );
        } else if size >= policy.large_company_min {
            push(
                out,
                format!("company_large:{size}"),
                policy.large_company_penalty,
            );
        }
    }
    if let Some(city) = company.city.as_deref()
        && contains_ci(&policy.preferred_cities, city)
    {
        push(
            out,
            format!("company_city:{}", city.to_lowercase()),
            policy.preferred_city_bonus,
        );
    }
}
