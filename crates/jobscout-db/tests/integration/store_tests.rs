use chrono::Utc;
use uuid::Uuid;

use jobscout_core::error::AppError;
use jobscout_core::models::{NewCompany, NewListing, NewMatch, SizeBucket, compute_hash};
use jobscout_core::payload::{MatchAnalysis, WorkArrangement};
use jobscout_core::scoring::{ScoreAdjustment, ScoreBreakdown};
use jobscout_core::source::{NewSource, SourceStatus, SourceTier};
use jobscout_core::traits::{CompanyStore, ListingStore, MatchStore, SourceStore};
use jobscout_db::Database;

use crate::common::setup_test_db;

fn new_source(name: &str) -> NewSource {
    NewSource {
        name: name.to_string(),
        scraper_type: "greenhouse".into(),
        url: format!("https://boards.greenhouse.io/{name}"),
        status: SourceStatus::Active,
        tier: SourceTier::B,
        company_id: None,
    }
}

fn new_company(name: &str) -> NewCompany {
    NewCompany {
        name: name.to_string(),
        slug: jobscout_core::item::company_slug(name),
        website: Some("https://acme.dev".into()),
        city: Some("Berlin".into()),
        size_estimate: Some(40),
        size_bucket: Some(SizeBucket::Small),
        remote_first: Some(true),
        ai_focus: None,
        description: None,
        careers_url: None,
        enriched_at: Some(Utc::now()),
    }
}

fn new_listing(url: &str) -> NewListing {
    let description = "Build the pipeline.".to_string();
    NewListing {
        url: url.to_string(),
        title: "Senior Rust Engineer".into(),
        company_name: "Acme".into(),
        company_id: None,
        source_id: None,
        content_hash: compute_hash(&description),
        description,
        location: Some("Remote".into()),
        work_arrangement: WorkArrangement::Remote,
        posted_at: None,
        salary_min: Some(120_000),
        salary_max: Some(160_000),
    }
}

fn breakdown(final_score: u8) -> ScoreBreakdown {
    ScoreBreakdown {
        base_score: final_score as i32 - 5,
        adjustments: vec![ScoreAdjustment {
            reason: "seniority_fit:senior".into(),
            delta: 5,
        }],
        final_score,
        passed: true,
        rejection_reason: None,
    }
}

#[tokio::test]
async fn source_health_round_trips() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).source_repo();

    let mut source = repo.insert(new_source("acme")).await.unwrap();
    assert_eq!(source.status, SourceStatus::Active);
    assert_eq!(source.tier, SourceTier::B);
    assert!((source.health_score - 1.0).abs() < f32::EPSILON);

    source.record_failure(&AppError::Timeout(30), Utc::now());
    repo.update_health(&source).await.unwrap();

    let stored = repo.get(source.id).await.unwrap().unwrap();
    assert_eq!(stored.consecutive_failures, 1);
    assert!(stored.health_score < 1.0);
    assert!(stored.last_scraped_at.is_some());
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn active_excludes_disabled_sources() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).source_repo();

    let keep = repo.insert(new_source("alpha")).await.unwrap();
    let mut blocked = repo.insert(new_source("beta")).await.unwrap();
    blocked.disable("blocked: captcha wall".into());
    repo.update_health(&blocked).await.unwrap();

    let active = repo.active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);
}

#[tokio::test]
async fn sources_link_to_companies() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let companies = db.company_repo();
    let sources = db.source_repo();

    let company = companies.upsert(new_company("Acme Corp")).await.unwrap();
    assert!(sources.for_company(company.id).await.unwrap().is_empty());

    let mut source = new_source("acme");
    source.company_id = Some(company.id);
    sources.insert(source).await.unwrap();

    let linked = sources.for_company(company.id).await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].company_id, Some(company.id));
}

#[tokio::test]
async fn company_upsert_keyed_by_slug_keeps_known_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).company_repo();

    let first = repo.upsert(new_company("Acme Corp")).await.unwrap();

    // A sparse re-enrichment must not erase what we already know.
    let sparse = NewCompany {
        website: None,
        city: None,
        size_estimate: None,
        size_bucket: None,
        remote_first: None,
        ai_focus: Some(true),
        ..new_company("Acme Corp")
    };
    let second = repo.upsert(sparse).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.website.as_deref(), Some("https://acme.dev"));
    assert_eq!(second.city.as_deref(), Some("Berlin"));
    assert_eq!(second.ai_focus, Some(true));

    let found = repo.find_by_name("Acme Corp, Inc.").await.unwrap();
    assert!(found.is_none(), "different slug is a different company");
    let found = repo.find_by_name("acme corp").await.unwrap();
    assert_eq!(found.unwrap().id, first.id);
}

#[tokio::test]
async fn listing_upsert_keyed_by_url() {
    let (pool, _container) = setup_test_db().await;
    let repo = Database::from_pool(pool).listing_repo();

    let url = "https://example.com/jobs/1";
    assert!(!repo.url_exists(url).await.unwrap());

    let first = repo.upsert(new_listing(url)).await.unwrap();
    assert!(repo.url_exists(url).await.unwrap());

    let mut updated = new_listing(url);
    updated.title = "Staff Rust Engineer".into();
    let second = repo.upsert(updated).await.unwrap();

    assert_eq!(second.id, first.id, "same URL updates in place");
    assert_eq!(second.title, "Staff Rust Engineer");
}

#[tokio::test]
async fn match_upsert_keyed_by_listing() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let listings = db.listing_repo();
    let matches = db.match_repo();

    let listing = listings
        .upsert(new_listing("https://example.com/jobs/1"))
        .await
        .unwrap();
    let tracking = Uuid::new_v4();

    let first = matches
        .upsert(NewMatch {
            listing_id: listing.id,
            score: 72,
            breakdown: breakdown(72),
            analysis: MatchAnalysis {
                match_score: 70,
                ..Default::default()
            },
            tracking_id: tracking,
        })
        .await
        .unwrap();

    // A re-run after retry rescores the same listing.
    let second = matches
        .upsert(NewMatch {
            listing_id: listing.id,
            score: 80,
            breakdown: breakdown(80),
            analysis: MatchAnalysis::default(),
            tracking_id: tracking,
        })
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.score, 80);
    assert_eq!(second.breakdown.final_score, 80);
    assert_eq!(matches.count_for_tracking(tracking).await.unwrap(), 1);
    assert_eq!(
        matches.count_for_tracking(Uuid::new_v4()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn record_review_annotates_match() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let listing = db
        .listing_repo()
        .upsert(new_listing("https://example.com/jobs/1"))
        .await
        .unwrap();
    let matches = db.match_repo();

    let saved = matches
        .upsert(NewMatch {
            listing_id: listing.id,
            score: 90,
            breakdown: breakdown(90),
            analysis: MatchAnalysis::default(),
            tracking_id: Uuid::new_v4(),
        })
        .await
        .unwrap();

    let review = MatchAnalysis {
        match_score: 88,
        key_strengths: vec!["deep rust experience".into()],
        ..Default::default()
    };
    matches
        .record_review(saved.id, &review, "strengths: deep rust experience")
        .await
        .unwrap();

    let stored = matches.get(saved.id).await.unwrap().unwrap();
    assert!(stored.reviewed_at.is_some());
    assert_eq!(stored.analysis.match_score, 88);
    assert!(stored.review_notes.unwrap().contains("deep rust"));

    let missing = matches
        .record_review(Uuid::new_v4(), &MatchAnalysis::default(), "")
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(..))));
}
