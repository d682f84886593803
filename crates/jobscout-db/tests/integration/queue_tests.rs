use chrono::Utc;
use sqlx::PgPool;

use jobscout_core::error::{AppError, ErrorCategory};
use jobscout_core::item::{ItemStatus, NewQueueItem, Stage};
use jobscout_core::payload::{RawPosting, StagePayload};
use jobscout_core::queue::{CompletionAction, ProcessOutcome, QueueManager, QueueStore};
use jobscout_db::QueueRepository;

use crate::common::setup_test_db;

fn manager(pool: PgPool) -> QueueManager<QueueRepository> {
    QueueManager::with_defaults(QueueRepository::new(pool))
}

fn job_item(url: &str) -> NewQueueItem {
    NewQueueItem::job(
        url.to_string(),
        RawPosting {
            title: "Engineer".into(),
            company: "Acme".into(),
            url: url.to_string(),
            description: "Build things".into(),
            ..Default::default()
        },
        None,
    )
}

/// Force every backoff deadline to be due.
async fn make_all_due(pool: &PgPool) {
    sqlx::query("UPDATE queue_items SET next_retry_at = NOW() - INTERVAL '1 minute'")
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn enqueue_persists_all_fields() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    let item = mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();

    let stored = mgr.store().get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Pending);
    assert_eq!(stored.stage, Stage::Scrape);
    assert_eq!(stored.dedupe_key, "job|https://example.com/jobs/1");
    assert_eq!(stored.spawn_depth, 0);
    assert!(stored.ancestry.is_empty());
    assert_eq!(stored.tracking_id, item.tracking_id);
    assert!(matches!(stored.payload, StagePayload::JobPosting { .. }));
}

#[tokio::test]
async fn partial_index_rejects_active_duplicates() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();

    // Surface variants of the same URL normalize to the same dedupe key.
    let err = mgr
        .enqueue(job_item("https://EXAMPLE.com/jobs/1/?utm_source=feed"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Duplicate(_)));

    // Once terminal, the key is free again.
    let claimed = mgr.claim(1).await.unwrap().remove(0);
    mgr.complete(&claimed, Ok(ProcessOutcome::Skipped("test".into())))
        .await
        .unwrap();
    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();
}

#[tokio::test]
async fn concurrent_claims_never_share_an_item() {
    let (pool, _container) = setup_test_db().await;
    let mgr_a = manager(pool.clone());
    let mgr_b = manager(pool);

    for i in 0..4 {
        mgr_a
            .enqueue(job_item(&format!("https://example.com/jobs/{i}")))
            .await
            .unwrap();
    }

    let (batch_a, batch_b) = tokio::join!(mgr_a.claim(4), mgr_b.claim(4));
    let batch_a = batch_a.unwrap();
    let batch_b = batch_b.unwrap();

    assert_eq!(batch_a.len() + batch_b.len(), 4);
    for a in &batch_a {
        assert!(batch_b.iter().all(|b| b.id != a.id));
    }
}

#[tokio::test]
async fn claim_is_oldest_first_and_exhaustive() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    let first = mgr.enqueue(job_item("https://example.com/a")).await.unwrap();
    let second = mgr.enqueue(job_item("https://example.com/b")).await.unwrap();

    let batch = mgr.claim(1).await.unwrap();
    assert_eq!(batch[0].id, first.id);
    assert_eq!(batch[0].status, ItemStatus::Processing);
    assert!(batch[0].started_at.is_some());

    let batch = mgr.claim(5).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, second.id);

    assert!(mgr.claim(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn advance_moves_stage_and_replaces_payload() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();
    let item = mgr.claim(1).await.unwrap().remove(0);

    let action = mgr
        .complete(&item, Ok(ProcessOutcome::Advance(item.payload.clone())))
        .await
        .unwrap();
    assert_eq!(action, CompletionAction::Advanced(Stage::Filter));

    let stored = mgr.store().get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Filter);
    assert_eq!(stored.status, ItemStatus::Pending);
}

#[tokio::test]
async fn transient_failure_retries_with_backoff_then_fails() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool.clone());

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();

    let item = mgr.claim(1).await.unwrap().remove(0);
    mgr.complete(&item, Err(AppError::Timeout(30))).await.unwrap();

    // Back to pending, gated behind the backoff deadline.
    let stored = mgr.store().get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.next_retry_at.unwrap() > Utc::now());
    assert!(mgr.claim(1).await.unwrap().is_empty());

    make_all_due(&pool).await;
    for _ in 0..2 {
        let item = mgr.claim(1).await.unwrap().remove(0);
        mgr.complete(&item, Err(AppError::Timeout(30))).await.unwrap();
        make_all_due(&pool).await;
    }

    let item = mgr.claim(1).await.unwrap().remove(0);
    let action = mgr.complete(&item, Err(AppError::Timeout(30))).await.unwrap();
    assert_eq!(action, CompletionAction::Failed(ErrorCategory::Transient));

    let stored = mgr.store().get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Failed);
    assert_eq!(stored.last_error_category, Some(ErrorCategory::Transient));
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn permanent_failure_fails_on_first_occurrence() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();
    let item = mgr.claim(1).await.unwrap().remove(0);

    let action = mgr
        .complete(&item, Err(AppError::Blocked("captcha wall".into())))
        .await
        .unwrap();
    assert_eq!(action, CompletionAction::Failed(ErrorCategory::Permanent));

    let stored = mgr.store().get(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Failed);
    assert!(stored.last_error.unwrap().contains("captcha wall"));
}

#[tokio::test]
async fn spawn_lineage_round_trips_through_postgres() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    let root = mgr.enqueue(NewQueueItem::scrape(1, 1, None)).await.unwrap();
    let child = mgr
        .spawn(&root, job_item("https://example.com/jobs/1"))
        .await
        .unwrap()
        .unwrap();

    let stored = mgr.store().get(child.id).await.unwrap().unwrap();
    assert_eq!(stored.tracking_id, root.tracking_id);
    assert_eq!(stored.spawn_depth, 1);
    assert_eq!(stored.ancestry, vec![root.id]);

    // A sibling spawn of the same posting dedupes.
    let dup = mgr
        .spawn(&root, job_item("https://example.com/jobs/1"))
        .await
        .unwrap();
    assert!(dup.is_none());
}

#[tokio::test]
async fn release_returns_item_to_pending_without_retry() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();
    let item = mgr.claim(1).await.unwrap().remove(0);
    mgr.release(&item).await.unwrap();

    let again = mgr.claim(1).await.unwrap().remove(0);
    assert_eq!(again.id, item.id);
    assert_eq!(again.retry_count, 0);
}

#[tokio::test]
async fn url_in_queue_sees_active_jobs_only() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/jobs/1")).await.unwrap();
    assert!(mgr
        .store()
        .url_in_queue("https://example.com/jobs/1")
        .await
        .unwrap());
    assert!(!mgr
        .store()
        .url_in_queue("https://example.com/jobs/2")
        .await
        .unwrap());

    let item = mgr.claim(1).await.unwrap().remove(0);
    mgr.complete(&item, Ok(ProcessOutcome::Complete(None))).await.unwrap();
    assert!(!mgr
        .store()
        .url_in_queue("https://example.com/jobs/1")
        .await
        .unwrap());
}

#[tokio::test]
async fn counts_group_by_status() {
    let (pool, _container) = setup_test_db().await;
    let mgr = manager(pool);

    mgr.enqueue(job_item("https://example.com/a")).await.unwrap();
    mgr.enqueue(job_item("https://example.com/b")).await.unwrap();
    mgr.enqueue(job_item("https://example.com/c")).await.unwrap();

    let item = mgr.claim(1).await.unwrap().remove(0);
    mgr.complete(&item, Ok(ProcessOutcome::Filtered("too old".into())))
        .await
        .unwrap();
    let item = mgr.claim(1).await.unwrap().remove(0);
    mgr.complete(&item, Ok(ProcessOutcome::Complete(None))).await.unwrap();

    let stats = mgr.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.total(), 3);
}
