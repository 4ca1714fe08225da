use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use queuectl_core::{JobState, JobStore, NewJob};
use queuectl_store::SqliteStore;
use tempfile::TempDir;
use tokio::task::JoinSet;

async fn open_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::connect(&dir.path().join("queue.db")).await.unwrap();
    (dir, Arc::new(store))
}

fn new_job(id: &str, priority: i64) -> NewJob {
    let now = Utc::now();
    NewJob {
        id: id.to_string(),
        command: "true".to_string(),
        state: JobState::Pending,
        attempts: 0,
        max_retries: 3,
        created_at: now,
        updated_at: now,
        next_run_at: now,
        priority,
    }
}

#[tokio::test]
async fn config_rows_are_seeded_on_connect() {
    let (_dir, store) = open_store().await;
    assert_eq!(store.config_get("max_retries").await.unwrap(), Some("3".to_string()));
    assert_eq!(store.config_get("backoff_base").await.unwrap(), Some("2".to_string()));
    assert_eq!(store.config_get("stop").await.unwrap(), Some("0".to_string()));
}

#[tokio::test]
async fn duplicate_insert_is_reported_distinctly() {
    let (_dir, store) = open_store().await;
    store.insert_job(new_job("a", 0)).await.unwrap();

    let err = store.insert_job(new_job("a", 0)).await.unwrap_err();
    assert!(matches!(err, queuectl_core::StoreError::Duplicate(id) if id == "a"));
}

#[tokio::test]
async fn claim_one_never_returns_a_row_that_is_not_due_or_not_pending() {
    let (_dir, store) = open_store().await;
    let future = Utc::now() + chrono::Duration::minutes(5);
    let mut job = new_job("future", 0);
    job.next_run_at = future;
    store.insert_job(job).await.unwrap();

    let now = Utc::now();
    let lease = now + chrono::Duration::seconds(20);
    assert!(store.claim_one(now, lease).await.unwrap().is_none());
}

// S6 — concurrent claim exclusivity: 100 due jobs, many concurrent claimers,
// exactly one winner per row and no double claims.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_never_double_claim() {
    const JOBS: usize = 100;
    const WORKERS: usize = 8;

    let (_dir, store) = open_store().await;
    for i in 0..JOBS {
        store.insert_job(new_job(&format!("job-{i}"), (i % 3) as i64)).await.unwrap();
    }

    let mut tasks = JoinSet::new();
    for _ in 0..WORKERS {
        let store = store.clone();
        tasks.spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let now = Utc::now();
                let lease = now + chrono::Duration::seconds(20);
                match store.claim_one(now, lease).await.unwrap() {
                    Some(id) => claimed.push(id),
                    None => break,
                }
            }
            claimed
        });
    }

    let mut all_claimed: Vec<String> = Vec::new();
    while let Some(res) = tasks.join_next().await {
        all_claimed.extend(res.unwrap());
    }

    assert_eq!(all_claimed.len(), JOBS, "every due job should be claimed exactly once");
    let unique: HashSet<&String> = all_claimed.iter().collect();
    assert_eq!(unique.len(), JOBS, "no job should be claimed twice");

    let counts = store.count_by_state().await.unwrap();
    assert_eq!(counts.get("pending").copied().unwrap_or(0), 0);
    assert_eq!(counts.get("processing").copied().unwrap_or(0), JOBS as i64);
}

#[tokio::test]
async fn reap_expired_leases_requeues_processing_rows() {
    let (_dir, store) = open_store().await;
    store.insert_job(new_job("orphan", 0)).await.unwrap();

    let now = Utc::now();
    let already_expired = now - chrono::Duration::seconds(1);
    let claimed = store.claim_one(now, already_expired).await.unwrap();
    assert_eq!(claimed, Some("orphan".to_string()));

    let reaped = store.reap_expired_leases(Utc::now()).await.unwrap();
    assert_eq!(reaped, 1);

    let job = store.get_job("orphan").await.unwrap().unwrap();
    assert_eq!(job.state as u8, JobState::Pending as u8);
}

#[tokio::test]
async fn move_to_dlq_is_atomic_with_job_removal() {
    let (_dir, store) = open_store().await;
    store.insert_job(new_job("c", 0)).await.unwrap();
    let now = Utc::now();
    store.claim_one(now, now + chrono::Duration::seconds(20)).await.unwrap();

    store.move_to_dlq("c", "false", "Exit code 1, retries exhausted", Utc::now()).await.unwrap();

    assert!(store.get_job("c").await.unwrap().is_none());
    let dlq = store.get_dlq("c").await.unwrap().unwrap();
    assert!(dlq.reason.contains("retries exhausted"));
}

#[tokio::test]
async fn retry_from_dlq_restores_pending_job_with_reset_fields() {
    let (_dir, store) = open_store().await;
    store.insert_job(new_job("e", 7)).await.unwrap();
    let now = Utc::now();
    store.claim_one(now, now + chrono::Duration::seconds(20)).await.unwrap();
    store.move_to_dlq("e", "true", "boom", Utc::now()).await.unwrap();

    store.restore_from_dlq("e", "true", 3, Utc::now()).await.unwrap();

    assert!(store.get_dlq("e").await.unwrap().is_none());
    let job = store.get_job("e").await.unwrap().unwrap();
    assert_eq!(job.attempts, 0);
    assert_eq!(job.priority, 0);
    assert_eq!(job.state as u8, JobState::Pending as u8);
}
