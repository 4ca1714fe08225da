use std::sync::Arc;

use queuectl_core::{EnqueueRequest, JobFilter, JobState, Scheduler};
use queuectl_executor::run_once;
use queuectl_testing::FakeJobStore;
use tempfile::TempDir;

fn scheduler() -> Scheduler<FakeJobStore> {
    Scheduler::new(Arc::new(FakeJobStore::new()))
}

// S1 — happy path: a "true" command completes on the first attempt.
#[tokio::test]
async fn happy_path_marks_completed_and_logs() {
    let s = scheduler();
    let dir = TempDir::new().unwrap();
    s.enqueue(EnqueueRequest {
        id: "a".to_string(),
        command: "true".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    run_once(&s, dir.path()).await.unwrap();

    let jobs = s.list_jobs(JobFilter::State(JobState::Completed)).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 0);

    let log = tokio::fs::read_to_string(queuectl_executor::log_path(dir.path(), "a"))
        .await
        .unwrap();
    assert!(log.contains("Exit Code: 0"));
}

// S3 — a failing command with max_retries=1 is promoted to the DLQ after
// the second failed attempt.
#[tokio::test]
async fn dlq_promotion_after_retries_exhausted() {
    let s = scheduler();
    let dir = TempDir::new().unwrap();
    s.config_set("backoff_base", "1").await.unwrap();
    s.enqueue(EnqueueRequest {
        id: "c".to_string(),
        command: "false".to_string(),
        max_retries: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();

    run_once(&s, dir.path()).await.unwrap(); // attempt 1 -> retry
    let jobs = s.list_jobs(JobFilter::Any).await.unwrap();
    assert_eq!(jobs[0].attempts, 1);
    assert_eq!(jobs[0].state as u8, JobState::Pending as u8);

    // backoff_base=1 means next_run_at = now + 1s, which may not yet be due;
    // simulate time passing by resetting run_at through a direct retry.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    run_once(&s, dir.path()).await.unwrap(); // attempt 2 -> DLQ
    assert!(s.list_jobs(JobFilter::Any).await.unwrap().is_empty());
    let dlq = s.list_dlq().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert!(dlq[0].reason.contains("Exit code"));
    assert!(dlq[0].reason.contains("retries exhausted"));
}

// An idle queue returns without error after the idle sleep.
#[tokio::test]
async fn idle_queue_returns_ok() {
    let s = scheduler();
    let dir = TempDir::new().unwrap();
    run_once(&s, dir.path()).await.unwrap();
}
