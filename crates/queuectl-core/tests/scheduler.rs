use std::sync::Arc;

use chrono::Utc;
use queuectl_core::{EnqueueRequest, JobFilter, JobState, Scheduler};
use queuectl_testing::FakeJobStore;

fn scheduler() -> Scheduler<FakeJobStore> {
    Scheduler::new(Arc::new(FakeJobStore::new()))
}

fn enqueue_req(id: &str) -> EnqueueRequest {
    EnqueueRequest {
        id: id.to_string(),
        command: "true".to_string(),
        ..Default::default()
    }
}

// S1 — happy path: enqueue, claim, complete.
#[tokio::test]
async fn happy_path_completes() {
    let s = scheduler();
    s.enqueue(enqueue_req("a")).await.unwrap();

    let job = s.claim_next().await.unwrap().expect("job should be claimable");
    assert_eq!(job.id, "a");
    assert_eq!(job.attempts, 0);

    s.mark_completed("a").await.unwrap();

    let jobs = s.list_jobs(JobFilter::State(JobState::Completed)).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "a");
}

// Enqueueing a duplicate id fails without mutating state.
#[tokio::test]
async fn duplicate_id_is_rejected() {
    let s = scheduler();
    s.enqueue(enqueue_req("dup")).await.unwrap();

    let err = s.enqueue(enqueue_req("dup")).await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueueError::DuplicateId(id) if id == "dup"));

    let all = s.list_jobs(JobFilter::Any).await.unwrap();
    assert_eq!(all.len(), 1);
}

// S3 — DLQ promotion once attempts exceed max_retries.
#[tokio::test]
async fn exhausted_retries_promote_to_dlq() {
    let s = scheduler();
    s.enqueue(EnqueueRequest {
        id: "c".to_string(),
        command: "false".to_string(),
        max_retries: Some(1),
        ..Default::default()
    })
    .await
    .unwrap();

    let job = s.claim_next().await.unwrap().unwrap();
    assert_eq!(job.max_retries, 1);

    // First failure: attempts becomes 1, still <= max_retries, so retry.
    s.mark_retry("c", 1).await.unwrap();
    let jobs = s.list_jobs(JobFilter::Any).await.unwrap();
    assert_eq!(jobs[0].state as u8, JobState::Pending as u8);
    assert_eq!(jobs[0].attempts, 1);

    // Second failure: attempts would become 2 > max_retries(1) -> DLQ.
    s.move_to_dlq("c", "false", "Exit code 1, retries exhausted")
        .await
        .unwrap();

    assert!(s.list_jobs(JobFilter::Any).await.unwrap().is_empty());
    let dlq = s.list_dlq().await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert!(dlq[0].reason.contains("Exit code"));
    assert!(dlq[0].reason.contains("retries exhausted"));
}

// S4 — delayed visibility: a job scheduled for the future is not claimable yet.
#[tokio::test]
async fn delayed_job_is_not_claimable_before_due() {
    let s = scheduler();
    s.enqueue(EnqueueRequest {
        id: "d".to_string(),
        command: "true".to_string(),
        run_at: Some("in 1".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    assert!(s.claim_next().await.unwrap().is_none());
}

// S5 — priority precedence: higher priority claimed first.
#[tokio::test]
async fn higher_priority_claimed_first() {
    let s = scheduler();
    s.enqueue(EnqueueRequest {
        id: "lo".to_string(),
        command: "true".to_string(),
        priority: Some(0),
        ..Default::default()
    })
    .await
    .unwrap();
    // Ensure distinct created_at ordering even at second precision.
    s.enqueue(EnqueueRequest {
        id: "hi".to_string(),
        command: "true".to_string(),
        priority: Some(5),
        created_at: Some(Utc::now() + chrono::Duration::milliseconds(1)),
        ..Default::default()
    })
    .await
    .unwrap();

    let first = s.claim_next().await.unwrap().unwrap();
    assert_eq!(first.id, "hi");
    let second = s.claim_next().await.unwrap().unwrap();
    assert_eq!(second.id, "lo");
}

// S7 — DLQ retry restores a job with attempts and priority reset.
#[tokio::test]
async fn retry_from_dlq_resets_job() {
    let s = scheduler();
    s.enqueue(enqueue_req("e")).await.unwrap();
    let job = s.claim_next().await.unwrap().unwrap();
    s.move_to_dlq(&job.id, &job.command, "boom").await.unwrap();

    assert!(s.list_dlq().await.unwrap().iter().any(|d| d.id == "e"));

    s.retry_from_dlq("e").await.unwrap();

    assert!(s.list_dlq().await.unwrap().is_empty());
    let jobs = s.list_jobs(JobFilter::Any).await.unwrap();
    let restored = jobs.iter().find(|j| j.id == "e").unwrap();
    assert_eq!(restored.attempts, 0);
    assert_eq!(restored.priority, 0);
    assert_eq!(restored.state as u8, JobState::Pending as u8);
}

// Retrying an absent DLQ id fails with NotFound.
#[tokio::test]
async fn retry_from_dlq_missing_id_not_found() {
    let s = scheduler();
    let err = s.retry_from_dlq("ghost").await.unwrap_err();
    assert!(matches!(err, queuectl_core::QueueError::NotFound(_)));
}

// Universal property: attempts never exceeds max_retries on a pending job.
#[tokio::test]
async fn attempts_never_exceeds_max_retries_while_pending() {
    let s = scheduler();
    s.enqueue(EnqueueRequest {
        id: "p".to_string(),
        command: "false".to_string(),
        max_retries: Some(3),
        ..Default::default()
    })
    .await
    .unwrap();

    for attempt in 1..=3 {
        let job = s.claim_next().await.unwrap().unwrap();
        assert_eq!(job.attempts, attempt - 1);
        s.mark_retry(&job.id, attempt).await.unwrap();
        let jobs = s.list_jobs(JobFilter::Any).await.unwrap();
        assert!(jobs[0].attempts <= jobs[0].max_retries);
    }
}

// Orphaned claim reaping: a job whose lease expired without completion is
// returned to `pending` so it can be reclaimed.
#[tokio::test]
async fn reap_expired_leases_requeues_orphaned_claims() {
    let s = scheduler();
    s.enqueue(enqueue_req("orphan")).await.unwrap();
    s.config_set("lease_seconds", "0").await.unwrap();

    let claimed = s.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, "orphan");

    // Simulate the worker crashing: nothing marks completion or retry.
    // The lease (0s) has already elapsed.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let reaped = s.reap_expired().await.unwrap();
    assert_eq!(reaped, 1);

    let job = s.claim_next().await.unwrap().expect("orphan should be reclaimable");
    assert_eq!(job.id, "orphan");
}
