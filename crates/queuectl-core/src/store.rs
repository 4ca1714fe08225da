use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{DlqEntry, Job, JobState};

/// A row ready to be inserted by `enqueue`, already validated and defaulted.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: i64,
    pub max_retries: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
    pub priority: i64,
}

/// The durable storage primitives the [`crate::scheduler::Scheduler`] is
/// built from.
///
/// Implementors provide transactional single-row operations; `Scheduler`
/// owns the lifecycle rules (validation, backoff, DLQ promotion policy) and
/// never talks to storage except through this trait. This mirrors the
/// teacher's `JobStore` trait (one primitive method per durable action, no
/// business logic inside the store implementation).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job row. Must fail with [`StoreError::Duplicate`] if
    /// `id` already exists in the jobs table.
    async fn insert_job(&self, job: NewJob) -> Result<(), StoreError>;

    /// Atomically select the id of the highest-priority, oldest-by-
    /// `created_at` job that is `pending` and due, transition it to
    /// `processing` (predicated on `state = 'pending'`), and stamp
    /// `updated_at` and a lease expiry — as a single atomic operation, so a
    /// concurrent caller racing for the same row observes zero rows
    /// affected rather than a write conflict.
    ///
    /// Returns `None` if no job is due, or if the race was lost (another
    /// caller claimed the same row first) — spec.md §4.2 steps 1–4.
    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError>;

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError>;

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    async fn mark_retry(
        &self,
        id: &str,
        attempts: i64,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Atomically write the DLQ row and remove the job row.
    async fn move_to_dlq(
        &self,
        id: &str,
        command: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_dlq(&self, id: &str) -> Result<Option<DlqEntry>, StoreError>;

    /// Atomically re-insert `id` into the jobs table as `pending` and
    /// remove the DLQ row.
    async fn restore_from_dlq(
        &self,
        id: &str,
        command: &str,
        max_retries: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>, StoreError>;

    async fn list_dlq(&self) -> Result<Vec<DlqEntry>, StoreError>;

    async fn count_by_state(&self) -> Result<BTreeMap<String, i64>, StoreError>;

    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Requeue any `processing` row whose lease has expired back to
    /// `pending`, leaving `attempts` untouched. Returns the number of rows
    /// reaped. Crash-recovery mechanism for orphaned claims (see
    /// SPEC_FULL.md §9).
    async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
