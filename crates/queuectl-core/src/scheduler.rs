use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::backoff;
use crate::error::{QueueError, StoreError};
use crate::model::{DlqEntry, EnqueueRequest, Job, JobFilter, JobState, StatusSnapshot};
use crate::run_at;
use crate::store::{JobStore, NewJob};

const DEFAULT_MAX_RETRIES: i64 = 3;
const DEFAULT_BACKOFF_BASE: i64 = 2;
const DEFAULT_LEASE_SECONDS: i64 = 20;

/// Stateless set of operations over a [`JobStore`].
///
/// `Scheduler` owns every lifecycle invariant in SPEC_FULL.md §3–§4.2:
/// uniqueness at enqueue, claim atomicity, the backoff formula, and the DLQ
/// promotion pair. It never reaches into storage except through the trait,
/// so the same logic runs unchanged against SQLite or an in-memory fake.
#[derive(Clone)]
pub struct Scheduler<S: JobStore> {
    store: Arc<S>,
}

impl<S: JobStore> Scheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn config_i64(&self, key: &str, default: i64) -> Result<i64, QueueError> {
        match self.store.config_get(key).await? {
            Some(v) => v
                .parse()
                .map_err(|_| QueueError::Validation(format!("config '{key}' is not an integer: {v}"))),
            None => Ok(default),
        }
    }

    /// Insert a new job in state `pending`. Fails with
    /// [`QueueError::DuplicateId`] if `id` exists.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<(), QueueError> {
        if req.id.trim().is_empty() {
            return Err(QueueError::Validation("missing field: id".to_string()));
        }
        if req.command.trim().is_empty() {
            return Err(QueueError::Validation("missing field: command".to_string()));
        }

        let now = Utc::now().trunc_subsecs(0);
        let created_at = req.created_at.unwrap_or(now);
        let max_retries = match req.max_retries {
            Some(v) => v,
            None => self.config_i64("max_retries", DEFAULT_MAX_RETRIES).await?,
        };
        let next_run_at = match req.run_at {
            Some(raw) => run_at::parse_run_at(&raw, now)?,
            None => now,
        };

        let job = NewJob {
            id: req.id.clone(),
            command: req.command,
            state: JobState::Pending,
            attempts: req.attempts.unwrap_or(0),
            max_retries,
            created_at,
            updated_at: now,
            next_run_at,
            priority: req.priority.unwrap_or(0),
        };

        match self.store.insert_job(job).await {
            Ok(()) => {
                debug!(job_id = %req.id, "enqueued job");
                Ok(())
            }
            Err(StoreError::Duplicate(id)) => Err(QueueError::DuplicateId(id)),
            Err(e) => Err(QueueError::Store(e)),
        }
    }

    /// Claim the next due job, or `None` if the queue has nothing ready.
    ///
    /// At-most-one successful claim per row across any number of concurrent
    /// callers is guaranteed by the store's conditional update; a lost race
    /// here returns `None` rather than retrying, matching spec.md §4.2 step 4.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let now = Utc::now().trunc_subsecs(0);
        let lease_seconds = self
            .config_i64("lease_seconds", DEFAULT_LEASE_SECONDS)
            .await?;
        let lease_expires_at = now + chrono::Duration::seconds(lease_seconds);

        let Some(candidate_id) = self.store.claim_one(now, lease_expires_at).await? else {
            return Ok(None);
        };

        let job = self
            .store
            .get_job(&candidate_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(candidate_id.clone()))?;

        debug!(job_id = %job.id, "claimed job");
        Ok(Some(job))
    }

    pub async fn mark_completed(&self, id: &str) -> Result<(), QueueError> {
        let now = Utc::now().trunc_subsecs(0);
        self.store.mark_completed(id, now).await?;
        Ok(())
    }

    /// Schedule a retry with exponential backoff. Caller is responsible for
    /// having already decided (via `max_retries`) that the job should retry
    /// rather than be promoted to the DLQ.
    pub async fn mark_retry(&self, id: &str, attempts: i64) -> Result<(), QueueError> {
        let now = Utc::now().trunc_subsecs(0);
        let base = self.config_i64("backoff_base", DEFAULT_BACKOFF_BASE).await?;
        let next_run_at = backoff::next_run_at(base, attempts, now);
        self.store.mark_retry(id, attempts, next_run_at, now).await?;
        Ok(())
    }

    pub async fn move_to_dlq(&self, id: &str, command: &str, reason: &str) -> Result<(), QueueError> {
        let now = Utc::now().trunc_subsecs(0);
        self.store.move_to_dlq(id, command, reason, now).await?;
        warn!(job_id = %id, reason, "moved job to dead-letter queue");
        Ok(())
    }

    /// Restore a DLQ entry to the jobs table as `pending`, `attempts=0`,
    /// `priority=0`. Fails with [`QueueError::NotFound`] if absent.
    pub async fn retry_from_dlq(&self, id: &str) -> Result<(), QueueError> {
        let entry = self
            .store
            .get_dlq(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let now = Utc::now().trunc_subsecs(0);
        let max_retries = self.config_i64("max_retries", DEFAULT_MAX_RETRIES).await?;
        self.store
            .restore_from_dlq(id, &entry.command, max_retries, now)
            .await?;
        info!(job_id = %id, "restored job from DLQ");
        Ok(())
    }

    pub async fn snapshot_status(&self) -> Result<StatusSnapshot, QueueError> {
        let counts = self.store.count_by_state().await?;
        let stop_flag = self.store.config_get("stop").await?.as_deref() == Some("1");
        Ok(StatusSnapshot {
            pending: *counts.get("pending").unwrap_or(&0),
            processing: *counts.get("processing").unwrap_or(&0),
            completed: *counts.get("completed").unwrap_or(&0),
            stop_flag,
        })
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        let state = match filter {
            JobFilter::Any => None,
            JobFilter::State(s) => Some(s),
        };
        Ok(self.store.list_jobs(state).await?)
    }

    pub async fn list_dlq(&self) -> Result<Vec<DlqEntry>, QueueError> {
        Ok(self.store.list_dlq().await?)
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.store.config_get(key).await?)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.store.config_set(key, value).await?;
        Ok(())
    }

    pub async fn stop_pool(&self) -> Result<(), QueueError> {
        self.config_set("stop", "1").await
    }

    pub async fn should_stop(&self) -> Result<bool, QueueError> {
        Ok(self.config_get("stop").await?.as_deref() == Some("1"))
    }

    /// Requeue jobs whose claim lease expired without a completion, retry,
    /// or DLQ decision being recorded — i.e. their claiming worker crashed.
    pub async fn reap_expired(&self) -> Result<u64, QueueError> {
        let now: DateTime<Utc> = Utc::now().trunc_subsecs(0);
        let reaped = self.store.reap_expired_leases(now).await?;
        if reaped > 0 {
            warn!(count = reaped, "reaped jobs with expired claim leases");
        }
        Ok(reaped)
    }
}
