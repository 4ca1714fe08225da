//! In-memory [`JobStore`] fake for exercising `queuectl-core`'s scheduling
//! logic without a database.
//!
//! Grounded on the teacher's `seesaw-testing` crate, which plays the same
//! role for the `seesaw` framework: a store fake lets the lifecycle rules
//! (claim atomicity, backoff, DLQ promotion) be property-tested cheaply and
//! deterministically, while the real I/O lives only in `queuectl-store`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queuectl_core::{DlqEntry, Job, JobState, JobStore, NewJob, StoreError};

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<String, Job>,
    leases: BTreeMap<String, DateTime<Utc>>,
    dlq: BTreeMap<String, DlqEntry>,
    config: BTreeMap<String, String>,
}

/// A single-process, mutex-guarded store used only in tests.
///
/// The claim protocol is still implemented as "find candidate, then
/// conditionally flip its state" so tests exercise the same race window a
/// real store would, even though a `Mutex` serializes it here.
pub struct FakeJobStore {
    inner: Mutex<Inner>,
}

impl FakeJobStore {
    pub fn new() -> Self {
        let mut config = BTreeMap::new();
        config.insert("max_retries".to_string(), "3".to_string());
        config.insert("backoff_base".to_string(), "2".to_string());
        config.insert("stop".to_string(), "0".to_string());
        Self {
            inner: Mutex::new(Inner {
                config,
                ..Default::default()
            }),
        }
    }
}

impl Default for FakeJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn insert_job(&self, job: NewJob) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        inner.jobs.insert(
            job.id.clone(),
            Job {
                id: job.id,
                command: job.command,
                state: job.state,
                attempts: job.attempts,
                max_retries: job.max_retries,
                created_at: job.created_at,
                updated_at: job.updated_at,
                next_run_at: job.next_run_at,
                priority: job.priority,
            },
        );
        Ok(())
    }

    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_expires_at: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let candidate_id = {
            let mut candidates: Vec<&Job> = inner
                .jobs
                .values()
                .filter(|j| matches!(j.state, JobState::Pending) && j.next_run_at <= now)
                .collect();
            candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
            candidates.first().map(|j| j.id.clone())
        };
        let Some(id) = candidate_id else {
            return Ok(None);
        };
        match inner.jobs.get_mut(&id) {
            Some(job) if matches!(job.state, JobState::Pending) => {
                job.state = JobState::Processing;
                job.updated_at = now;
                inner.leases.insert(id.clone(), lease_expires_at);
                Ok(Some(id))
            }
            _ => Ok(None),
        }
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().unwrap().jobs.get(id).cloned())
    }

    async fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(id) {
            job.state = JobState::Completed;
            job.updated_at = now;
        }
        inner.leases.remove(id);
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &str,
        attempts: i64,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(id) {
            job.state = JobState::Pending;
            job.attempts = attempts;
            job.next_run_at = next_run_at;
            job.updated_at = now;
        }
        inner.leases.remove(id);
        Ok(())
    }

    async fn move_to_dlq(
        &self,
        id: &str,
        command: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.dlq.insert(
            id.to_string(),
            DlqEntry {
                id: id.to_string(),
                command: command.to_string(),
                reason: reason.to_string(),
                created_at: now,
            },
        );
        inner.jobs.remove(id);
        inner.leases.remove(id);
        Ok(())
    }

    async fn get_dlq(&self, id: &str) -> Result<Option<DlqEntry>, StoreError> {
        Ok(self.inner.lock().unwrap().dlq.get(id).cloned())
    }

    async fn restore_from_dlq(
        &self,
        id: &str,
        command: &str,
        max_retries: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(
            id.to_string(),
            Job {
                id: id.to_string(),
                command: command.to_string(),
                state: JobState::Pending,
                attempts: 0,
                max_retries,
                created_at: now,
                updated_at: now,
                next_run_at: now,
                priority: 0,
            },
        );
        inner.dlq.remove(id);
        Ok(())
    }

    async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| match state {
                None => true,
                Some(s) => s as u8 == j.state as u8,
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(jobs)
    }

    async fn list_dlq(&self) -> Result<Vec<DlqEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut entries: Vec<DlqEntry> = inner.dlq.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn count_by_state(&self) -> Result<BTreeMap<String, i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut counts = BTreeMap::new();
        for job in inner.jobs.values() {
            *counts.entry(job.state.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().config.get(key).cloned())
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn reap_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .leases
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(job) = inner.jobs.get_mut(id) {
                job.state = JobState::Pending;
                job.updated_at = now;
            }
            inner.leases.remove(id);
        }
        Ok(expired.len() as u64)
    }
}
