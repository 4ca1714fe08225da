use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a row in the `jobs` table.
///
/// `failed` and `dead` are not represented here: a terminally-failed job is
/// removed from this table entirely and surfaces only as a [`DlqEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
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

/// Terminal record for a job that exhausted retries or hit a non-retryable failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub command: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied payload for [`crate::scheduler::Scheduler::enqueue`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnqueueRequest {
    pub id: String,
    pub command: String,
    pub max_retries: Option<i64>,
    pub attempts: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub run_at: Option<String>,
}

/// Aggregate counts returned by `snapshot_status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub stop_flag: bool,
}

/// Filter applied to `list_jobs`.
#[derive(Debug, Clone, Copy)]
pub enum JobFilter {
    Any,
    State(JobState),
}
