use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queuectl_core::{JobStore, QueueError, Scheduler};
use tracing::{error, info, warn};

use crate::joblog::append_record;
use crate::outcome::Outcome;
use crate::shell::run_shell;
use crate::stop::StopToken;

/// Hard wall-clock timeout for a single job attempt (spec.md §4.3 step 3).
pub const JOB_TIMEOUT_SECS: u64 = 10;

/// Idle sleep when the queue has nothing claimable, to avoid busy-spinning.
const IDLE_SLEEP: Duration = Duration::from_millis(500);

/// Claim one job and supervise its execution to completion.
///
/// Implements spec.md §4.3's `run_once` contract exactly: claim, run under
/// timeout, log, then dispatch the outcome to completion/retry/DLQ. Returns
/// `Ok(())` even when the *job* fails — only a scheduler-level error
/// propagates (Design Notes: job failures are domain outcomes, never
/// surfaced as errors).
pub async fn run_once<S: JobStore>(scheduler: &Scheduler<S>, data_dir: &Path) -> Result<(), QueueError> {
    let job = match scheduler.claim_next().await? {
        Some(job) => job,
        None => {
            tokio::time::sleep(IDLE_SLEEP).await;
            return Ok(());
        }
    };

    let attempts = job.attempts;
    let max_retries = job.max_retries;

    info!(
        job_id = %job.id,
        attempt = attempts,
        max_retries,
        command = %job.command,
        "processing job"
    );

    let result = run_shell(&job.command, Duration::from_secs(JOB_TIMEOUT_SECS)).await;
    let executed_at = Utc::now();

    if let Err(e) = append_record(
        data_dir,
        &job.id,
        &job.command,
        executed_at,
        &result.outcome,
        &result.stdout,
        &result.stderr,
    )
    .await
    {
        warn!(job_id = %job.id, error = %e, "failed to write job log");
    }

    match result.outcome {
        Outcome::Success => {
            scheduler.mark_completed(&job.id).await?;
            info!(job_id = %job.id, "completed");
        }
        outcome => {
            let next_attempts = attempts + 1;
            if next_attempts > max_retries {
                let reason = outcome.dlq_reason(JOB_TIMEOUT_SECS);
                scheduler.move_to_dlq(&job.id, &job.command, &reason).await?;
                warn!(job_id = %job.id, reason = %reason, "moved to DLQ");
            } else {
                scheduler.mark_retry(&job.id, next_attempts).await?;
                warn!(job_id = %job.id, attempt = next_attempts, "failed; scheduled retry with backoff");
            }
        }
    }

    Ok(())
}

/// Repeatedly call `run_once` until the stop predicate — the disjunction of
/// the in-process `StopToken` and the persistent `stop` config key — is
/// true (spec.md §4.3 `run_worker_loop`). Orphaned claims from a crashed
/// sibling are reaped once per cycle before attempting a new claim
/// (SPEC_FULL.md §9).
pub async fn run_worker_loop<S: JobStore>(scheduler: Arc<Scheduler<S>>, data_dir: PathBuf, stop: StopToken) {
    info!(pid = std::process::id(), "worker started");

    loop {
        if stop.is_set() {
            break;
        }
        match scheduler.should_stop().await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "failed to read stop flag; continuing");
            }
        }

        if let Err(e) = scheduler.reap_expired().await {
            error!(error = %e, "failed to reap expired leases");
        }

        if let Err(e) = run_once(&scheduler, &data_dir).await {
            error!(error = %e, "worker cycle aborted");
        }
    }

    warn!(pid = std::process::id(), "worker exiting");
}
