use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::outcome::Outcome;

/// Path to the per-job log file: `<data_dir>/logs/job_<id>.log`.
pub fn log_path(data_dir: &Path, job_id: &str) -> PathBuf {
    data_dir.join("logs").join(format!("job_{job_id}.log"))
}

/// Append one execution record to the job's log file.
///
/// Format follows the only available ground truth for this
/// adapter-facing interface (spec.md leaves it as "append a structured
/// execution record keyed by job id"): a header line with id and
/// wall-clock timestamp, the command, the exit code (or a `timeout`/`error`
/// marker), and both output streams, delimited exactly as the original
/// implementation wrote them.
pub async fn append_record(
    data_dir: &Path,
    job_id: &str,
    command: &str,
    executed_at: DateTime<Utc>,
    outcome: &Outcome,
    stdout: &str,
    stderr: &str,
) -> anyhow::Result<()> {
    let path = log_path(data_dir, job_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let exit_marker = match outcome {
        Outcome::Success => "0".to_string(),
        Outcome::NonZeroExit(rc) => rc.to_string(),
        Outcome::Timeout(_) => "timeout".to_string(),
        Outcome::Spawn(_) | Outcome::Other(_) => "error".to_string(),
    };

    let mut record = String::new();
    record.push_str(&format!(
        "=== Job {job_id} executed at {} ===\n",
        executed_at.format("%Y-%m-%d %H:%M:%S")
    ));
    record.push_str(&format!("Command: {command}\n"));
    record.push_str(&format!("Exit Code: {exit_marker}\n"));
    record.push_str("----- STDOUT -----\n");
    record.push_str(stdout);
    record.push_str("\n----- STDERR -----\n");
    record.push_str(stderr);
    record.push_str("\n\n");

    let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    file.write_all(record.as_bytes()).await?;
    Ok(())
}
