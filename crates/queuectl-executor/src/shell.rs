use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::outcome::Outcome;

/// Full capture of one shell invocation: the tagged [`Outcome`] plus
/// whatever stdout/stderr were produced (empty if the process never spawned
/// or was killed by the timeout).
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` through a platform shell under a hard wall-clock timeout.
///
/// Deliberate seam (Design Notes: "do not leak host-language process APIs
/// into the Scheduler") — everything downstream only ever sees an
/// [`Outcome`], never a raw `std::process` type.
pub async fn run_shell(command: &str, timeout: Duration) -> ExecutionResult {
    let mut cmd = shell_command(command);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    // Never kill an in-flight child when the future that awaits it is
    // dropped (spec.md §4.3 Signal Handling: no forced kill on shutdown).
    cmd.kill_on_drop(false);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ExecutionResult {
                outcome: Outcome::Spawn(e.to_string()),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
        Err(e) => {
            return ExecutionResult {
                outcome: Outcome::Other(e.to_string()),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let outcome = match output.status.code() {
                Some(0) => Outcome::Success,
                // 127 is the POSIX shell's own "command not found" exit code
                // (the binary never ran, so this is a spawn failure even
                // though it surfaced through the shell rather than our own
                // process::Command::spawn).
                Some(127) => {
                    let detail = if stderr.trim().is_empty() {
                        "exit code 127".to_string()
                    } else {
                        stderr.trim().to_string()
                    };
                    Outcome::Spawn(detail)
                }
                Some(rc) => Outcome::NonZeroExit(rc),
                None => Outcome::Other("process terminated by signal".to_string()),
            };
            ExecutionResult { outcome, stdout, stderr }
        }
        Ok(Err(e)) => ExecutionResult {
            outcome: Outcome::Other(e.to_string()),
            stdout: String::new(),
            stderr: String::new(),
        },
        Err(_elapsed) => ExecutionResult {
            outcome: Outcome::Timeout(timeout.as_secs()),
            stdout: String::new(),
            stderr: String::new(),
        },
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_exit_code_zero() {
        let result = run_shell("true", Duration::from_secs(5)).await;
        assert!(matches!(result.outcome, Outcome::Success));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_tagged() {
        let result = run_shell("exit 7", Duration::from_secs(5)).await;
        assert!(matches!(result.outcome, Outcome::NonZeroExit(7)));
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let result = run_shell("echo out; echo err 1>&2", Duration::from_secs(5)).await;
        assert!(matches!(result.outcome, Outcome::Success));
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn hard_timeout_is_tagged() {
        let result = run_shell("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(result.outcome, Outcome::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_command_is_tagged_as_spawn_failure() {
        // The shell itself exits 127 when it can't resolve the binary.
        let result = run_shell("__definitely_not_a_real_binary__", Duration::from_secs(5)).await;
        assert!(matches!(result.outcome, Outcome::Spawn(_)));
    }
}
