use std::process::Child;

use tracing::{error, info};

/// Spawns `N` independent OS-level processes and aggregates their shutdown.
///
/// spec.md §4.4 is explicit that executors are processes, not
/// shared-memory threads, so that a crashing executor cannot affect its
/// siblings — the same isolation property the original implementation got
/// from `multiprocessing.Process`. We get it by re-executing the current
/// binary with a hidden worker-loop entry point, the literal Rust analogue
/// of `Process(target=run_worker_loop)` + `p.join()`.
pub struct WorkerPool {
    children: Vec<Child>,
}

impl WorkerPool {
    /// Spawn `count` worker processes. `exe` is the current binary's path
    /// (`std::env::current_exe()`); `worker_args` are the arguments that
    /// make that binary re-enter its hidden worker-loop mode (e.g.
    /// `["__worker-loop", "--data-dir", ...]`).
    pub fn start(count: usize, exe: &std::path::Path, worker_args: &[String]) -> anyhow::Result<Self> {
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            let child = std::process::Command::new(exe).args(worker_args).spawn()?;
            children.push(child);
        }
        info!(count, "worker pool started");
        Ok(Self { children })
    }

    /// Block until every worker process has exited, matching
    /// `multiprocessing`'s `for p in procs: p.join()`.
    pub fn join(mut self) -> anyhow::Result<()> {
        for child in &mut self.children {
            let pid = child.id();
            match child.wait() {
                Ok(status) => info!(pid, %status, "worker process exited"),
                Err(e) => error!(pid, error = %e, "failed waiting on worker process"),
            }
        }
        Ok(())
    }
}
