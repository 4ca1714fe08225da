use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// An explicitly-scoped cancellation token owned by the worker loop.
///
/// Design Notes: "Global mutable flags → explicit state ... no module-level
/// mutable state." The signal handler only ever touches the `Arc<AtomicBool>`
/// it was handed; nothing here is a process-global.
#[derive(Clone)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Spawn a task that sets this token on SIGINT or SIGTERM (the original
    /// installs handlers for both). The in-flight `run_once` call is
    /// allowed to finish; no child process is killed (spec.md §4.3 Signal
    /// Handling).
    pub fn watch_for_interrupt(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sig) => sig,
                    Err(e) => {
                        warn!(error = %e, "failed to install SIGTERM handler; watching SIGINT only");
                        if tokio::signal::ctrl_c().await.is_ok() {
                            warn!("received stop signal; finishing current job then exiting");
                            token.set();
                        }
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                warn!("received stop signal; finishing current job then exiting");
                token.set();
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("received stop signal; finishing current job then exiting");
                    token.set();
                }
            }
        });
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
