/// The tagged result of a single command execution attempt.
///
/// Replaces a cascade of typed exception handlers (Design Notes) with one
/// enum; the retry/DLQ decision in [`crate::executor::run_once`] is a pure
/// function of this tag plus `(attempts, max_retries)`.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    NonZeroExit(i32),
    Timeout(u64),
    Spawn(String),
    Other(String),
}

impl Outcome {
    /// The DLQ diagnostic string for a failing (non-`Success`) outcome,
    /// matching spec.md §4.3 step 5 wording exactly.
    pub fn dlq_reason(&self, timeout_secs: u64) -> String {
        match self {
            Outcome::Success => unreachable!("Success never reaches the DLQ"),
            Outcome::NonZeroExit(rc) => format!("Exit code {rc}, retries exhausted"),
            Outcome::Timeout(_) => format!("Timeout after {timeout_secs}s"),
            Outcome::Spawn(detail) => format!("Command not found: {detail}"),
            Outcome::Other(detail) => format!("Unhandled error: {detail}"),
        }
    }
}
