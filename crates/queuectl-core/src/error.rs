use thiserror::Error;

/// Store-level failure not classified by a more specific error kind.
///
/// `Duplicate` is reported distinctly so `Scheduler::enqueue` can turn a
/// unique-key violation into [`QueueError::DuplicateId`] instead of a bare
/// I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate id: {0}")]
    Duplicate(String),

    #[error("store I/O error: {0}")]
    Io(#[from] anyhow::Error),
}

/// Errors surfaced by [`crate::scheduler::Scheduler`] operations.
///
/// Validation errors (`DuplicateId`, `Validation`, `NotFound`) are reported
/// with the store left unchanged. `Store` errors are propagated upward
/// without mutation; the caller decides whether to retry.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job with id '{0}' already exists")]
    DuplicateId(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<anyhow::Error> for QueueError {
    fn from(err: anyhow::Error) -> Self {
        QueueError::Store(StoreError::Io(err))
    }
}
