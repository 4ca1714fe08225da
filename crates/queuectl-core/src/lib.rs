//! # queuectl-core
//!
//! The persistent job-scheduling engine: job lifecycle, the atomic claim
//! protocol, exponential backoff, and dead-letter promotion.
//!
//! This crate is deliberately storage-agnostic. [`JobStore`] is the seam a
//! concrete backend implements (see `queuectl-store` for the SQLite
//! implementation); [`Scheduler`] is built only from that trait, so its
//! lifecycle rules are exercised in tests without a database.

mod backoff;
mod error;
mod model;
mod run_at;
mod scheduler;
mod store;

pub use error::{QueueError, StoreError};
pub use model::{DlqEntry, EnqueueRequest, Job, JobFilter, JobState, StatusSnapshot};
pub use scheduler::Scheduler;
pub use store::{JobStore, NewJob};

pub use backoff::next_run_at as compute_backoff;
pub use run_at::parse_run_at;
