//! `kiln-scheduler`: the queue worker that promotes queued training jobs.
//!
//! # Overview
//!
//! [`engine::QueueWorker`] runs one decision cycle ("tick") every few
//! seconds. A tick starts the oldest waiting job when queueing is enabled
//! and nothing else is running, by calling the [`runner::JobRunner`]. Ticks
//! never overlap: a tick that fires while another is in flight is skipped.
//!
//! # Tick outcomes
//!
//! | Outcome            | Meaning                                             |
//! |--------------------|-----------------------------------------------------|
//! | `Skipped`          | Previous tick still in flight; nothing touched      |
//! | `QueueingDisabled` | `JOB_QUEUEING` is not `"true"`                      |
//! | `JobRunning`       | A job is already running                            |
//! | `QueueEmpty`       | No waiting queue entry                              |
//! | `OrphanRemoved`    | Queue entry pointed at a deleted job; entry removed |
//! | `StaleRemoved`     | Job not startable; entry removed                    |
//! | `Started`          | Entry removed and the runner accepted the job       |
//! | `StartFailed`      | Entry removed; runner refused; job marked `error`   |
//! | `Failed`           | Unexpected error, logged and dropped                |

pub mod engine;
pub mod error;
pub mod runner;
pub mod types;

pub use engine::{QueueWorker, WorkerHandle};
pub use error::{Result, RunnerError, SchedulerError};
pub use runner::{HttpJobRunner, JobRunner};
pub use types::TickOutcome;
