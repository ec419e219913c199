//! `kiln-store`: SQLite persistence for training jobs, the job queue and
//! the settings key/value table.
//!
//! Consumers depend on the [`JobStore`] and [`SettingsStore`] traits so the
//! queue worker and settings service can be handed any backend; the only
//! shipped implementation is [`SqliteStore`].
//!
//! The `jobs` and `queue` tables deliberately carry no foreign key: a queue
//! row can outlive its job, and callers are expected to treat that as a
//! cleanup case rather than an error.

pub mod db;
pub mod error;
pub mod import;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use store::{JobStore, SettingsStore};
pub use types::{Job, JobStatus, NewJob, QueueEntry, QueueStatus};
