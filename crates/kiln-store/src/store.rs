use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Job, JobStatus, NewJob, QueueEntry};

/// Job and queue persistence as consumed by the queue worker and the HTTP
/// layer.
///
/// No transactional guarantee spans the two tables; every call observes
/// committed state at the moment it runs.
pub trait JobStore: Send + Sync {
    /// All jobs currently in `running`.
    fn find_running_jobs(&self) -> Result<Vec<Job>>;

    /// Oldest `waiting` queue row by `created_at`, ties broken by insertion
    /// order.
    fn find_oldest_waiting_queue_entry(&self) -> Result<Option<QueueEntry>>;

    fn find_job(&self, id: &str) -> Result<Option<Job>>;

    fn find_job_by_name(&self, name: &str) -> Result<Option<Job>>;

    /// All jobs, oldest first.
    fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Delete one queue row. Deleting a row that is already gone is `Ok`.
    fn delete_queue_entry(&self, id: &str) -> Result<()>;

    /// Set status and info on a job.
    ///
    /// Returns `false` when the job no longer exists; that is not an error.
    fn update_job_status(&self, id: &str, status: JobStatus, info: &str) -> Result<bool>;

    fn create_job(&self, new: NewJob) -> Result<Job>;

    /// Insert a fully-formed job, keeping its id. Used by the import path.
    fn insert_job(&self, job: &Job) -> Result<()>;

    /// Delete a job row. Returns `false` when it was already gone.
    fn delete_job(&self, id: &str) -> Result<bool>;

    /// Append a `waiting` queue row for `job_id` stamped with the current time.
    fn enqueue(&self, job_id: &str) -> Result<QueueEntry> {
        self.enqueue_at(job_id, Utc::now())
    }

    fn enqueue_at(&self, job_id: &str, created_at: DateTime<Utc>) -> Result<QueueEntry>;

    /// Remove every queue row referencing `job_id`; returns how many went.
    fn delete_queue_entries_for_job(&self, job_id: &str) -> Result<usize>;
}

/// Flat key/value settings persistence.
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, key: &str) -> Result<Option<String>>;

    fn list_settings(&self) -> Result<Vec<(String, String)>>;

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()>;
}
