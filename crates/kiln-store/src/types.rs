use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a training job.
///
/// The job runner owns most transitions; the queue worker only reads
/// `Running` and writes `Error` when it fails to hand a job over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Enqueued and waiting for the worker to promote it.
    Queued,
    /// Currently executing in the runner.
    Running,
    /// Stopped by the user or never started.
    Stopped,
    /// Last start attempt or execution failed; see `info`.
    Error,
    /// Finished successfully.
    Completed,
}

impl JobStatus {
    /// Statuses from which the queue worker may start a job.
    pub fn is_startable(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Stopped | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
            JobStatus::Error => "error",
            JobStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "stopped" => Ok(JobStatus::Stopped),
            "error" => Ok(JobStatus::Error),
            "completed" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque primary key (UUID v4 for jobs created here).
    pub id: String,
    /// Unique human-readable name; also the training folder name.
    pub name: String,
    /// Comma-separated GPU indices.
    pub gpu_ids: String,
    /// Serialized job configuration (JSON).
    pub job_config: String,
    /// RFC 3339 timestamp of creation.
    pub created_at: String,
    /// RFC 3339 timestamp of the last update.
    pub updated_at: String,
    pub status: JobStatus,
    /// Stop requested by the user.
    pub stop: bool,
    /// Training progress counter.
    pub step: i64,
    /// Free-text status or error message.
    pub info: String,
    pub speed_string: String,
}

/// Input for [`crate::JobStore::create_job`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default = "default_gpu_ids")]
    pub gpu_ids: String,
    pub job_config: String,
}

fn default_gpu_ids() -> String {
    "0".to_string()
}

/// Status of a queue row. Only `Waiting` rows are eligible for promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QueueStatus {
    Waiting,
    /// Any status written by another tool; never promoted.
    Other(String),
}

impl QueueStatus {
    pub fn as_str(&self) -> &str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Other(s) => s,
        }
    }
}

impl From<String> for QueueStatus {
    fn from(s: String) -> Self {
        if s == "waiting" {
            QueueStatus::Waiting
        } else {
            QueueStatus::Other(s)
        }
    }
}

impl From<QueueStatus> for String {
    fn from(s: QueueStatus) -> Self {
        s.as_str().to_string()
    }
}

/// A persisted queue row pointing at a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub job_id: String,
    pub status: QueueStatus,
    pub created_at: String,
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision with a `Z` suffix keeps string order equal to
/// chronological order, which the FIFO queue query relies on.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
