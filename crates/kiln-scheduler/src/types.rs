use kiln_store::JobStatus;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still in flight; no reads or writes happened.
    Skipped,
    QueueingDisabled,
    /// At least one job is `running`.
    JobRunning { running: usize },
    QueueEmpty,
    /// The queue entry referenced a job that no longer exists.
    OrphanRemoved { queue_id: String, job_id: String },
    /// The job exists but its status does not allow a start.
    StaleRemoved {
        queue_id: String,
        job_id: String,
        status: JobStatus,
    },
    Started { job_id: String },
    /// The runner refused; the job was marked `error` with `info`.
    StartFailed { job_id: String, info: String },
    /// An unexpected error ended the tick early.
    Failed(String),
}

impl TickOutcome {
    /// Whether the tick removed a queue entry.
    pub fn consumed_entry(&self) -> bool {
        matches!(
            self,
            TickOutcome::OrphanRemoved { .. }
                | TickOutcome::StaleRemoved { .. }
                | TickOutcome::Started { .. }
                | TickOutcome::StartFailed { .. }
        )
    }
}
