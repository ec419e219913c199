use thiserror::Error;

/// Errors that abort a tick. Caught at the tick boundary, never propagated
/// past [`crate::QueueWorker::tick`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] kiln_store::StoreError),

    #[error("settings error: {0}")]
    Settings(#[from] kiln_settings::SettingsError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why the job runner did not accept a start request.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The configured runner URL cannot carry a job path.
    #[error("invalid runner URL: {0}")]
    InvalidUrl(String),

    /// Connection refused, DNS failure, reset mid-request.
    #[error("runner unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// No response within the configured timeout.
    #[error("runner did not answer within {secs}s")]
    Timeout { secs: u64 },

    /// The runner answered with a non-success status.
    #[error("runner rejected start ({status}): {reason}")]
    Rejected { status: u16, reason: String },
}

impl RunnerError {
    /// Human-readable text stored on the job's `info` field.
    pub fn diagnostic(&self) -> String {
        match self {
            RunnerError::Rejected { reason, .. } => {
                format!("Failed to start queued job: {reason}")
            }
            other => format!("Error starting queued job: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_are_non_empty() {
        let rejected = RunnerError::Rejected {
            status: 503,
            reason: "Service Unavailable".to_string(),
        };
        assert_eq!(
            rejected.diagnostic(),
            "Failed to start queued job: Service Unavailable"
        );

        let timeout = RunnerError::Timeout { secs: 30 };
        assert_eq!(
            timeout.diagnostic(),
            "Error starting queued job: runner did not answer within 30s"
        );
    }
}
