use std::time::Duration;

use async_trait::async_trait;
use kiln_core::config::RunnerConfig;
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// The subsystem that actually executes training jobs.
///
/// The queue worker only triggers a start; every later status transition is
/// the runner's business.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Ask the runner to start `job_id`. `Ok` means the request was accepted.
    async fn start(&self, job_id: &str) -> Result<(), RunnerError>;
}

/// Runner reached over HTTP: `GET {base_url}/api/jobs/{id}/start`.
pub struct HttpJobRunner {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpJobRunner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RunnerError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RunnerError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RunnerError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunnerError> {
        Self::new(&config.base_url, config.timeout())
    }

    fn start_url(&self, job_id: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "jobs", job_id, "start"]);
        }
        url
    }
}

#[async_trait]
impl JobRunner for HttpJobRunner {
    async fn start(&self, job_id: &str) -> Result<(), RunnerError> {
        let url = self.start_url(job_id);
        debug!(%url, "requesting job start");

        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RunnerError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                RunnerError::Unreachable(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string();
            warn!(job_id, status = status.as_u16(), %reason, "runner refused start");
            return Err(RunnerError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Router};

    /// Stub runner: `ok-*` ids start, `slow-*` ids hang, everything else 500s.
    async fn serve_stub() -> String {
        async fn start(Path(id): Path<String>) -> StatusCode {
            if id.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if id.starts_with("ok") {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }

        let app = Router::new().route("/api/jobs/{id}/start", get(start));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn start_url_appends_job_path() {
        let runner = HttpJobRunner::new("http://localhost:8675/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            runner.start_url("abc").as_str(),
            "http://localhost:8675/api/jobs/abc/start"
        );
        assert_eq!(
            runner.start_url("a b/c").as_str(),
            "http://localhost:8675/api/jobs/a%20b%2Fc/start"
        );
    }

    #[test]
    fn builds_from_default_config() {
        let runner = HttpJobRunner::from_config(&RunnerConfig::default()).unwrap();
        assert_eq!(runner.timeout, Duration::from_secs(30));
        assert_eq!(
            runner.start_url("j1").as_str(),
            "http://localhost:8675/api/jobs/j1/start"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            HttpJobRunner::new("mailto:ops@example.com", Duration::from_secs(1)),
            Err(RunnerError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn success_status_is_accepted() {
        let base = serve_stub().await;
        let runner = HttpJobRunner::new(&base, Duration::from_secs(2)).unwrap();
        runner.start("ok-1").await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_rejected_with_reason() {
        let base = serve_stub().await;
        let runner = HttpJobRunner::new(&base, Duration::from_secs(2)).unwrap();
        let err = runner.start("job-7").await.unwrap_err();
        match err {
            RunnerError::Rejected { status, reason } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "Internal Server Error");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_runner_times_out() {
        let base = serve_stub().await;
        let runner = HttpJobRunner::new(&base, Duration::from_millis(100)).unwrap();
        let err = runner.start("slow-1").await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let runner =
            HttpJobRunner::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = runner.start("ok-1").await.unwrap_err();
        assert!(matches!(err, RunnerError::Unreachable(_)), "got {err:?}");
    }
}
