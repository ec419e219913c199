use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "runner": state.config.runner.base_url,
        "worker_ticking": state.worker.is_ticking(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::app::test_support::{body_json, test_app};
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (_, app) = test_app(dir.path());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["worker_ticking"], false);
    }
}
