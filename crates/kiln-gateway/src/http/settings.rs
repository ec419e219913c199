use axum::{extract::State, Json};
use kiln_settings::SettingsUpdate;
use serde_json::json;
use std::sync::Arc;

use super::{internal, ApiResult};
use crate::app::AppState;

/// GET /api/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult {
    state.settings.snapshot().map(Json).map_err(internal)
}

/// POST /api/settings: upsert the given keys, then flush the settings cache
/// so the queue worker sees them on its next tick.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsUpdate>,
) -> ApiResult {
    state.settings.update(&body).map_err(internal)?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use crate::app::test_support::{body_json, test_app};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn defaults_then_update_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (state, app) = test_app(dir.path());

        let resp = app
            .clone()
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["JOB_QUEUEING"], false);
        assert_eq!(
            body["TRAINING_FOLDER"],
            dir.path().join("output").to_string_lossy().as_ref()
        );

        // Prime the cache so the flush is observable.
        assert!(!state.settings.job_queueing().unwrap());

        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/settings")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"HF_TOKEN":"hf_1","TRAINING_FOLDER":"/mnt/runs","JOB_QUEUEING":true}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["success"], true);

        assert!(state.settings.job_queueing().unwrap());
        assert_eq!(state.settings.training_folder().unwrap(), "/mnt/runs");

        let resp = app
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["HF_TOKEN"], "hf_1");
        assert_eq!(body["JOB_QUEUEING"], true);
    }
}
