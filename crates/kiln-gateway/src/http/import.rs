//! POST /api/jobs/import: copy jobs out of an uploaded SQLite file.
//!
//! The upload arrives as multipart field `database`, is spooled to
//! `<data_root>/temp/` and removed again whatever the import outcome.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use kiln_store::{
    import::{import_jobs, sanitize_file_name, validate_upload, ImportReport},
    StoreError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{api_error, internal, ApiResult};
use crate::app::AppState;

pub async fn import_database(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportReport>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some("database") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(api_error(StatusCode::BAD_REQUEST, "No file uploaded"));
    };
    validate_upload(&file_name, bytes.len() as u64)
        .map_err(|msg| api_error(StatusCode::BAD_REQUEST, msg))?;

    let data_root = state.settings.data_root().map_err(internal)?;
    let temp_dir = PathBuf::from(data_root).join("temp");
    tokio::fs::create_dir_all(&temp_dir).await.map_err(internal)?;
    let temp_path = temp_dir.join(format!(
        "import_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        sanitize_file_name(&file_name)
    ));
    tokio::fs::write(&temp_path, &bytes).await.map_err(internal)?;
    info!(file = %file_name, bytes = bytes.len(), "database upload received");

    let store = state.store.clone();
    let path = temp_path.clone();
    let result = tokio::task::spawn_blocking(move || import_jobs(&*store, &path)).await;

    if let Err(e) = tokio::fs::remove_file(&temp_path).await {
        warn!(path = %temp_path.display(), "failed to remove import temp file: {e}");
    }

    match result.map_err(internal)? {
        Ok(report) => Ok(Json(report)),
        Err(e @ StoreError::Import(_)) => Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => Err(internal(e)),
    }
}
