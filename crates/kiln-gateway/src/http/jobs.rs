use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kiln_store::{Job, JobStatus, JobStore, NewJob, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{api_error, internal, ApiResult};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    pub gpu_ids: Option<String>,
    /// Either a JSON object or a string holding JSON.
    pub job_config: Value,
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> ApiResult {
    let jobs = state.store.list_jobs().map_err(internal)?;
    Ok(Json(json!({ "jobs": jobs })))
}

/// POST /api/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Job name is required"));
    }

    let job_config = match req.job_config {
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(_) => raw,
            Err(e) => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("job_config is not valid JSON: {e}"),
                ))
            }
        },
        Value::Null => {
            return Err(api_error(StatusCode::BAD_REQUEST, "job_config is required"));
        }
        other => other.to_string(),
    };

    let new = NewJob {
        name,
        gpu_ids: req
            .gpu_ids
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| "0".to_string()),
        job_config,
    };

    match state.store.create_job(new) {
        Ok(job) => Ok((StatusCode::CREATED, Json(job))),
        Err(e @ StoreError::DuplicateName { .. }) => {
            Err(api_error(StatusCode::CONFLICT, e.to_string()))
        }
        Err(e) => Err(internal(e)),
    }
}

/// POST /api/jobs/{id}/queue: mark the job queued and append it to the queue.
pub async fn queue_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let job = find_or_404(&state, &id)?;

    state
        .store
        .update_job_status(&job.id, JobStatus::Queued, "")
        .map_err(internal)?;
    let entry = state.store.enqueue(&job.id).map_err(internal)?;
    info!(job_id = %job.id, queue_id = %entry.id, "job queued");

    Ok(Json(json!({ "success": true, "queue": entry })))
}

/// GET /api/jobs/{id}/delete: remove the job, its queue entries and its
/// training folder. Returns the deleted job.
pub async fn delete_job(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let job = find_or_404(&state, &id)?;

    let training_folder = state.settings.training_folder().map_err(internal)?;
    match job_folder(&training_folder, &job.name) {
        Some(folder) => match tokio::fs::remove_dir_all(&folder).await {
            Ok(()) => info!(job_id = %job.id, folder = %folder.display(), "training folder removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(internal(format!("failed to remove {}: {e}", folder.display()))),
        },
        None => warn!(job_id = %job.id, name = %job.name, "job name is not a plain folder name; leaving files alone"),
    }

    let dequeued = state
        .store
        .delete_queue_entries_for_job(&job.id)
        .map_err(internal)?;
    state.store.delete_job(&job.id).map_err(internal)?;
    info!(job_id = %job.id, dequeued, "job deleted");

    Ok(Json(json!(job)))
}

fn find_or_404(state: &AppState, id: &str) -> ApiResult<Job> {
    match state.store.find_job(id).map_err(internal)? {
        Some(job) => Ok(job),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            StoreError::JobNotFound { id: id.to_string() }.to_string(),
        )),
    }
}

/// `<training_folder>/<name>`, or `None` when `name` would escape the folder.
fn job_folder(training_folder: &str, name: &str) -> Option<PathBuf> {
    let mut components = std::path::Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(PathBuf::from(training_folder).join(name)),
        _ => None,
    }
}
