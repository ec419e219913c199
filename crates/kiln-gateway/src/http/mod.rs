pub mod health;
pub mod import;
pub mod jobs;
pub mod settings;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

/// Handler result: JSON on success, `{ "error": .. }` with a status otherwise.
pub type ApiResult<T = Json<Value>> = Result<T, (StatusCode, Json<Value>)>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// Log and map an unexpected failure to 500.
pub fn internal(e: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    tracing::error!("request failed: {e}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
