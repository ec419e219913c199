use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use kiln_core::KilnConfig;
use kiln_scheduler::QueueWorker;
use kiln_settings::Settings;
use kiln_store::{import::MAX_IMPORT_BYTES, SqliteStore};
use std::sync::Arc;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: KilnConfig,
    pub store: Arc<SqliteStore>,
    pub settings: Arc<Settings>,
    /// Shared with the timer task; the gateway only reads its state.
    pub worker: Arc<QueueWorker>,
}

impl AppState {
    pub fn new(
        config: KilnConfig,
        store: Arc<SqliteStore>,
        settings: Arc<Settings>,
        worker: Arc<QueueWorker>,
    ) -> Self {
        Self {
            config,
            store,
            settings,
            worker,
        }
    }
}

/// Multipart framing on top of the largest accepted database file.
const UPLOAD_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/api/settings",
            get(crate::http::settings::get_settings).post(crate::http::settings::update_settings),
        )
        .route(
            "/api/jobs",
            get(crate::http::jobs::list_jobs).post(crate::http::jobs::create_job),
        )
        .route("/api/jobs/{id}/queue", post(crate::http::jobs::queue_job))
        .route("/api/jobs/{id}/delete", get(crate::http::jobs::delete_job))
        .route(
            "/api/jobs/import",
            post(crate::http::import::import_database).layer(DefaultBodyLimit::max(
                MAX_IMPORT_BYTES as usize + UPLOAD_OVERHEAD_BYTES,
            )),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
