use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use kiln_scheduler::{HttpJobRunner, QueueWorker};
use kiln_settings::{Settings, SettingsCache, SettingsDefaults};
use kiln_store::SqliteStore;
use tracing::info;

mod app;
mod http;

/// Training-job control panel backend and queue worker.
#[derive(Debug, Parser)]
#[command(name = "kiln-gateway", version, about)]
struct Cli {
    /// Path to kiln.toml. Falls back to KILN_CONFIG, then ~/.kiln/kiln.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kiln_gateway=info,kiln_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > KILN_CONFIG env > ~/.kiln/kiln.toml
    let config_path = cli.config.or_else(|| std::env::var("KILN_CONFIG").ok());
    let config = kiln_core::KilnConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        kiln_core::KilnConfig::default()
    });

    let db_path = &config.database.path;
    config.database.ensure_parent_dir()?;
    info!(path = %db_path, "opening SQLite database");
    let store = Arc::new(SqliteStore::open(db_path)?);

    let cache = Arc::new(SettingsCache::new());
    let settings = Arc::new(Settings::new(
        store.clone(),
        cache,
        SettingsDefaults::from(&config.paths),
    ));

    let runner = HttpJobRunner::from_config(&config.runner)?;
    info!(base_url = %config.runner.base_url, "job runner configured");

    let worker = Arc::new(QueueWorker::new(
        store.clone(),
        settings.clone(),
        Arc::new(runner),
    ));
    let worker = worker.spawn(config.worker.period());

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    let state = Arc::new(app::AppState::new(
        config,
        store,
        settings,
        worker.worker().clone(),
    ));
    let router = app::build_router(state);

    info!("Kiln gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // let an in-flight tick finish before the store goes away
    worker.stop().await;
    info!("Kiln gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
