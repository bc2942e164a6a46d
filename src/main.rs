use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use buybox_scanner::app_state::{build_pricing_client, AppState};
use buybox_scanner::config::AppConfig;
use buybox_scanner::db::{self, queries};
use buybox_scanner::{build_router, routes};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "buybox-scanner exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    tracing::info!("Initializing buybox-scanner server");

    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url).await?;

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool).await?;

    // Server scans run in-process; any still open belong to a dead server.
    let interrupted = queries::fail_interrupted_jobs(&db_pool).await?;
    if interrupted > 0 {
        tracing::warn!(jobs = interrupted, "Marked interrupted scan jobs as failed");
    }

    let pricing = build_pricing_client(&config)?;
    let state = AppState::new(db_pool, pricing, config.scan_settings());
    let app = build_router(state, prometheus_handle);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
