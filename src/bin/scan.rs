//! One-shot Buy Box scan.
//!
//! Builds the work list from `SCAN_FILTER` / `SCAN_MAX_ASINS`, runs the scan
//! in the foreground and exits non-zero unless the job completes. The job can
//! still be cancelled through the HTTP API; the scanner sees the status change.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use buybox_scanner::{
    app_state::build_pricing_client,
    config::AppConfig,
    db::{self, queries, results, store::PgScanStore},
    models::{job::JobRunner, scan::FilterType},
    scanner::{cancel::CancelToken, rate_limiter::RateLimiter, Disposition, Scanner},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    match run().await {
        Ok(Disposition::Completed) => {}
        Ok(other) => {
            tracing::warn!(disposition = ?other, "Scan did not complete");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "Scan aborted");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<Disposition, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    if config.scan_filter == FilterType::Custom {
        return Err("SCAN_FILTER=custom is only supported through the HTTP API".into());
    }

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;

    let items = results::select_work_items(
        &db_pool,
        config.scan_filter,
        config.scan_max_asins.map(i64::from),
    )
    .await?;

    if items.is_empty() {
        tracing::info!(filter = %config.scan_filter, "No ASINs to scan");
        return Ok(Disposition::Completed);
    }

    let job = queries::create_job(
        &db_pool,
        i32::try_from(items.len())?,
        &config.scan_source,
        &config.scan_filter.to_string(),
        JobRunner::Scan,
    )
    .await?;

    let settings = config.scan_settings();
    let scanner = Scanner::new(
        build_pricing_client(&config)?,
        Arc::new(PgScanStore::new(db_pool)),
        Arc::new(RateLimiter::new(settings.min_interval)),
        settings,
    );

    tracing::info!(job_id = %job.id, total_asins = items.len(), "Scan job created");

    let summary = scanner.execute(job.id, items, CancelToken::never()).await;

    tracing::info!(
        job_id = %summary.job_id,
        successful = summary.success,
        failed = summary.failed,
        api_calls = summary.api_calls,
        batches = summary.batches,
        persist_failures = summary.persist_failures,
        "Scan finished"
    );

    Ok(summary.disposition)
}
