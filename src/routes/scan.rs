use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::{queries, results};
use crate::models::buybox::{BuyBoxSnapshot, WorkItem};
use crate::models::job::JobRunner;
use crate::models::scan::{
    is_valid_asin, CancelResponse, FailureRecord, FilterType, JobStatusResponse,
    StartScanRequest, StartScanResponse,
};
use crate::scanner::estimate_duration;
use crate::services::pricing::FetchError;

fn internal(context: &'static str) -> impl FnOnce(sqlx::Error) -> StatusCode {
    move |e| {
        tracing::error!(error = %e, "{context}");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// POST /api/v1/buybox/start - Accept a bulk scan and run it in the background.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> Result<(StatusCode, Json<StartScanResponse>), StatusCode> {
    if let Err(report) = req.validate() {
        tracing::info!(errors = %report, "Rejected scan request");
        return Err(StatusCode::BAD_REQUEST);
    }

    let limit = req.max_asins.map(i64::from);
    let items = match req.filter_type {
        FilterType::Custom => {
            let asins = dedup_asins(req.custom_asins.as_deref().unwrap_or_default(), limit);
            if asins.is_empty() {
                return Err(StatusCode::BAD_REQUEST);
            }
            results::lookup_skus(&state.db, &asins)
                .await
                .map_err(internal("Failed to map custom ASINs"))?
        }
        filter => results::select_work_items(&state.db, filter, limit)
            .await
            .map_err(internal("Failed to load work list"))?,
    };

    if items.is_empty() {
        tracing::info!(filter = %req.filter_type, "No ASINs to scan");
        return Err(StatusCode::BAD_REQUEST);
    }

    let total = items.len();
    let job = queries::create_job(
        &state.db,
        i32::try_from(total).map_err(|_| StatusCode::BAD_REQUEST)?,
        &req.source,
        &req.filter_type.to_string(),
        JobRunner::Server,
    )
    .await
    .map_err(internal("Failed to create scan job"))?;

    metrics::counter!("buybox_scan_jobs_total").increment(1);
    spawn_scan(&state, job.id, items);

    tracing::info!(
        job_id = %job.id,
        total_asins = total,
        source = %req.source,
        filter = %req.filter_type,
        "Scan accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            job_id: job.id,
            total_asins: total,
            estimated_duration: estimate_duration(total, &state.settings),
        }),
    ))
}

/// Detach the scan; the request returns while it runs.
fn spawn_scan(state: &AppState, job_id: Uuid, items: Vec<WorkItem>) {
    let token = state.scans.register(job_id);
    let scanner = state.scanner();
    let scans = state.scans.clone();

    tokio::spawn(async move {
        let summary = scanner.execute(job_id, items, token).await;
        scans.finish(job_id);
        tracing::info!(
            job_id = %job_id,
            disposition = ?summary.disposition,
            api_calls = summary.api_calls,
            "Scan task finished"
        );
    });
}

/// Keep first occurrence order, then cap at `limit`.
fn dedup_asins(asins: &[String], limit: Option<i64>) -> Vec<String> {
    let mut seen = HashSet::new();
    let cap = limit
        .and_then(|l| usize::try_from(l).ok())
        .unwrap_or(usize::MAX);
    asins
        .iter()
        .filter(|a| seen.insert(a.as_str()))
        .take(cap)
        .cloned()
        .collect()
}

/// GET /api/v1/buybox/status/{job_id} - Scan progress.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let job = queries::get_job(&state.db, job_id)
        .await
        .map_err(internal("Failed to load job"))?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(job.into()))
}

/// POST /api/v1/buybox/{job_id}/cancel - Stop a running scan.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, StatusCode> {
    let cancelled = queries::cancel_job(&state.db, job_id)
        .await
        .map_err(internal("Failed to cancel job"))?;

    if !cancelled {
        let exists = queries::get_job(&state.db, job_id)
            .await
            .map_err(internal("Failed to load job"))?
            .is_some();
        return Err(if exists {
            StatusCode::CONFLICT
        } else {
            StatusCode::NOT_FOUND
        });
    }

    let signalled = state.scans.cancel(job_id);
    tracing::info!(job_id = %job_id, signalled, "Scan cancellation requested");

    Ok(Json(CancelResponse {
        job_id,
        status: "cancelled".to_string(),
        message: "Scan will stop before its next API call".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/buybox/jobs - Recent scans, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobStatusResponse>>, StatusCode> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let jobs = queries::list_jobs(&state.db, limit)
        .await
        .map_err(internal("Failed to list jobs"))?;

    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/buybox/{job_id}/failures - Failure audit trail of a scan.
pub async fn list_failures(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<FailureRecord>>, StatusCode> {
    ensure_job_exists(&state, job_id).await?;
    let failures = results::list_failures(&state.db, job_id)
        .await
        .map_err(internal("Failed to list failures"))?;
    Ok(Json(failures))
}

/// GET /api/v1/buybox/{job_id}/results - Stored Buy Box results of a scan.
pub async fn list_results(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Vec<BuyBoxSnapshot>>, StatusCode> {
    ensure_job_exists(&state, job_id).await?;
    let snapshots = results::list_results(&state.db, job_id)
        .await
        .map_err(internal("Failed to list results"))?;
    Ok(Json(snapshots))
}

async fn ensure_job_exists(state: &AppState, job_id: Uuid) -> Result<(), StatusCode> {
    queries::get_job(&state.db, job_id)
        .await
        .map_err(internal("Failed to load job"))?
        .map(|_| ())
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/v1/buybox/asin/{asin} - Live Buy Box lookup for one ASIN.
///
/// Shares the credential's rate limiter and retry policy with bulk scans.
pub async fn lookup_asin(
    State(state): State<AppState>,
    Path(asin): Path<String>,
) -> Result<Json<BuyBoxSnapshot>, StatusCode> {
    if !is_valid_asin(&asin) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let item = results::lookup_skus(&state.db, std::slice::from_ref(&asin))
        .await
        .map_err(internal("Failed to map ASIN"))?
        .into_iter()
        .next()
        .unwrap_or_else(|| WorkItem::new(asin.clone(), asin.clone()));

    let attempted = state.scanner().fetch_with_retry(&item).await;
    attempted.result.map(Json).map_err(|e| {
        tracing::warn!(asin = %asin, attempts = attempted.attempts, error = %e, "Single ASIN lookup failed");
        fetch_error_status(&e)
    })
}

fn fetch_error_status(err: &FetchError) -> StatusCode {
    match err {
        FetchError::NotFound(_) => StatusCode::NOT_FOUND,
        FetchError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FetchError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        FetchError::AccessDenied(_) | FetchError::Other(_) => StatusCode::BAD_GATEWAY,
    }
}
