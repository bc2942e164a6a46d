use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for every metric the scanner emits.
pub fn describe_metrics() {
    metrics::describe_counter!("buybox_scan_jobs_total", "Total Buy Box scan jobs accepted");
    metrics::describe_counter!("buybox_scan_jobs_completed", "Scan jobs that completed");
    metrics::describe_counter!("buybox_scan_jobs_failed", "Scan jobs that failed");
    metrics::describe_counter!("buybox_scan_jobs_cancelled", "Scan jobs stopped by cancellation");
    metrics::describe_counter!(
        "buybox_items_total",
        "Items with a terminal disposition, labelled by outcome"
    );
    metrics::describe_counter!(
        "buybox_rate_limited_total",
        "Rate-limit responses received from the pricing API"
    );
    metrics::describe_counter!(
        "buybox_cooldowns_total",
        "Extended pauses taken after repeated rate limiting"
    );
    metrics::describe_counter!(
        "buybox_persist_failures_total",
        "Scan writes that failed, labelled by write (result, failure audit, progress)"
    );
    metrics::describe_histogram!(
        "buybox_scan_duration_seconds",
        "Wall-clock duration of a scan job"
    );
}

/// GET /metrics - Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
