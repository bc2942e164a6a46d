//! Rate-limited bulk Buy Box scanner.
//!
//! Drives a list of [`WorkItem`]s through a [`PricingClient`] strictly in
//! order, one call at a time, gated by a shared [`RateLimiter`]. Items are
//! processed in fixed-size batches; each batch's successes are bulk-written
//! once the batch finishes, failures are written to the audit trail as they
//! happen. Every item ends with exactly one terminal disposition.
//!
//! Cancellation is observed at batch boundaries and progress checkpoints,
//! either through the in-process [`CancelToken`] or through the persisted job
//! status reaching a terminal state. Write failures after the job has started
//! are logged and counted, never fatal.

pub mod backoff;
pub mod cancel;
pub mod rate_limiter;
pub mod store;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::buybox::{BuyBoxSnapshot, ScanFailure, ScanResult, WorkItem};
use crate::models::job::JobStatus;
use crate::services::pricing::{FetchError, PricingClient};

use backoff::backoff_delay;
use cancel::CancelToken;
use rate_limiter::RateLimiter;
use store::{ScanStore, StoreError};

/// Orchestrator tuning. Defaults match the production configuration.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub batch_size: usize,
    /// Calls per item, including the first one.
    pub max_attempts: u32,
    pub batch_delay: Duration,
    pub min_interval: Duration,
    pub cooldown: Duration,
    pub cooldown_threshold: u32,
    pub progress_every: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 3,
            batch_delay: Duration::from_secs(30),
            min_interval: Duration::from_millis(2000),
            cooldown: Duration::from_secs(60),
            cooldown_threshold: 3,
            progress_every: 10,
        }
    }
}

/// Rough wall-clock seconds a scan of `total` items will take.
pub fn estimate_duration(total: usize, settings: &ScanSettings) -> u64 {
    if total == 0 {
        return 0;
    }
    let batches = total.div_ceil(settings.batch_size.max(1));
    let calls = u32::try_from(total)
        .ok()
        .and_then(|n| settings.min_interval.checked_mul(n));
    let pauses = u32::try_from(batches - 1)
        .ok()
        .and_then(|n| settings.batch_delay.checked_mul(n));
    match (calls, pauses) {
        (Some(calls), Some(pauses)) => calls.saturating_add(pauses).as_secs(),
        _ => u64::MAX,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Cancelled,
    Failed(String),
}

/// Totals for one scan run.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub job_id: Uuid,
    pub success: i32,
    pub failed: i32,
    pub api_calls: u64,
    pub batches: usize,
    pub persist_failures: u64,
    pub disposition: Disposition,
}

/// Result of one item after its retries are spent.
#[derive(Debug)]
pub struct Attempted {
    pub result: Result<BuyBoxSnapshot, FetchError>,
    pub attempts: u32,
}

#[derive(Default)]
struct Tally {
    success: i32,
    failed: i32,
    api_calls: u64,
    batches: usize,
    persist_failures: u64,
}

impl Tally {
    fn processed(&self) -> usize {
        usize::try_from(self.success + self.failed).unwrap_or(0)
    }
}

pub struct Scanner {
    client: Arc<dyn PricingClient>,
    store: Arc<dyn ScanStore>,
    limiter: Arc<RateLimiter>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        client: Arc<dyn PricingClient>,
        store: Arc<dyn ScanStore>,
        limiter: Arc<RateLimiter>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            client,
            store,
            limiter,
            settings,
        }
    }

    /// Run a scan to its end and record the terminal job state.
    ///
    /// Never returns an error: scan-level failures mark the job `failed`,
    /// cancellation leaves the job as the canceller set it. The disposition
    /// reflects the persisted outcome, so a job finalized elsewhere while the
    /// scan ran is not reported as completed.
    pub async fn execute(
        &self,
        job_id: Uuid,
        items: Vec<WorkItem>,
        cancel: CancelToken,
    ) -> ScanSummary {
        let started = std::time::Instant::now();
        let mut tally = Tally::default();

        tracing::info!(
            job_id = %job_id,
            total_items = items.len(),
            batch_size = self.settings.batch_size,
            "Starting Buy Box scan"
        );

        let disposition = match self.drive(job_id, &items, &cancel, &mut tally).await {
            Ok(true) => self.finish_completed(job_id, &tally).await,
            Ok(false) => self.finish_stopped(job_id, &mut tally).await,
            Err(e) => self.finish_failed(job_id, &e.to_string()).await,
        };

        metrics::histogram!("buybox_scan_duration_seconds").record(started.elapsed().as_secs_f64());

        ScanSummary {
            job_id,
            success: tally.success,
            failed: tally.failed,
            api_calls: tally.api_calls,
            batches: tally.batches,
            persist_failures: tally.persist_failures,
            disposition,
        }
    }

    /// Returns `Ok(false)` when the scan stopped on cancellation. Only failing
    /// to start the job is an error.
    async fn drive(
        &self,
        job_id: Uuid,
        items: &[WorkItem],
        cancel: &CancelToken,
        tally: &mut Tally,
    ) -> Result<bool, ScanError> {
        self.store.mark_running(job_id).await?;

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = items.len().div_ceil(batch_size);
        let progress_every = self.settings.progress_every.max(1);

        for (index, batch) in items.chunks(batch_size).enumerate() {
            if self.should_stop(job_id, cancel).await {
                return Ok(false);
            }

            tally.batches += 1;
            tracing::info!(
                job_id = %job_id,
                batch = index + 1,
                batch_count,
                items = batch.len(),
                "Processing batch"
            );

            let mut buffer = Vec::with_capacity(batch.len());
            let mut cancelled = false;

            for item in batch {
                match self.scan_item(item, tally).await {
                    ScanResult::Success(snapshot) => {
                        tally.success += 1;
                        buffer.push(snapshot);
                    }
                    ScanResult::Failure(failure) => {
                        tally.failed += 1;
                        if let Err(e) = self.store.record_failure(job_id, &failure).await {
                            note_persist_failure(job_id, "failure audit", &e, tally);
                        }
                    }
                }

                if tally.processed() % progress_every == 0 {
                    if let Err(e) = self
                        .store
                        .update_progress(job_id, tally.success, tally.failed)
                        .await
                    {
                        note_persist_failure(job_id, "progress", &e, tally);
                    }
                    if self.should_stop(job_id, cancel).await {
                        cancelled = true;
                        break;
                    }
                }

                if self.limiter.consecutive_rate_limit_count() >= self.settings.cooldown_threshold {
                    tracing::warn!(
                        job_id = %job_id,
                        consecutive = self.limiter.consecutive_rate_limit_count(),
                        cooldown_secs = self.settings.cooldown.as_secs(),
                        "Repeated rate limiting, pausing scan"
                    );
                    metrics::counter!("buybox_cooldowns_total").increment(1);
                    sleep(self.settings.cooldown).await;
                    self.limiter.on_cooldown_complete();
                }
            }

            self.persist_batch(job_id, buffer, tally).await;

            if cancelled {
                return Ok(false);
            }

            if index + 1 < batch_count {
                tracing::debug!(
                    job_id = %job_id,
                    delay_secs = self.settings.batch_delay.as_secs(),
                    "Pausing between batches"
                );
                sleep(self.settings.batch_delay).await;
            }
        }

        Ok(true)
    }

    /// Cancelled in-process, or the persisted job already reached a terminal
    /// state (cancelled through the API, or failed by restart recovery).
    /// An unreadable status does not stop the scan.
    async fn should_stop(&self, job_id: Uuid, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        match self.store.job_status(job_id).await {
            Ok(Some(status)) if status.is_terminal() => {
                tracing::info!(job_id = %job_id, status = %status, "Job finalized elsewhere, stopping scan");
                true
            }
            Ok(Some(_)) => false,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job record disappeared, stopping scan");
                true
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to read job status, continuing");
                false
            }
        }
    }

    async fn scan_item(&self, item: &WorkItem, tally: &mut Tally) -> ScanResult {
        let attempted = self.fetch_with_retry(item).await;
        tally.api_calls += u64::from(attempted.attempts);

        match attempted.result {
            Ok(snapshot) => {
                metrics::counter!("buybox_items_total", "outcome" => "success").increment(1);
                ScanResult::Success(snapshot)
            }
            Err(err) => {
                metrics::counter!("buybox_items_total", "outcome" => "failure").increment(1);
                ScanResult::Failure(ScanFailure {
                    asin: item.asin.clone(),
                    sku: item.sku.clone(),
                    reason: err.to_string(),
                    error_code: err.code().to_string(),
                    attempt: attempted.attempts,
                    raw_error: Some(format!("{err:?}")),
                })
            }
        }
    }

    /// Fetch one item under the rate limiter, retrying retryable errors with
    /// exponential backoff up to `max_attempts` calls.
    pub async fn fetch_with_retry(&self, item: &WorkItem) -> Attempted {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.wait_for_next_slot().await;

            let err = match self.client.fetch_item(item).await {
                Ok(snapshot) => {
                    self.limiter.on_success();
                    return Attempted {
                        result: Ok(snapshot),
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            if err.is_rate_limited() {
                let streak = self.limiter.on_rate_limited();
                metrics::counter!("buybox_rate_limited_total").increment(1);
                tracing::debug!(asin = %item.asin, streak, "Rate limited");
            }

            if !err.is_retryable() || attempt >= self.settings.max_attempts {
                tracing::warn!(
                    asin = %item.asin,
                    sku = %item.sku,
                    attempt,
                    code = err.code(),
                    error = %err,
                    "Item failed"
                );
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            let delay = backoff_delay(attempt);
            tracing::warn!(
                asin = %item.asin,
                attempt,
                max_attempts = self.settings.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Pricing call failed, retrying after backoff"
            );
            sleep(delay).await;
        }
    }

    /// Best-effort write of a batch's successes; falls back to row-by-row.
    async fn persist_batch(&self, job_id: Uuid, records: Vec<BuyBoxSnapshot>, tally: &mut Tally) {
        if records.is_empty() {
            return;
        }

        match self.store.insert_results(job_id, &records).await {
            Ok(written) => {
                tracing::debug!(job_id = %job_id, written, "Batch results stored");
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    records = records.len(),
                    error = %e,
                    "Bulk insert failed, falling back to single-row inserts"
                );
                for record in &records {
                    if let Err(e) = self.store.insert_result(job_id, record).await {
                        tracing::error!(job_id = %job_id, asin = %record.asin, "Failed to store Buy Box result");
                        note_persist_failure(job_id, "result", &e, tally);
                    }
                }
            }
        }
    }

    async fn finish_completed(&self, job_id: Uuid, tally: &Tally) -> Disposition {
        match self
            .store
            .complete_job(job_id, tally.success, tally.failed)
            .await
        {
            Ok(true) => {
                metrics::counter!("buybox_scan_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    successful = tally.success,
                    failed = tally.failed,
                    api_calls = tally.api_calls,
                    persist_failures = tally.persist_failures,
                    "Scan completed"
                );
                Disposition::Completed
            }
            Ok(false) => self.finalized_elsewhere(job_id).await,
            Err(e) => {
                self.finish_failed(job_id, &format!("failed to complete job: {e}"))
                    .await
            }
        }
    }

    /// The job reached a terminal state the scanner did not write.
    async fn finalized_elsewhere(&self, job_id: Uuid) -> Disposition {
        match self.store.job_status(job_id).await {
            Ok(Some(JobStatus::Cancelled)) => {
                metrics::counter!("buybox_scan_jobs_cancelled").increment(1);
                tracing::info!(job_id = %job_id, "Job was cancelled before the scan could complete it");
                Disposition::Cancelled
            }
            Ok(Some(status)) => {
                metrics::counter!("buybox_scan_jobs_failed").increment(1);
                tracing::warn!(job_id = %job_id, status = %status, "Job was finalized elsewhere");
                Disposition::Failed(format!("job already {status}"))
            }
            Ok(None) => Disposition::Failed("job record no longer exists".to_string()),
            Err(e) => Disposition::Failed(format!("failed to read job status: {e}")),
        }
    }

    /// The scan stopped early. Reports `Failed` when the job was failed elsewhere.
    async fn finish_stopped(&self, job_id: Uuid, tally: &mut Tally) -> Disposition {
        if let Err(e) = self
            .store
            .update_progress(job_id, tally.success, tally.failed)
            .await
        {
            note_persist_failure(job_id, "final progress", &e, tally);
        }
        if let Ok(Some(status)) = self.store.job_status(job_id).await {
            if status.is_terminal() && status != JobStatus::Cancelled {
                metrics::counter!("buybox_scan_jobs_failed").increment(1);
                tracing::warn!(job_id = %job_id, status = %status, "Scan stopped, job finalized elsewhere");
                return Disposition::Failed(format!("job already {status}"));
            }
        }
        metrics::counter!("buybox_scan_jobs_cancelled").increment(1);
        tracing::info!(
            job_id = %job_id,
            successful = tally.success,
            failed = tally.failed,
            persist_failures = tally.persist_failures,
            "Scan cancelled"
        );
        Disposition::Cancelled
    }

    async fn finish_failed(&self, job_id: Uuid, reason: &str) -> Disposition {
        metrics::counter!("buybox_scan_jobs_failed").increment(1);
        tracing::error!(job_id = %job_id, error = reason, "Scan failed");
        match self.store.fail_job(job_id, reason).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id = %job_id, "Job was already terminal, failure not recorded"),
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to mark job as failed"),
        }
        Disposition::Failed(reason.to_string())
    }
}

/// A write the scan could not make. The scan carries on.
fn note_persist_failure(job_id: Uuid, what: &'static str, err: &StoreError, tally: &mut Tally) {
    tally.persist_failures += 1;
    metrics::counter!("buybox_persist_failures_total", "write" => what).increment(1);
    tracing::error!(job_id = %job_id, write = what, error = %err, "Scan write failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_includes_interval_and_batch_pauses() {
        let settings = ScanSettings::default();
        // 120 items at 2 s each plus two 30 s pauses
        assert_eq!(estimate_duration(120, &settings), 240 + 60);
        assert_eq!(estimate_duration(0, &settings), 0);
        assert_eq!(estimate_duration(50, &settings), 100);
    }

    #[test]
    fn estimate_saturates_instead_of_overflowing() {
        let settings = ScanSettings {
            min_interval: Duration::from_millis(u64::MAX),
            batch_delay: Duration::from_secs(u64::MAX),
            ..ScanSettings::default()
        };
        assert_eq!(estimate_duration(120, &settings), u64::MAX);
    }
}
