//! In-memory collaborators for driving the scanner without SP-API or PostgreSQL

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use buybox_scanner::models::buybox::{BuyBoxSnapshot, ScanFailure, WorkItem};
use buybox_scanner::models::job::JobStatus;
use buybox_scanner::scanner::cancel::CancelHandle;
use buybox_scanner::scanner::store::{ScanStore, StoreError};
use buybox_scanner::services::pricing::{FetchError, PricingClient};

/// How the scripted client answers for one ASIN.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Fail with the error on the first N calls, then succeed.
    FailTimes(FetchError, u32),
    Always(FetchError),
}

/// Pricing client that answers from per-ASIN scripts and records every call.
pub struct ScriptedClient {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(mut self, asin: &str, script: Script) -> Self {
        self.scripts.insert(asin.to_string(), script);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, asin: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == asin)
            .count()
    }
}

#[async_trait]
impl PricingClient for ScriptedClient {
    fn credential_id(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_item(&self, item: &WorkItem) -> Result<BuyBoxSnapshot, FetchError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((item.asin.clone(), Instant::now()));
            calls.iter().filter(|(a, _)| *a == item.asin).count() as u32
        };

        match self.scripts.get(&item.asin).unwrap_or(&Script::Succeed) {
            Script::Succeed => Ok(snapshot(item)),
            Script::FailTimes(err, times) if call_number <= *times => Err(err.clone()),
            Script::FailTimes(..) => Ok(snapshot(item)),
            Script::Always(err) => Err(err.clone()),
        }
    }
}

pub fn snapshot(item: &WorkItem) -> BuyBoxSnapshot {
    BuyBoxSnapshot {
        asin: item.asin.clone(),
        sku: item.sku.clone(),
        marketplace_id: "A1F83G8C2ARO7P".to_string(),
        buybox_price: Some(19.99),
        listing_price: Some(17.00),
        shipping_price: Some(2.99),
        currency: Some("GBP".to_string()),
        is_winner: false,
        offer_count: Some(3),
        captured_at: Utc::now(),
        raw: None,
    }
}

/// Everything the memory store has been asked to persist.
#[derive(Debug, Default)]
pub struct MemoryState {
    /// `None` stands for a freshly created (pending) job.
    pub status: Option<JobStatus>,
    pub success: i32,
    pub failed: i32,
    pub error: Option<String>,
    pub progress_updates: Vec<(i32, i32)>,
    pub results: Vec<BuyBoxSnapshot>,
    pub failures: Vec<ScanFailure>,
    /// Size and time of each successful bulk insert.
    pub bulk_inserts: Vec<(usize, Instant)>,
    pub single_inserts: usize,
    pub completed_at: Option<Instant>,
}

impl MemoryState {
    fn is_terminal(&self) -> bool {
        self.status.is_some_and(JobStatus::is_terminal)
    }
}

/// Job store with the same transition rules as the PostgreSQL queries:
/// counters never move backwards and terminal states are never left.
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
    cancel_on_first_batch: Mutex<Option<CancelHandle>>,
    cancel_on_first_progress: Mutex<Option<CancelHandle>>,
    /// Status another process writes once the first batch is stored.
    finalize_on_first_batch: Mutex<Option<JobStatus>>,
    fail_bulk_inserts: bool,
    fail_failure_writes: bool,
    fail_progress_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every bulk insert so the scanner falls back to single rows.
    pub fn failing_bulk_inserts() -> Self {
        Self {
            fail_bulk_inserts: true,
            ..Self::default()
        }
    }

    /// Reject failure audit writes.
    pub fn failing_failure_writes() -> Self {
        Self {
            fail_failure_writes: true,
            ..Self::default()
        }
    }

    /// Reject progress updates.
    pub fn failing_progress_writes() -> Self {
        Self {
            fail_progress_writes: true,
            ..Self::default()
        }
    }

    /// Fire `handle` once the first batch has been persisted.
    pub fn cancel_after_first_batch(self, handle: CancelHandle) -> Self {
        *self.cancel_on_first_batch.lock().unwrap() = Some(handle);
        self
    }

    /// Fire `handle` on the first progress update.
    pub fn cancel_at_first_progress(self, handle: CancelHandle) -> Self {
        *self.cancel_on_first_progress.lock().unwrap() = Some(handle);
        self
    }

    /// Move the job to `status` behind the scanner's back once the first
    /// batch is stored, the way the cancel route or restart recovery would.
    pub fn finalized_elsewhere_after_first_batch(self, status: JobStatus) -> Self {
        *self.finalize_on_first_batch.lock().unwrap() = Some(status);
        self
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.state.lock().unwrap().status
    }

    fn after_batch_stored(&self) {
        if let Some(status) = self.finalize_on_first_batch.lock().unwrap().take() {
            let mut state = self.state.lock().unwrap();
            if !state.is_terminal() {
                state.status = Some(status);
            }
        }
        if let Some(handle) = self.cancel_on_first_batch.lock().unwrap().take() {
            handle.cancel();
        }
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn mark_running(&self, _job_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if matches!(state.status, None | Some(JobStatus::Pending)) {
            state.status = Some(JobStatus::Running);
        }
        Ok(())
    }

    async fn job_status(&self, _job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        Ok(Some(self.status().unwrap_or(JobStatus::Pending)))
    }

    async fn update_progress(
        &self,
        _job_id: Uuid,
        success: i32,
        failed: i32,
    ) -> Result<(), StoreError> {
        if self.fail_progress_writes {
            return Err(StoreError::Unavailable("jobs table locked".to_string()));
        }
        {
            let mut state = self.state.lock().unwrap();
            state.success = state.success.max(success);
            state.failed = state.failed.max(failed);
            state.progress_updates.push((success, failed));
            if !state.is_terminal() {
                state.status = Some(JobStatus::Running);
            }
        }
        if let Some(handle) = self.cancel_on_first_progress.lock().unwrap().take() {
            handle.cancel();
        }
        Ok(())
    }

    async fn complete_job(&self, _job_id: Uuid, success: i32, failed: i32) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.is_terminal() {
            return Ok(false);
        }
        state.status = Some(JobStatus::Completed);
        state.success = success;
        state.failed = failed;
        state.completed_at = Some(Instant::now());
        Ok(true)
    }

    async fn fail_job(&self, _job_id: Uuid, reason: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.is_terminal() {
            return Ok(false);
        }
        state.status = Some(JobStatus::Failed);
        state.error = Some(reason.to_string());
        Ok(true)
    }

    async fn insert_results(
        &self,
        _job_id: Uuid,
        records: &[BuyBoxSnapshot],
    ) -> Result<u64, StoreError> {
        if self.fail_bulk_inserts {
            return Err(StoreError::Unavailable("bulk insert disabled".to_string()));
        }
        {
            let mut state = self.state.lock().unwrap();
            state.results.extend_from_slice(records);
            state.bulk_inserts.push((records.len(), Instant::now()));
        }
        self.after_batch_stored();
        Ok(records.len() as u64)
    }

    async fn insert_result(&self, _job_id: Uuid, record: &BuyBoxSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.results.push(record.clone());
        state.single_inserts += 1;
        Ok(())
    }

    async fn record_failure(&self, _job_id: Uuid, failure: &ScanFailure) -> Result<(), StoreError> {
        if self.fail_failure_writes {
            return Err(StoreError::Unavailable("failures table unreachable".to_string()));
        }
        self.state.lock().unwrap().failures.push(failure.clone());
        Ok(())
    }
}
