use async_trait::async_trait;
use uuid::Uuid;

use crate::models::buybox::{BuyBoxSnapshot, ScanFailure};
use crate::models::job::JobStatus;

/// Persistence operations the scanner needs while a job runs.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn mark_running(&self, job_id: Uuid) -> Result<(), StoreError>;

    /// Status as persisted, which other processes may change (cancel, restart
    /// recovery). `None` when the job is gone.
    async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError>;

    /// Push cumulative counts. Counters never move backwards.
    async fn update_progress(&self, job_id: Uuid, success: i32, failed: i32)
        -> Result<(), StoreError>;

    /// Returns `false` when the job was already terminal and nothing changed.
    async fn complete_job(&self, job_id: Uuid, success: i32, failed: i32)
        -> Result<bool, StoreError>;

    /// Returns `false` when the job was already terminal and nothing changed.
    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<bool, StoreError>;

    /// Bulk insert; returns the number of rows written.
    async fn insert_results(&self, job_id: Uuid, records: &[BuyBoxSnapshot])
        -> Result<u64, StoreError>;

    async fn insert_result(&self, job_id: Uuid, record: &BuyBoxSnapshot) -> Result<(), StoreError>;

    async fn record_failure(&self, job_id: Uuid, failure: &ScanFailure) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
