use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{queries, results};
use crate::models::buybox::{BuyBoxSnapshot, ScanFailure};
use crate::models::job::JobStatus;
use crate::scanner::store::{ScanStore, StoreError};

/// [`ScanStore`] backed by the PostgreSQL pool.
#[derive(Clone)]
pub struct PgScanStore {
    pool: PgPool,
}

impl PgScanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn mark_running(&self, job_id: Uuid) -> Result<(), StoreError> {
        Ok(queries::mark_job_running(&self.pool, job_id).await?)
    }

    async fn job_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        Ok(queries::get_job_status(&self.pool, job_id).await?)
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        success: i32,
        failed: i32,
    ) -> Result<(), StoreError> {
        Ok(queries::update_job_progress(&self.pool, job_id, success, failed).await?)
    }

    async fn complete_job(&self, job_id: Uuid, success: i32, failed: i32) -> Result<bool, StoreError> {
        Ok(queries::complete_job(&self.pool, job_id, success, failed).await?)
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<bool, StoreError> {
        Ok(queries::fail_job(&self.pool, job_id, reason).await?)
    }

    async fn insert_results(
        &self,
        job_id: Uuid,
        records: &[BuyBoxSnapshot],
    ) -> Result<u64, StoreError> {
        Ok(results::insert_results(&self.pool, job_id, records).await?)
    }

    async fn insert_result(&self, job_id: Uuid, record: &BuyBoxSnapshot) -> Result<(), StoreError> {
        Ok(results::insert_result(&self.pool, job_id, record).await?)
    }

    async fn record_failure(&self, job_id: Uuid, failure: &ScanFailure) -> Result<(), StoreError> {
        Ok(results::record_failure(&self.pool, job_id, failure).await?)
    }
}
