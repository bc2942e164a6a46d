use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{JobRunner, JobStatus, ScanJob};

const JOB_COLUMNS: &str = "id, status, source, filter_type, total_items, success_count, \
                           fail_count, error, created_at, started_at, completed_at";

fn status_from_row(row: &PgRow) -> Result<JobStatus, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })
}

fn job_from_row(row: &PgRow) -> Result<ScanJob, sqlx::Error> {
    let status = status_from_row(row)?;

    Ok(ScanJob {
        id: row.try_get("id")?,
        status,
        source: row.try_get("source")?,
        filter_type: row.try_get("filter_type")?,
        total_items: row.try_get("total_items")?,
        success_count: row.try_get("success_count")?,
        fail_count: row.try_get("fail_count")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new scan job in `pending` state
pub async fn create_job(
    pool: &PgPool,
    total_items: i32,
    source: &str,
    filter_type: &str,
    runner: JobRunner,
) -> Result<ScanJob, sqlx::Error> {
    let row = sqlx::query(&format!(
        "INSERT INTO buybox_jobs (status, total_items, source, filter_type, runner) \
         VALUES ('pending', $1, $2, $3, $4) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(total_items)
    .bind(source)
    .bind(filter_type)
    .bind(runner.to_string())
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ScanJob>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM buybox_jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Current status only; `None` when the job no longer exists
pub async fn get_job_status(pool: &PgPool, job_id: Uuid) -> Result<Option<JobStatus>, sqlx::Error> {
    let row = sqlx::query("SELECT status FROM buybox_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(status_from_row).transpose()
}

/// Most recent jobs first
pub async fn list_jobs(pool: &PgPool, limit: i64) -> Result<Vec<ScanJob>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM buybox_jobs ORDER BY created_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Move a pending job to `running` and stamp `started_at`
pub async fn mark_job_running(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET status = 'running', started_at = COALESCE(started_at, NOW())
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Push cumulative counts. Counters only grow and terminal states are kept.
pub async fn update_job_progress(
    pool: &PgPool,
    job_id: Uuid,
    success_count: i32,
    fail_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET success_count = GREATEST(success_count, $1),
            fail_count = GREATEST(fail_count, $2),
            status = CASE WHEN status IN ('completed', 'failed', 'cancelled')
                          THEN status ELSE 'running' END
        WHERE id = $3
        "#,
    )
    .bind(success_count)
    .bind(fail_count)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a running job completed with its final totals.
/// Returns `false` if the job had already reached a terminal state.
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    success_count: i32,
    fail_count: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET status = 'completed',
            success_count = $1,
            fail_count = $2,
            completed_at = NOW()
        WHERE id = $3 AND status IN ('pending', 'running')
        "#,
    )
    .bind(success_count)
    .bind(fail_count)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a job failed with the reason. Returns `false` if it was already terminal.
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET status = 'failed', error = $1, completed_at = NOW()
        WHERE id = $2 AND status IN ('pending', 'running')
        "#,
    )
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel a job that has not finished. Returns `false` if it was already terminal.
pub async fn cancel_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET status = 'cancelled', error = 'Cancelled by user', completed_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'running')
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail server-run jobs left open by a previous server process. Jobs owned by
/// the `scan` binary are left alone. Returns how many were reset.
pub async fn fail_interrupted_jobs(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE buybox_jobs
        SET status = 'failed', error = 'Interrupted by server restart', completed_at = NOW()
        WHERE status IN ('pending', 'running') AND runner = $1
        "#,
    )
    .bind(JobRunner::Server.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
