use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a Buy Box scan job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Process that owns a job while it runs.
#[derive(Debug, Clone, Copy, EnumString, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum JobRunner {
    /// Spawned by the HTTP server; dies with it.
    Server,
    /// The one-shot `scan` binary.
    Scan,
}

/// A bulk scan job: progress counters and lifecycle, not the work items themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub source: String,
    pub filter_type: String,
    pub total_items: i32,
    pub success_count: i32,
    pub fail_count: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanJob {
    /// Share of items with a terminal disposition, 0-100 with two decimals.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_items <= 0 {
            return if self.status == JobStatus::Completed { 100.0 } else { 0.0 };
        }
        let done = f64::from(self.success_count + self.fail_count);
        let pct = done / f64::from(self.total_items) * 100.0;
        (pct.min(100.0) * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn job(total: i32, ok: i32, failed: i32) -> ScanJob {
        ScanJob {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            source: "dashboard".to_string(),
            filter_type: "active".to_string(),
            total_items: total,
            success_count: ok,
            fail_count: failed,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn status_round_trips_through_database_strings() {
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(JobStatus::from_str("running").unwrap(), JobStatus::Running);
        assert!(JobStatus::from_str("paused").is_err());
    }

    #[test]
    fn only_finished_states_are_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn runner_is_stored_in_snake_case() {
        assert_eq!(JobRunner::Server.to_string(), "server");
        assert_eq!(JobRunner::from_str("scan").unwrap(), JobRunner::Scan);
    }

    #[test]
    fn progress_counts_both_outcomes() {
        assert_eq!(job(3, 1, 0).progress_percentage(), 33.33);
        assert_eq!(job(120, 100, 20).progress_percentage(), 100.0);
        assert_eq!(job(0, 0, 0).progress_percentage(), 0.0);
    }
}
