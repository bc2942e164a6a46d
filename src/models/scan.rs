use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::job::ScanJob;

/// Which mapped SKUs feed a scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterType {
    /// Only mappings flagged active.
    #[default]
    Active,
    All,
    /// Caller-supplied ASIN list.
    Custom,
}

/// Request body for POST /api/v1/buybox/start.
#[derive(Debug, Deserialize, Validate)]
pub struct StartScanRequest {
    #[garde(length(min = 1, max = 100))]
    #[serde(default = "default_source")]
    pub source: String,

    #[garde(skip)]
    #[serde(default)]
    pub filter_type: FilterType,

    #[garde(range(min = 1, max = 10000))]
    pub max_asins: Option<u32>,

    #[garde(custom(valid_asin_list))]
    pub custom_asins: Option<Vec<String>>,
}

fn default_source() -> String {
    "dashboard".to_string()
}

fn valid_asin_list(value: &Option<Vec<String>>, _ctx: &()) -> garde::Result {
    let Some(asins) = value else {
        return Ok(());
    };
    if asins.len() > 10000 {
        return Err(garde::Error::new("at most 10000 custom ASINs per scan"));
    }
    match asins.iter().find(|a| !is_valid_asin(a)) {
        Some(bad) => Err(garde::Error::new(format!("invalid ASIN: {bad}"))),
        None => Ok(()),
    }
}

/// ASINs are ten upper-case alphanumerics.
pub fn is_valid_asin(asin: &str) -> bool {
    asin.len() == 10
        && asin
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

/// Response after a scan is accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub job_id: Uuid,
    pub total_asins: usize,
    /// Rough wall-clock estimate in seconds.
    pub estimated_duration: u64,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub source: String,
    pub total: i32,
    pub successful: i32,
    pub failed: i32,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<ScanJob> for JobStatusResponse {
    fn from(job: ScanJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            progress_percentage: job.progress_percentage(),
            source: job.source,
            total: job.total_items,
            successful: job.success_count,
            failed: job.fail_count,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error: job.error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

/// A row of the failures audit trail as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureRecord {
    pub asin: String,
    pub sku: String,
    pub reason: String,
    pub error_code: String,
    pub attempt_number: i32,
    pub raw_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(custom: Option<Vec<&str>>) -> StartScanRequest {
        StartScanRequest {
            source: "dashboard".to_string(),
            filter_type: FilterType::Custom,
            max_asins: None,
            custom_asins: custom.map(|v| v.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn accepts_well_formed_asins() {
        assert!(request(Some(vec!["B07XJ8C8F5", "0439708184"])).validate().is_ok());
        assert!(request(None).validate().is_ok());
    }

    #[test]
    fn rejects_malformed_asin() {
        assert!(request(Some(vec!["B07XJ8C8F5", "b07xj8"])).validate().is_err());
    }

    #[test]
    fn rejects_zero_max_asins() {
        let mut req = request(None);
        req.max_asins = Some(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn filter_type_deserializes_from_snake_case() {
        let req: StartScanRequest =
            serde_json::from_str(r#"{"source":"cron","filter_type":"all","max_asins":25}"#).unwrap();
        assert_eq!(req.filter_type, FilterType::All);
        assert_eq!(req.max_asins, Some(25));
    }
}
