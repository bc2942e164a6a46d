use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of scan work: the ASIN to price and the SKU it maps to locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub asin: String,
    pub sku: String,
}

impl WorkItem {
    pub fn new(asin: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            sku: sku.into(),
        }
    }
}

/// Competitive pricing captured for one ASIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyBoxSnapshot {
    pub asin: String,
    pub sku: String,
    pub marketplace_id: String,
    /// Landed price (listing + shipping) of the New Buy Box offer.
    pub buybox_price: Option<f64>,
    pub listing_price: Option<f64>,
    pub shipping_price: Option<f64>,
    pub currency: Option<String>,
    /// Whether the requesting seller currently holds the Buy Box.
    pub is_winner: bool,
    pub offer_count: Option<i32>,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Audit record for an item that exhausted its attempts or failed terminally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub asin: String,
    pub sku: String,
    pub reason: String,
    pub error_code: String,
    pub attempt: u32,
    pub raw_error: Option<String>,
}

/// Terminal disposition of a single work item.
#[derive(Debug, Clone)]
pub enum ScanResult {
    Success(BuyBoxSnapshot),
    Failure(ScanFailure),
}
