use async_trait::async_trait;
use chrono::Utc;

use crate::models::buybox::{BuyBoxSnapshot, WorkItem};
use crate::models::scan::is_valid_asin;
use crate::services::pricing::{FetchError, PricingClient};

/// Demo-mode pricing client used when `USE_REAL_API` is off.
///
/// Prices are derived from the ASIN so repeated scans return the same numbers.
pub struct SimulatedPricingClient {
    marketplace_id: String,
}

impl SimulatedPricingClient {
    pub fn new(marketplace_id: impl Into<String>) -> Self {
        Self {
            marketplace_id: marketplace_id.into(),
        }
    }
}

#[async_trait]
impl PricingClient for SimulatedPricingClient {
    fn credential_id(&self) -> &str {
        "simulated"
    }

    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn fetch_item(&self, item: &WorkItem) -> Result<BuyBoxSnapshot, FetchError> {
        if !is_valid_asin(&item.asin) {
            return Err(FetchError::NotFound(item.asin.clone()));
        }

        let seed: u32 = item.asin.bytes().map(u32::from).sum();
        let listing = 5.0 + f64::from(seed % 4000) / 100.0;
        let shipping = if seed % 3 == 0 { 0.0 } else { 2.99 };

        Ok(BuyBoxSnapshot {
            asin: item.asin.clone(),
            sku: item.sku.clone(),
            marketplace_id: self.marketplace_id.clone(),
            buybox_price: Some(((listing + shipping) * 100.0).round() / 100.0),
            listing_price: Some(listing),
            shipping_price: Some(shipping),
            currency: Some("GBP".to_string()),
            is_winner: seed % 2 == 0,
            offer_count: i32::try_from(seed % 12 + 1).ok(),
            captured_at: Utc::now(),
            raw: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_asin_gets_same_price() {
        let client = SimulatedPricingClient::new("A1F83G8C2ARO7P");
        let item = WorkItem::new("B07XJ8C8F5", "SKU-1");
        let a = client.fetch_item(&item).await.unwrap();
        let b = client.fetch_item(&item).await.unwrap();
        assert_eq!(a.buybox_price, b.buybox_price);
        assert_eq!(a.is_winner, b.is_winner);
    }

    #[test]
    fn reports_simulated_kind() {
        let client = SimulatedPricingClient::new("A1F83G8C2ARO7P");
        assert_eq!(client.kind(), "simulated");
        assert_eq!(client.credential_id(), "simulated");
    }

    #[tokio::test]
    async fn malformed_asin_is_not_found() {
        let client = SimulatedPricingClient::new("A1F83G8C2ARO7P");
        let err = client
            .fetch_item(&WorkItem::new("nope", "SKU-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
