use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::db::store::PgScanStore;
use crate::scanner::cancel::ScanRegistry;
use crate::scanner::rate_limiter::RateLimiterRegistry;
use crate::scanner::{ScanSettings, Scanner};
use crate::services::{
    pricing::PricingClient, simulated::SimulatedPricingClient, sp_api::SpApiClient,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pricing: Arc<dyn PricingClient>,
    pub limiters: Arc<RateLimiterRegistry>,
    pub scans: Arc<ScanRegistry>,
    pub settings: ScanSettings,
}

impl AppState {
    pub fn new(db: PgPool, pricing: Arc<dyn PricingClient>, settings: ScanSettings) -> Self {
        Self {
            db,
            pricing,
            limiters: Arc::new(RateLimiterRegistry::new(settings.min_interval)),
            scans: Arc::new(ScanRegistry::new()),
            settings,
        }
    }

    /// A scanner over this state's pricing client, sharing its credential's limiter.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(
            Arc::clone(&self.pricing),
            Arc::new(PgScanStore::new(self.db.clone())),
            self.limiters.limiter_for(self.pricing.credential_id()),
            self.settings.clone(),
        )
    }
}

/// Real SP-API client or the simulated one, per `USE_REAL_API`.
pub fn build_pricing_client(config: &AppConfig) -> Result<Arc<dyn PricingClient>, ConfigError> {
    if config.use_real_api {
        let credentials = config.spapi_credentials()?;
        let client = SpApiClient::new(credentials)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        tracing::info!(endpoint = %config.spapi_endpoint, "Using live SP-API pricing client");
        Ok(Arc::new(client))
    } else {
        tracing::warn!("USE_REAL_API is off, using simulated pricing data");
        Ok(Arc::new(SimulatedPricingClient::new(
            config.spapi_marketplace_id.clone(),
        )))
    }
}
