use serde::Deserialize;
use std::time::Duration;

use crate::models::scan::FilterType;
use crate::scanner::ScanSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the one-shot scan binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Use the real SP-API instead of the simulated demo client
    #[serde(default)]
    pub use_real_api: bool,

    /// Login-with-Amazon application client ID
    pub spapi_client_id: Option<String>,

    /// Login-with-Amazon application client secret
    pub spapi_client_secret: Option<String>,

    /// Seller refresh token issued during SP-API authorization
    pub spapi_refresh_token: Option<String>,

    /// Regional SP-API endpoint
    #[serde(default = "default_spapi_endpoint")]
    pub spapi_endpoint: String,

    #[serde(default = "default_marketplace_id")]
    pub spapi_marketplace_id: String,

    #[serde(default = "default_batch_size")]
    pub scan_batch_size: usize,

    /// Attempts per item, including the first call
    #[serde(default = "default_max_attempts")]
    pub scan_max_attempts: u32,

    #[serde(default = "default_batch_delay_secs")]
    pub scan_batch_delay_secs: u64,

    /// Minimum spacing between outbound SP-API calls
    #[serde(default = "default_min_interval_ms")]
    pub scan_min_interval_ms: u64,

    #[serde(default = "default_cooldown_secs")]
    pub scan_cooldown_secs: u64,

    /// Consecutive rate-limit responses that trigger the cooldown
    #[serde(default = "default_cooldown_threshold")]
    pub scan_cooldown_threshold: u32,

    #[serde(default = "default_progress_every")]
    pub scan_progress_every: usize,

    /// Trigger label recorded on jobs started by the scan binary
    #[serde(default = "default_scan_source")]
    pub scan_source: String,

    #[serde(default)]
    pub scan_filter: FilterType,

    pub scan_max_asins: Option<u32>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_spapi_endpoint() -> String {
    "https://sellingpartnerapi-eu.amazon.com".to_string()
}

fn default_marketplace_id() -> String {
    "A1F83G8C2ARO7P".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_batch_delay_secs() -> u64 {
    30
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_cooldown_threshold() -> u32 {
    3
}

fn default_progress_every() -> usize {
    10
}

fn default_scan_source() -> String {
    "scheduled".to_string()
}

/// Credentials required by the real SP-API client.
#[derive(Debug, Clone)]
pub struct SpApiCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub endpoint: String,
    pub marketplace_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("USE_REAL_API is set but {0} is missing")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.scan_batch_size == 0 {
            return Err(ConfigError::Invalid("SCAN_BATCH_SIZE must be at least 1".into()));
        }
        if self.scan_max_attempts == 0 {
            return Err(ConfigError::Invalid("SCAN_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.scan_progress_every == 0 {
            return Err(ConfigError::Invalid("SCAN_PROGRESS_EVERY must be at least 1".into()));
        }
        Ok(())
    }

    /// Orchestrator tuning derived from the scan options.
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            batch_size: self.scan_batch_size,
            max_attempts: self.scan_max_attempts,
            batch_delay: Duration::from_secs(self.scan_batch_delay_secs),
            min_interval: Duration::from_millis(self.scan_min_interval_ms),
            cooldown: Duration::from_secs(self.scan_cooldown_secs),
            cooldown_threshold: self.scan_cooldown_threshold,
            progress_every: self.scan_progress_every,
        }
    }

    /// Credentials for the real client, or an error naming the first missing one.
    pub fn spapi_credentials(&self) -> Result<SpApiCredentials, ConfigError> {
        let client_id = self
            .spapi_client_id
            .clone()
            .ok_or(ConfigError::MissingCredential("SPAPI_CLIENT_ID"))?;
        let client_secret = self
            .spapi_client_secret
            .clone()
            .ok_or(ConfigError::MissingCredential("SPAPI_CLIENT_SECRET"))?;
        let refresh_token = self
            .spapi_refresh_token
            .clone()
            .ok_or(ConfigError::MissingCredential("SPAPI_REFRESH_TOKEN"))?;

        Ok(SpApiCredentials {
            client_id,
            client_secret,
            refresh_token,
            endpoint: self.spapi_endpoint.trim_end_matches('/').to_string(),
            marketplace_id: self.spapi_marketplace_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, envy::Error> {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = from_pairs(&[("DATABASE_URL", "postgres://localhost/buybox")]).unwrap();

        assert!(!config.use_real_api);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.scan_filter, FilterType::Active);

        let settings = config.scan_settings();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.batch_delay, Duration::from_secs(30));
        assert_eq!(settings.cooldown, Duration::from_secs(60));
        assert_eq!(settings.cooldown_threshold, 3);
        assert_eq!(settings.progress_every, 10);
    }

    #[test]
    fn scan_options_are_read_from_environment() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/buybox"),
            ("SCAN_BATCH_SIZE", "25"),
            ("SCAN_BATCH_DELAY_SECS", "5"),
            ("SCAN_FILTER", "all"),
            ("SCAN_MAX_ASINS", "200"),
        ])
        .unwrap();

        assert_eq!(config.scan_settings().batch_size, 25);
        assert_eq!(config.scan_settings().batch_delay, Duration::from_secs(5));
        assert_eq!(config.scan_filter, FilterType::All);
        assert_eq!(config.scan_max_asins, Some(200));
    }

    #[test]
    fn missing_credentials_are_named() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/buybox"),
            ("USE_REAL_API", "true"),
            ("SPAPI_CLIENT_ID", "amzn1.application-oa2-client.x"),
        ])
        .unwrap();

        let err = config.spapi_credentials().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential("SPAPI_CLIENT_SECRET")
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/buybox"),
            ("SCAN_BATCH_SIZE", "0"),
        ])
        .unwrap();

        assert!(config.check().is_err());
    }
}
