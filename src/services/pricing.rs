use async_trait::async_trait;

use crate::models::buybox::{BuyBoxSnapshot, WorkItem};

/// Source of competitive pricing for one item at a time.
///
/// Implementations classify every failure into a [`FetchError`]; the scanner
/// owns throttling and retries.
#[async_trait]
pub trait PricingClient: Send + Sync {
    /// Identity of the credential the calls are made with. Scans sharing a
    /// credential share one rate limiter.
    fn credential_id(&self) -> &str;

    /// Short label for the backend, reported by the health check.
    fn kind(&self) -> &'static str;

    async fn fetch_item(&self, item: &WorkItem) -> Result<BuyBoxSnapshot, FetchError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Rate limited by pricing API")]
    RateLimited,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("ASIN not found: {0}")]
    NotFound(String),

    /// Network failures, timeouts and 5xx responses.
    #[error("Transient pricing API failure: {0}")]
    Transient(String),

    #[error("Pricing API error: {0}")]
    Other(String),
}

impl FetchError {
    /// Code written to the failures audit table.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::RateLimited => "RATE_LIMITED",
            FetchError::AccessDenied(_) => "ACCESS_DENIED",
            FetchError::NotFound(_) => "NOT_FOUND",
            FetchError::Transient(_) => "TRANSIENT",
            FetchError::Other(_) => "API_ERROR",
        }
    }

    /// Retriable errors:
    /// - [`FetchError::RateLimited`]: the API asked us to back off.
    /// - [`FetchError::Transient`]: network-level or server-side failure.
    ///
    /// Everything else returns the same answer on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Transient(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchError::Transient(err.to_string())
        } else if err.is_decode() {
            FetchError::Other(format!("undecodable response: {err}"))
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_transient_failures_retry() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Transient("reset".into()).is_retryable());
        assert!(!FetchError::AccessDenied("Unauthorized".into()).is_retryable());
        assert!(!FetchError::NotFound("B000000000".into()).is_retryable());
        assert!(!FetchError::Other("bad payload".into()).is_retryable());
    }

    #[test]
    fn codes_match_audit_vocabulary() {
        assert_eq!(FetchError::RateLimited.code(), "RATE_LIMITED");
        assert_eq!(FetchError::AccessDenied(String::new()).code(), "ACCESS_DENIED");
        assert_eq!(FetchError::NotFound(String::new()).code(), "NOT_FOUND");
    }
}
