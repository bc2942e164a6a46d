//! Amazon Selling-Partner API client for competitive pricing.
//!
//! Authenticates with a Login-with-Amazon refresh token and calls the
//! Product Pricing `getCompetitivePricing` operation one ASIN at a time.
//! HTTP status codes and per-ASIN statuses are mapped onto [`FetchError`].

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::SpApiCredentials;
use crate::models::buybox::{BuyBoxSnapshot, WorkItem};
use crate::services::pricing::{FetchError, PricingClient};

const LWA_TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";
/// Refresh the access token this long before Amazon expires it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Competitive price id Amazon uses for the New Buy Box offer.
const NEW_BUYBOX_PRICE_ID: &str = "1";

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client for the SP-API Product Pricing API.
pub struct SpApiClient {
    http: Client,
    credentials: SpApiCredentials,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct PricingResponse {
    #[serde(default)]
    payload: Vec<PriceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PriceEntry {
    #[serde(rename = "ASIN")]
    asin: Option<String>,
    #[serde(rename = "status")]
    status: String,
    product: Option<Product>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Product {
    competitive_pricing: Option<CompetitivePricing>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompetitivePricing {
    #[serde(default)]
    competitive_prices: Vec<CompetitivePrice>,
    #[serde(default)]
    number_of_offer_listings: Vec<OfferListingCount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompetitivePrice {
    competitive_price_id: String,
    price: PriceType,
    #[serde(rename = "belongsToRequester", default)]
    belongs_to_requester: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PriceType {
    landed_price: Option<Money>,
    listing_price: Option<Money>,
    shipping: Option<Money>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Money {
    currency_code: Option<String>,
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct OfferListingCount {
    #[serde(rename = "Count")]
    count: i32,
    condition: String,
}

#[derive(Deserialize)]
struct ErrorList {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Deserialize)]
struct ApiErrorEntry {
    code: String,
    #[serde(default)]
    message: String,
}

impl SpApiClient {
    pub fn new(credentials: SpApiCredentials) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("buybox-scanner/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Return a cached LWA access token, exchanging the refresh token when needed.
    async fn access_token(&self) -> Result<String, FetchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Refreshing Login-with-Amazon access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self.http.post(LWA_TOKEN_URL).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    FetchError::AccessDenied(format!("token exchange rejected: {body}"))
                }
                StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
                s if s.is_server_error() => FetchError::Transient(format!("token endpoint HTTP {s}")),
                s => FetchError::Other(format!("token endpoint HTTP {s}: {body}")),
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl PricingClient for SpApiClient {
    fn credential_id(&self) -> &str {
        &self.credentials.client_id
    }

    fn kind(&self) -> &'static str {
        "sp-api"
    }

    async fn fetch_item(&self, item: &WorkItem) -> Result<BuyBoxSnapshot, FetchError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/products/pricing/v0/competitivePrice",
            self.credentials.endpoint
        );

        let response = self
            .http
            .get(&url)
            .header("x-amz-access-token", token)
            .query(&[
                ("MarketplaceId", self.credentials.marketplace_id.as_str()),
                ("Asins", item.asin.as_str()),
                ("ItemType", "Asin"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body, &item.asin));
        }

        parse_competitive_pricing(&body, item, &self.credentials.marketplace_id)
    }
}

/// Map a non-2xx response onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str, asin: &str) -> FetchError {
    let detail = serde_json::from_str::<ErrorList>(body)
        .ok()
        .and_then(|list| list.errors.into_iter().next())
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::AccessDenied(detail),
        StatusCode::NOT_FOUND => FetchError::NotFound(asin.to_string()),
        s if s.is_server_error() => FetchError::Transient(detail),
        _ => FetchError::Other(detail),
    }
}

/// Extract the Buy Box snapshot for `item` from a `getCompetitivePricing` body.
fn parse_competitive_pricing(
    body: &str,
    item: &WorkItem,
    marketplace_id: &str,
) -> Result<BuyBoxSnapshot, FetchError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Other(format!("invalid pricing response: {e}")))?;
    let response: PricingResponse = serde_json::from_value(raw.clone())
        .map_err(|e| FetchError::Other(format!("unexpected pricing response shape: {e}")))?;

    let entry = response
        .payload
        .into_iter()
        .find(|e| e.asin.as_deref().map_or(true, |a| a == item.asin))
        .ok_or_else(|| FetchError::NotFound(item.asin.clone()))?;

    if entry.status != "Success" {
        return Err(FetchError::NotFound(format!(
            "{} ({})",
            item.asin, entry.status
        )));
    }

    let pricing = entry.product.and_then(|p| p.competitive_pricing);
    let buybox = pricing.as_ref().and_then(|p| {
        p.competitive_prices
            .iter()
            .find(|c| c.competitive_price_id == NEW_BUYBOX_PRICE_ID)
    });
    let offer_count = pricing.as_ref().and_then(|p| {
        p.number_of_offer_listings
            .iter()
            .find(|o| o.condition.eq_ignore_ascii_case("new"))
            .map(|o| o.count)
    });

    let amount = |m: Option<&Money>| m.and_then(|m| m.amount);
    let price = buybox.map(|b| &b.price);

    Ok(BuyBoxSnapshot {
        asin: item.asin.clone(),
        sku: item.sku.clone(),
        marketplace_id: marketplace_id.to_string(),
        buybox_price: amount(price.and_then(|p| p.landed_price.as_ref())),
        listing_price: amount(price.and_then(|p| p.listing_price.as_ref())),
        shipping_price: amount(price.and_then(|p| p.shipping.as_ref())),
        currency: price
            .and_then(|p| p.landed_price.as_ref().or(p.listing_price.as_ref()))
            .and_then(|m| m.currency_code.clone()),
        is_winner: buybox.is_some_and(|b| b.belongs_to_requester),
        offer_count,
        captured_at: Utc::now(),
        raw: Some(raw),
    })
}
