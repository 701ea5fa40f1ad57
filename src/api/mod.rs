//! Marketplace API clients.
//!
//! Two concerns, two clients:
//! - `MarketClient` reads competitor offers for a product (read-only)
//! - `PushClient` publishes an accepted price back to the marketplace,
//!   with exponential-backoff retry on transient failures

use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{CompetitorQuote, MarketSnapshot};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PUSH_MAX_ELAPSED: Duration = Duration::from_secs(60);

/// Competitor offer as the marketplace reports it.
#[derive(Debug, Clone, Deserialize)]
struct CompetitorOffer {
    price: f64,
    #[serde(default)]
    discounted_price: Option<f64>,
    #[serde(default = "default_in_stock")]
    in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CompetitorsResponse {
    #[serde(default)]
    competitors: Vec<CompetitorOffer>,
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap_or(Decimal::ZERO)
}

/// Client for competitor price data (read-only operations).
pub struct MarketClient {
    client: Client,
    base_url: String,
}

impl MarketClient {
    /// Create a client against the given API base URL.
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Create from environment variables:
    /// - MARKETPLACE_API_URL
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("MARKETPLACE_API_URL").context("MARKETPLACE_API_URL not set")?;
        Self::new(base_url)
    }

    /// Fetch the current competitor landscape for a product.
    ///
    /// An empty competitor list is a valid answer (no market data), not an
    /// error; network and HTTP failures propagate.
    pub async fn fetch_snapshot(&self, external_id: &str) -> Result<MarketSnapshot> {
        let url = format!("{}/v1/products/{}/competitors", self.base_url, external_id);

        debug!(url = %url, "Fetching competitor prices");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch competitor prices")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Competitor request failed: {} - {}", status, body);
        }

        let parsed: CompetitorsResponse = response
            .json()
            .await
            .context("Failed to parse competitor response")?;

        let quotes = parsed
            .competitors
            .into_iter()
            .map(|offer| CompetitorQuote {
                price: to_decimal(offer.price),
                discounted_price: to_decimal(offer.discounted_price.unwrap_or(offer.price)),
                in_stock: offer.in_stock,
            })
            .collect();

        Ok(MarketSnapshot::from_competitors(quotes))
    }
}

/// Client for publishing prices to the marketplace (write operations).
pub struct PushClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PushClient {
    /// Create a client against the given API base URL.
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create from environment variables:
    /// - MARKETPLACE_API_URL
    /// - MARKETPLACE_API_KEY
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("MARKETPLACE_API_URL").context("MARKETPLACE_API_URL not set")?;
        let api_key =
            std::env::var("MARKETPLACE_API_KEY").context("MARKETPLACE_API_KEY not set")?;
        Self::new(base_url, api_key)
    }

    /// Publish a price for a product.
    ///
    /// Retries with exponential backoff on network errors and server-side
    /// failures; client errors (4xx) fail immediately.
    pub async fn push_price(&self, external_id: &str, price: Decimal) -> Result<()> {
        let url = format!("{}/v1/products/{}/price", self.base_url, external_id);
        let body = serde_json::json!({
            "price": price.to_f64().unwrap_or(0.0),
        });

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(PUSH_MAX_ELAPSED),
            ..Default::default()
        };

        backoff::future::retry(backoff, || async {
            let response = self
                .client
                .put(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow::Error::from(e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let text = response.text().await.unwrap_or_default();
            let err = anyhow::anyhow!("Price push failed: {} - {}", status, text);

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                warn!(product = %external_id, status = %status, "Transient push failure, retrying");
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            }
        })
        .await
        .with_context(|| format!("Failed to push price for product {}", external_id))?;

        debug!(product = %external_id, price = %price, "Price published");
        Ok(())
    }
}
