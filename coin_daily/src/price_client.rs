//! Market data client for the `/coins/markets` endpoint.

use coin_common::config::PriceApiSettings;
use coin_common::net::{DEFAULT_PRICE_API_BASE, Transport};
use coin_common::retry::{RetryPolicy, retry_all};
use coin_common::{AssetQuote, DailyError, Result};
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;

const API_KEY_HEADER: &str = "x-cg-demo-api-key";
const QUOTE_CURRENCY: &str = "usd";
const PAGE_SIZE: &str = "100";

/// Source of market quotes for a list of asset ids.
pub trait PriceSource: Send + Sync {
    /// Fetch the current quotes for `ids`, ordered by market cap.
    fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<AssetQuote>>;
}

/// Blocking HTTP client for the price API. Every failure is retried.
pub struct PriceClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl PriceClient {
    /// Build a client on the shared transport.
    pub fn new(transport: &Transport, settings: &PriceApiSettings, retry: RetryPolicy) -> Self {
        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_PRICE_API_BASE)
            .trim_end_matches('/')
            .to_string();
        Self {
            http: transport.http().clone(),
            base_url,
            api_key: settings.api_key.trim().to_string(),
            retry,
        }
    }

    fn fetch_once(&self, ids: &str) -> Result<Vec<AssetQuote>> {
        let url = format!("{}/coins/markets", self.base_url);
        debug!("GET {} ids={}", url, ids);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[
                ("vs_currency", QUOTE_CURRENCY),
                ("ids", ids),
                ("order", "market_cap_desc"),
                ("per_page", PAGE_SIZE),
                ("page", "1"),
                ("sparkline", "false"),
            ])
            .send()?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DailyError::PriceApi {
                status: status.as_u16(),
            });
        }
        let body = response.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl PriceSource for PriceClient {
    fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<AssetQuote>> {
        let joined = ids.join(",");
        let quotes = self
            .retry
            .run("price fetch", |_| self.fetch_once(&joined), retry_all)?;
        info!("Fetched {} quotes", quotes.len());
        Ok(quotes)
    }
}
