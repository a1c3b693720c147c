//! Market quote snapshot returned by the price API.
//!
//! An `AssetQuote` is produced fresh on every fetch and carries no identity
//! across report cycles. Field names follow the `/coins/markets` JSON payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Market data for a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    /// API identifier, e.g. `bitcoin`.
    pub id: String,
    /// Ticker symbol as reported by the API (usually lowercase).
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Current price in USD.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_price: f64,
    /// Absolute price change over the last 24 hours.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub price_change_24h: f64,
    /// Percentage price change over the last 24 hours.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub price_change_percentage_24h: f64,
    /// Market capitalization in USD.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub market_cap: f64,
    /// Traded volume over the last 24 hours in USD.
    #[serde(rename = "total_volume", default, deserialize_with = "null_as_zero")]
    pub volume_24h: f64,
    /// When the API last refreshed this asset.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl AssetQuote {
    /// Uppercase ticker symbol for display.
    pub fn display_symbol(&self) -> String {
        self.symbol.to_uppercase()
    }

    /// True when the price did not fall over the last 24 hours.
    pub fn is_advancing(&self) -> bool {
        self.price_change_percentage_24h >= 0.0
    }
}

// The markets endpoint reports `null` for assets it has no figure for yet.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}
