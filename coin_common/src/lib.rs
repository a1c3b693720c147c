//!
//! Common types and utilities shared by the CoinDaily crates.
//!
//! This crate aggregates:
//! - `error` — unified error type `DailyError` used across the workspace.
//! - `result` — handy `Result<T, DailyError>` alias.
//! - `quote` — the `AssetQuote` snapshot returned by the price API.
//! - `config` — settings file model and startup validation.
//! - `net` — API endpoints, the shared outbound transport and the proxy tunnel.
//! - `retry` — the fixed-attempt retrying call shared by every outbound client.
//! - `stop` — cooperative stop signal observed by the scheduler and retry waits.
#![warn(missing_docs)]
pub mod config;
pub mod error;
pub mod net;
pub mod quote;
pub mod result;
pub mod retry;
pub mod stop;

pub use error::DailyError;
pub use quote::AssetQuote;
pub use result::Result;
