//! Notification channels.
//!
//! Each channel renders its own artifact from the fetched quotes and delivers
//! it through its retry policy:
//! - `email` — HTML report over SMTP, directly or through the proxy tunnel.
//! - `chat` — embed posted to the chat API.
//! - `smtp` — the SMTP session used on the tunnelled email path.

pub mod chat;
pub mod email;
pub mod smtp;

use coin_common::AssetQuote;
use coin_common::Result;
use coin_common::config::ChannelKind;

/// A delivery target for the daily report.
pub trait Channel: Send + Sync {
    /// Which channel this is.
    fn kind(&self) -> ChannelKind;

    /// True iff every required setting of the channel is present.
    fn is_configured(&self) -> bool;

    /// Render and deliver the report. A channel that is not configured
    /// returns `Ok(())` without doing anything.
    fn send_report(&self, quotes: &[AssetQuote]) -> Result<()>;
}
