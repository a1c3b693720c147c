//! One report cycle: fetch quotes once, fan the report out to every channel,
//! and reduce the per-channel results into a cycle status.
//!
//! Nothing that goes wrong inside a cycle escapes it. Fetch failures and
//! channel failures end up in the returned [`RunOutcome`] and in the log.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;

use coin_common::AssetQuote;
use coin_common::config::ChannelKind;
use log::{Level, error, info, log, warn};

use crate::channel::Channel;
use crate::price_client::PriceSource;

/// Result of one channel's delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Not configured, nothing was attempted.
    Skipped,
    /// Delivered.
    Succeeded,
    /// Delivery failed; the rendered error.
    Failed(String),
}

/// Delivery result for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    /// Which channel.
    pub kind: ChannelKind,
    /// What happened to it.
    pub outcome: ChannelOutcome,
}

impl ChannelReport {
    /// True unless the channel was skipped.
    pub fn attempted(&self) -> bool {
        self.outcome != ChannelOutcome::Skipped
    }

    /// True when the report was delivered.
    pub fn succeeded(&self) -> bool {
        self.outcome == ChannelOutcome::Succeeded
    }

    /// The delivery error, if the channel failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ChannelOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Combined status of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// The fetch failed or returned nothing; no channel was attempted.
    NoQuotes,
    /// Quotes were fetched but no channel was configured.
    NoChannelConfigured,
    /// Every attempted channel delivered.
    AllSucceeded,
    /// Some channels delivered, others failed.
    Partial {
        /// Channels that delivered.
        succeeded: Vec<ChannelKind>,
        /// Channels that failed.
        failed: Vec<ChannelKind>,
    },
    /// Every attempted channel failed.
    AllFailed,
}

impl CycleStatus {
    /// Level the cycle summary is logged at. Only a cycle where every
    /// attempted channel failed counts as an error.
    pub fn log_level(&self) -> Level {
        match self {
            CycleStatus::AllSucceeded => Level::Info,
            CycleStatus::AllFailed => Level::Error,
            CycleStatus::NoQuotes
            | CycleStatus::NoChannelConfigured
            | CycleStatus::Partial { .. } => Level::Warn,
        }
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::NoQuotes => write!(f, "no quotes, nothing sent"),
            CycleStatus::NoChannelConfigured => write!(f, "no channel configured"),
            CycleStatus::AllSucceeded => write!(f, "all channels succeeded"),
            CycleStatus::Partial { succeeded, failed } => write!(
                f,
                "partial success (succeeded: {}; failed: {})",
                join_kinds(succeeded),
                join_kinds(failed)
            ),
            CycleStatus::AllFailed => write!(f, "all channels failed"),
        }
    }
}

fn join_kinds(kinds: &[ChannelKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// What one cycle did. Reported and then dropped.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Quotes fetched for this cycle; empty on a no-op cycle.
    pub quotes: Vec<AssetQuote>,
    /// One entry per channel, in configuration order.
    pub channels: Vec<ChannelReport>,
    /// Combined status.
    pub status: CycleStatus,
}

impl RunOutcome {
    fn no_quotes() -> Self {
        Self {
            quotes: Vec::new(),
            channels: Vec::new(),
            status: CycleStatus::NoQuotes,
        }
    }

    /// Report of the channel of the given kind, if it took part.
    #[cfg(test)]
    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelReport> {
        self.channels.iter().find(|report| report.kind == kind)
    }
}

/// Reduce per-channel reports into the cycle status.
pub fn summarize(reports: &[ChannelReport]) -> CycleStatus {
    let attempted: Vec<&ChannelReport> = reports.iter().filter(|r| r.attempted()).collect();
    if attempted.is_empty() {
        return CycleStatus::NoChannelConfigured;
    }
    let (ok, failed): (Vec<&ChannelReport>, Vec<&ChannelReport>) =
        attempted.into_iter().partition(|r| r.succeeded());
    match (ok.is_empty(), failed.is_empty()) {
        (_, true) => CycleStatus::AllSucceeded,
        (true, false) => CycleStatus::AllFailed,
        (false, false) => CycleStatus::Partial {
            succeeded: ok.iter().map(|r| r.kind).collect(),
            failed: failed.iter().map(|r| r.kind).collect(),
        },
    }
}

/// Runs report cycles against a fixed price source and channel set.
pub struct ReportRunner {
    prices: Arc<dyn PriceSource>,
    channels: Vec<Arc<dyn Channel>>,
    coins: Vec<String>,
}

impl ReportRunner {
    /// Runner over `prices` and `channels` for the asset ids in `coins`.
    pub fn new(prices: Arc<dyn PriceSource>, channels: Vec<Arc<dyn Channel>>, coins: Vec<String>) -> Self {
        Self {
            prices,
            channels,
            coins,
        }
    }

    /// Run one cycle. Never fails: every problem is part of the outcome.
    pub fn run_cycle(&self) -> RunOutcome {
        info!("Starting report cycle for {} assets", self.coins.len());
        let quotes = match self.prices.fetch_quotes(&self.coins) {
            Ok(quotes) => quotes,
            Err(e) => {
                error!("Price fetch failed, skipping this cycle: {}", e);
                return RunOutcome::no_quotes();
            }
        };
        if quotes.is_empty() {
            warn!("Price API returned no quotes, skipping this cycle");
            return RunOutcome::no_quotes();
        }

        let channels = self.deliver(&quotes);
        let status = summarize(&channels);
        log!(status.log_level(), "Report cycle finished: {}", status);
        RunOutcome {
            quotes,
            channels,
            status,
        }
    }

    fn deliver(&self, quotes: &[AssetQuote]) -> Vec<ChannelReport> {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .channels
                .iter()
                .map(|channel| {
                    let handle = channel
                        .is_configured()
                        .then(|| scope.spawn(move || channel.send_report(quotes)));
                    (channel.kind(), handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    let outcome = match handle.map(|h| h.join()) {
                        None => ChannelOutcome::Skipped,
                        Some(Ok(Ok(()))) => ChannelOutcome::Succeeded,
                        Some(Ok(Err(e))) => {
                            error!("{} delivery failed: {}", kind, e);
                            ChannelOutcome::Failed(e.to_string())
                        }
                        Some(Err(panic)) => {
                            let reason = panic_message(panic.as_ref());
                            error!("{} sender panicked: {}", kind, reason);
                            ChannelOutcome::Failed(format!("sender panicked: {}", reason))
                        }
                    };
                    ChannelReport { kind, outcome }
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
