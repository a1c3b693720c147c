//! CoinDaily: a daily crypto price report service.
//!
//! The binary fetches market quotes for the configured coins once a day and
//! delivers the report to every configured notification channel. It wires
//! together a few building blocks:
//!
//! - `PriceClient` — fetches quotes from the `/coins/markets` endpoint.
//! - `EmailSender` / `ChatSender` — render and deliver the report (HTML mail
//!   over SMTP, embed over the chat API).
//! - `ReportRunner` — one cycle: fetch once, fan out to the channels on
//!   scoped threads, reduce the results into a cycle status.
//! - `Scheduler` — runs a cycle at startup, then once a day at the configured
//!   local time, until SIGINT or SIGTERM.
//!
//! Every outbound call shares one `Transport` (optionally proxied) and the
//! same `RetryPolicy`: three attempts, ten seconds apart, with a
//! per-channel rule for which failures are terminal. Retry waits observe the
//! same stop signal as the scheduler, so a shutdown signal cuts them short.
//!
//! Usage example (CLI):
//! ```bash
//! coin_daily --config ./config.toml          # run daily
//! coin_daily --config ./config.toml --once   # one cycle, then exit
//! ```
#![warn(missing_docs)]
mod args;
mod channel;
mod price_client;
mod report;
mod runner;
mod scheduler;
#[cfg(test)]
mod test_support;

use crate::args::Args;
use crate::channel::Channel;
use crate::channel::chat::ChatSender;
use crate::channel::email::EmailSender;
use crate::price_client::PriceClient;
use crate::runner::ReportRunner;
use crate::scheduler::Scheduler;
use clap::Parser;
use coin_common::config::{ChannelKind, Settings};
use coin_common::net::Transport;
use coin_common::retry::RetryPolicy;
use coin_common::stop::StopSignal;
use coin_common::{DailyError, Result};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

fn main() -> ExitCode {
    init_logger();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let settings = Settings::load(&args.config)?;
    let coins = settings.coin_ids();
    info!("Loaded settings from {}", args.config.display());
    info!("Tracking {} coins: {}", coins.len(), coins.join(", "));
    info!(
        "Daily report scheduled at {:02}:{:02}",
        settings.schedule.hour, settings.schedule.minute
    );
    let enabled = settings.enabled_channels();
    for kind in [ChannelKind::Email, ChannelKind::Chat] {
        let status = if enabled.contains(&kind) { "enabled" } else { "disabled" };
        info!("Channel {}: {}", kind, status);
    }

    let transport = Transport::from_settings(&settings.proxy)?;

    let stop = Arc::new(StopSignal::new());
    let retry = RetryPolicy::new(Arc::new(stop.token()));

    let prices = Arc::new(PriceClient::new(&transport, &settings.price_api, retry.clone()));
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    for kind in enabled {
        match kind {
            ChannelKind::Email => channels.push(Arc::new(EmailSender::new(
                transport.clone(),
                settings.email.clone(),
                retry.clone(),
            ))),
            ChannelKind::Chat => channels.push(Arc::new(ChatSender::new(
                &transport,
                &settings.chat,
                retry.clone(),
            ))),
        }
    }

    let runner = Arc::new(ReportRunner::new(prices, channels, coins));
    let scheduler = Arc::new(Scheduler::new(settings.schedule, runner, stop));

    if args.once {
        scheduler.run_once();
        return Ok(());
    }

    ctrlc::set_handler(shutdown_handler(scheduler.clone()))
        .map_err(|e| DailyError::Io(std::io::Error::other(e)))?;

    let worker = {
        let scheduler = scheduler.clone();
        thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || scheduler.start())?
    };
    if worker.join().is_err() {
        error!("Scheduler thread panicked");
    }
    info!("CoinDaily stopped (scheduler {:?})", scheduler.state());
    Ok(())
}

/// Handler for SIGINT and SIGTERM: stop the scheduler after the current cycle.
fn shutdown_handler(scheduler: Arc<Scheduler>) -> impl Fn() + Send + 'static {
    move || {
        info!("Shutdown signal received. Stopping scheduler...");
        scheduler.stop();
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
