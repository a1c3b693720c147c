//! Settings file model and startup validation.
//!
//! Settings are read once from a TOML file and treated as immutable for the
//! life of the process. Validation runs before anything is scheduled:
//!
//! - a channel is enabled if and only if all of its required fields are set;
//! - a channel with only some of its required fields set is an error, not a
//!   disabled channel;
//! - at least one channel must be enabled.

use std::fs;
use std::path::Path;

use chrono::Timelike;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display};

use crate::error::DailyError;
use crate::net::ProxyEndpoint;
use crate::result::Result;

/// Notification channel kinds, in delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelKind {
    /// SMTP email.
    Email,
    /// Chat bot message (Discord-style embed).
    Chat,
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Asset identifiers to track, in request order.
    #[serde(default)]
    pub coins: Vec<String>,
    /// Price API credentials.
    #[serde(default)]
    pub price_api: PriceApiSettings,
    /// Email channel; leave the section out to disable it.
    #[serde(default)]
    pub email: EmailSettings,
    /// Chat channel; leave the section out to disable it.
    #[serde(default)]
    pub chat: ChatSettings,
    /// Optional forward proxy for every outbound connection.
    #[serde(default)]
    pub proxy: ProxySettings,
    /// Daily send time.
    pub schedule: ScheduleSpec,
}

/// Price API credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceApiSettings {
    /// Demo API key sent as `x-cg-demo-api-key`.
    #[serde(default)]
    pub api_key: String,
    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// SMTP channel parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailSettings {
    /// SMTP server host name.
    #[serde(default)]
    pub smtp_server: String,
    /// SMTP server port.
    #[serde(default)]
    pub smtp_port: u16,
    /// Login, also used as the sender address.
    #[serde(default)]
    pub username: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Recipient addresses.
    #[serde(default)]
    pub to: Vec<String>,
}

impl EmailSettings {
    /// True iff every required field is set.
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the required fields that are not set.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.smtp_server.trim().is_empty() {
            missing.push("smtp_server");
        }
        if self.smtp_port == 0 {
            missing.push("smtp_port");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.to.iter().all(|addr| addr.trim().is_empty()) {
            missing.push("to");
        }
        missing
    }

    fn is_touched(&self) -> bool {
        self.missing_fields().len() < 5
    }
}

/// Chat channel parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatSettings {
    /// Bot token sent as `Authorization: Bot <token>`.
    #[serde(default)]
    pub bot_token: String,
    /// Destination channel id.
    #[serde(default)]
    pub channel_id: String,
    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ChatSettings {
    /// True iff both the token and the channel id are set.
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the required fields that are not set.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bot_token.trim().is_empty() {
            missing.push("bot_token");
        }
        if self.channel_id.trim().is_empty() {
            missing.push("channel_id");
        }
        missing
    }

    fn is_touched(&self) -> bool {
        self.missing_fields().len() < 2
    }
}

/// Forward proxy settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    /// Route outbound connections through `url`.
    #[serde(default)]
    pub enabled: bool,
    /// Proxy URL, `http://host[:port]`.
    #[serde(default)]
    pub url: String,
}

impl ProxySettings {
    /// The proxy URL when the proxy is enabled and set.
    pub fn active(&self) -> Option<&str> {
        let url = self.url.trim();
        (self.enabled && !url.is_empty()).then_some(url)
    }
}

/// Local time of day at which the daily report fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScheduleSpec {
    /// Hour, 0–23.
    pub hour: u32,
    /// Minute, 0–59.
    pub minute: u32,
}

impl ScheduleSpec {
    /// True when `time` falls inside the scheduled minute.
    pub fn matches<T: Timelike>(&self, time: &T) -> bool {
        time.hour() == self.hour && time.minute() == self.minute
    }
}

impl Settings {
    /// Read, parse and validate the settings file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            DailyError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every startup rule; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.price_api.api_key.trim().is_empty() {
            return Err(invalid("price_api.api_key is required"));
        }
        if self.coins.iter().all(|id| id.trim().is_empty()) {
            return Err(invalid("at least one coin must be specified"));
        }
        if self.schedule.hour > 23 {
            return Err(invalid("schedule.hour must be between 0 and 23"));
        }
        if self.schedule.minute > 59 {
            return Err(invalid("schedule.minute must be between 0 and 59"));
        }
        if self.email.is_touched() && !self.email.is_configured() {
            return Err(invalid(&format!(
                "email is partially configured, missing: {}",
                self.email.missing_fields().join(", ")
            )));
        }
        if self.chat.is_touched() && !self.chat.is_configured() {
            return Err(invalid(&format!(
                "chat is partially configured, missing: {}",
                self.chat.missing_fields().join(", ")
            )));
        }
        if self.enabled_channels().is_empty() {
            return Err(invalid(
                "at least one notification channel (email or chat) must be configured",
            ));
        }
        if self.proxy.enabled {
            let url = self
                .proxy
                .active()
                .ok_or_else(|| invalid("proxy.url is required when proxy.enabled is true"))?;
            ProxyEndpoint::parse(url)?;
        }
        Ok(())
    }

    /// Channels whose required fields are all present, in delivery order.
    pub fn enabled_channels(&self) -> Vec<ChannelKind> {
        let mut channels = Vec::new();
        if self.email.is_configured() {
            channels.push(ChannelKind::Email);
        }
        if self.chat.is_configured() {
            channels.push(ChannelKind::Chat);
        }
        channels
    }

    /// Tracked coin ids with blanks removed.
    pub fn coin_ids(&self) -> Vec<String> {
        self.coins
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    }
}

fn invalid(message: &str) -> DailyError {
    DailyError::Config(message.to_string())
}
