//! Error types shared between the scheduler, the API clients and the senders.
//!
//! The `DailyError` enum unifies I/O, HTTP, parsing, remote API and SMTP
//! failures so that every outbound call can be classified by the retry layer
//! and reported by the report runner through a single type.
use std::fmt;
use std::io;

use thiserror::Error;

/// Unified error type shared by every crate of the workspace.
#[derive(Error, Debug)]
pub enum DailyError {
    /// I/O error originating from sockets or files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// The settings file is not valid TOML or does not match the settings model.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The settings parsed but failed validation.
    #[error("Invalid config: {0}")]
    Config(String),

    /// The price API answered with a status other than 200.
    #[error("price API returned status code: {status}")]
    PriceApi {
        /// HTTP status code.
        status: u16,
    },

    /// The chat API answered with a non-success status.
    #[error(transparent)]
    ChatApi(#[from] ChatApiError),

    /// The forward proxy refused or garbled the CONNECT handshake.
    #[error("proxy tunnel error: {0}")]
    Tunnel(String),

    /// The SMTP server answered with an unexpected reply code.
    #[error("SMTP error {code}: {message}")]
    Smtp {
        /// Three digit SMTP reply code.
        code: u16,
        /// Reply text as sent by the server.
        message: String,
    },

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Failure while building a mail message or in the mail transport.
    #[error("mail error: {0}")]
    Mail(String),

    /// Every allowed attempt failed; wraps the last failure.
    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure of the last attempt.
        source: Box<DailyError>,
    },

    /// A stop was requested while waiting to retry; wraps the last failure.
    #[error("stopped while retrying: {source}")]
    Cancelled {
        /// Failure of the last attempt.
        source: Box<DailyError>,
    },
}

impl DailyError {
    /// Strip `Exhausted` and `Cancelled` wrappers and return the underlying failure.
    pub fn root(&self) -> &DailyError {
        match self {
            DailyError::Exhausted { source, .. } | DailyError::Cancelled { source } => source.root(),
            other => other,
        }
    }
}

/// Non-success answer from the chat API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatApiError {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl ChatApiError {
    /// Invalid or expired bot token.
    pub fn is_auth(&self) -> bool {
        self.status == 401
    }

    /// The bot may not post to the destination channel.
    pub fn is_permission(&self) -> bool {
        self.status == 403
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            401 => write!(f, "chat authentication failed (401): bot token is invalid or expired"),
            403 => write!(
                f,
                "chat permission denied (403): bot may not post messages to this channel"
            ),
            404 => write!(f, "chat channel not found (404): check channel_id"),
            429 => write!(f, "chat API rate limited (429): retry later"),
            status => write!(f, "chat API error ({}): {}", status, self.body),
        }
    }
}

impl std::error::Error for ChatApiError {}
