//! Chat channel: posts the report embed to `/channels/<id>/messages`.
//!
//! Authentication (401) and permission (403) failures are terminal. Every
//! other failure, including 404 and 429, goes through the normal retries.

use chrono::Local;
use coin_common::config::{ChannelKind, ChatSettings};
use coin_common::error::ChatApiError;
use coin_common::net::{DEFAULT_CHAT_API_BASE, Transport};
use coin_common::retry::{RetryPolicy, Verdict};
use coin_common::{AssetQuote, DailyError, Result};
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use super::Channel;
use crate::report::embed::{self, Embed};

#[derive(Serialize)]
struct MessageBody<'a> {
    embeds: &'a [Embed],
}

/// Classify a chat delivery failure.
pub fn classify(err: &DailyError) -> Verdict {
    match err {
        DailyError::ChatApi(api) if api.is_auth() || api.is_permission() => Verdict::Terminal,
        _ => Verdict::Retryable,
    }
}

/// Chat bot sender.
pub struct ChatSender {
    http: Client,
    base_url: String,
    bot_token: String,
    channel_id: String,
    retry: RetryPolicy,
}

impl ChatSender {
    /// Build a sender on the shared transport.
    pub fn new(transport: &Transport, settings: &ChatSettings, retry: RetryPolicy) -> Self {
        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_CHAT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        Self {
            http: transport.http().clone(),
            base_url,
            bot_token: settings.bot_token.trim().to_string(),
            channel_id: settings.channel_id.trim().to_string(),
            retry,
        }
    }

    /// Post `embed` as it is, retrying transient failures.
    pub fn send_embed(&self, embed: &Embed) -> Result<()> {
        if !self.is_configured() {
            return Err(DailyError::Config("chat channel is not configured".to_string()));
        }
        let url = format!("{}/channels/{}/messages", self.base_url, self.channel_id);
        let body = MessageBody {
            embeds: std::slice::from_ref(embed),
        };
        self.retry
            .run("chat message", |_| self.post_once(&url, &body), classify)
    }

    fn post_once(&self, url: &str, body: &MessageBody<'_>) -> Result<()> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bot {}", self.bot_token))
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(ChatApiError {
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

impl Channel for ChatSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }

    fn send_report(&self, quotes: &[AssetQuote]) -> Result<()> {
        if !self.is_configured() {
            return Ok(());
        }
        let embed = embed::truncate(embed::render(quotes, Local::now()));
        self.send_embed(&embed)?;
        info!("Report posted to chat channel {}", self.channel_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample;
    use crate::test_support::{RecordingPause, ScriptedServer};
    use coin_common::config::ProxySettings;
    use std::sync::Arc;

    fn sender(server: &ScriptedServer, pause: &Arc<RecordingPause>) -> ChatSender {
        sender_with(server, pause, "test-token", "123456789")
    }

    fn sender_with(
        server: &ScriptedServer,
        pause: &Arc<RecordingPause>,
        token: &str,
        channel: &str,
    ) -> ChatSender {
        let settings = ChatSettings {
            bot_token: token.to_string(),
            channel_id: channel.to_string(),
            base_url: Some(server.url()),
        };
        ChatSender::new(
            &Transport::direct().unwrap(),
            &settings,
            RetryPolicy::new(pause.clone()),
        )
    }

    #[test]
    fn posts_embed_with_bot_auth() {
        let server = ScriptedServer::start(vec![(200, r#"{"id":"1"}"#)]);
        let pause = Arc::new(RecordingPause::default());

        sender(&server, &pause).send_report(&sample()).unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/channels/123456789/messages");
        assert_eq!(request.header("authorization"), Some("Bot test-token"));
        assert_eq!(request.header("content-type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["embeds"].as_array().unwrap().len(), 1);
        assert_eq!(body["embeds"][0]["fields"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn posts_through_the_configured_proxy() {
        let proxy = ScriptedServer::start(vec![(200, "{}")]);
        let transport = Transport::from_settings(&ProxySettings {
            enabled: true,
            url: proxy.url(),
        })
        .unwrap();
        let settings = ChatSettings {
            bot_token: "test-token".to_string(),
            channel_id: "123456789".to_string(),
            base_url: Some("http://chat.invalid/api/v10".to_string()),
        };
        let sender = ChatSender::new(
            &transport,
            &settings,
            RetryPolicy::new(Arc::new(RecordingPause::default())),
        );

        sender.send_report(&sample()).unwrap();

        let requests = proxy.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].path,
            "http://chat.invalid/api/v10/channels/123456789/messages"
        );
        assert_eq!(requests[0].header("authorization"), Some("Bot test-token"));
    }

    #[test]
    fn accepts_created() {
        let server = ScriptedServer::start(vec![(201, "{}")]);
        let pause = Arc::new(RecordingPause::default());

        assert!(sender(&server, &pause).send_report(&sample()).is_ok());
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn unauthorized_fails_without_retry() {
        let server = ScriptedServer::start(vec![(401, r#"{"message":"401: Unauthorized"}"#)]);
        let pause = Arc::new(RecordingPause::default());

        let err = sender(&server, &pause).send_report(&sample()).unwrap_err();

        assert_eq!(server.hits(), 1);
        assert!(pause.waits().is_empty());
        assert!(matches!(err, DailyError::ChatApi(ChatApiError { status: 401, .. })));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn forbidden_fails_without_retry() {
        let server = ScriptedServer::start(vec![(403, r#"{"message":"Missing Permissions"}"#)]);
        let pause = Arc::new(RecordingPause::default());

        let err = sender(&server, &pause).send_report(&sample()).unwrap_err();

        assert_eq!(server.hits(), 1);
        assert!(matches!(err, DailyError::ChatApi(ChatApiError { status: 403, .. })));
    }

    #[test]
    fn server_errors_are_retried_until_success() {
        let server = ScriptedServer::start(vec![(500, "oops"), (500, "oops"), (200, "{}")]);
        let pause = Arc::new(RecordingPause::default());

        sender(&server, &pause).send_report(&sample()).unwrap();

        assert_eq!(server.hits(), 3);
        assert_eq!(pause.waits().len(), 2);
    }

    #[test]
    fn not_found_and_rate_limit_are_retried() {
        let server = ScriptedServer::start(vec![(404, "{}"), (429, "{}"), (404, "{}")]);
        let pause = Arc::new(RecordingPause::default());

        let err = sender(&server, &pause).send_report(&sample()).unwrap_err();

        assert_eq!(server.hits(), 3);
        match err {
            DailyError::Exhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unconfigured_sender_is_a_silent_no_op() {
        let server = ScriptedServer::start(vec![(500, "")]);
        let pause = Arc::new(RecordingPause::default());
        let sender = sender_with(&server, &pause, "", "123456789");

        assert!(!sender.is_configured());
        assert!(sender.send_report(&sample()).is_ok());
        assert_eq!(server.hits(), 0);
        assert!(sender.send_embed(&embed::render(&sample(), Local::now())).is_err());
    }

    #[test]
    fn classification_only_stops_on_auth_and_permission() {
        let api = |status| DailyError::ChatApi(ChatApiError {
            status,
            body: String::new(),
        });
        assert_eq!(classify(&api(401)), Verdict::Terminal);
        assert_eq!(classify(&api(403)), Verdict::Terminal);
        assert_eq!(classify(&api(404)), Verdict::Retryable);
        assert_eq!(classify(&api(429)), Verdict::Retryable);
        assert_eq!(classify(&api(500)), Verdict::Retryable);
        assert_eq!(classify(&DailyError::Tunnel("x".into())), Verdict::Retryable);
    }
}
