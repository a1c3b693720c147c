//! Email channel: mails the HTML report.
//!
//! Without a proxy the message goes through `lettre`'s SMTP transport, which
//! negotiates TLS on its own (STARTTLS, or implicit TLS on port 465). With a
//! proxy the TCP connection is tunnelled with HTTP CONNECT and the session is
//! driven by hand; STARTTLS is mandatory there.
//!
//! Proxy CONNECT failures and rejected credentials (535) are terminal; every
//! other failure is retried.

use std::net::TcpStream;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use coin_common::config::{ChannelKind, EmailSettings};
use coin_common::net::{HTTP_TIMEOUT, Transport};
use coin_common::retry::{RetryPolicy, Verdict};
use coin_common::{AssetQuote, DailyError, Result};
use lettre::Transport as _;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport};
use log::info;

use super::Channel;
use super::smtp::{self, EHLO_DOMAIN, SmtpSession};
use crate::report::{REPORT_TITLE, html};

/// I/O deadline for each step of the tunnelled session.
pub const SESSION_DEADLINE: Duration = Duration::from_secs(120);

const IMPLICIT_TLS_PORT: u16 = 465;
const AUTH_REJECTED: u16 = 535;

/// Classify an email delivery failure.
pub fn classify(err: &DailyError) -> Verdict {
    match err {
        DailyError::Tunnel(_) => Verdict::Terminal,
        DailyError::Smtp { code, .. } if *code == AUTH_REJECTED => Verdict::Terminal,
        _ => Verdict::Retryable,
    }
}

/// Subject line of the report mailed on `date`.
pub fn subject_for(date: NaiveDate) -> String {
    format!("{} - {}", REPORT_TITLE, date.format("%Y-%m-%d"))
}

/// SMTP sender.
pub struct EmailSender {
    settings: EmailSettings,
    transport: Transport,
    retry: RetryPolicy,
}

impl EmailSender {
    /// Build a sender on the shared transport.
    pub fn new(transport: Transport, settings: EmailSettings, retry: RetryPolicy) -> Self {
        Self {
            settings,
            transport,
            retry,
        }
    }

    /// Mail `html` to every recipient, retrying transient failures.
    pub fn send(&self, subject: &str, html: &str) -> Result<()> {
        if !self.is_configured() {
            return Err(DailyError::Config("email channel is not configured".to_string()));
        }
        let message = self.build_message(subject, html)?;
        self.retry.run("email", |_| self.deliver(&message), classify)
    }

    /// MIME message with From, To, Subject, Content-Type and Date headers.
    pub fn build_message(&self, subject: &str, html: &str) -> Result<Message> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.settings.username)?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .date_now();
        for recipient in self.recipients() {
            builder = builder.to(parse_mailbox(&recipient)?);
        }
        builder
            .body(html.to_string())
            .map_err(|e| DailyError::Mail(e.to_string()))
    }

    fn recipients(&self) -> Vec<String> {
        self.settings
            .to
            .iter()
            .map(|addr| addr.trim())
            .filter(|addr| !addr.is_empty())
            .map(String::from)
            .collect()
    }

    fn deliver(&self, message: &Message) -> Result<()> {
        match self.transport.proxy() {
            Some(_) => self.send_tunnelled(message),
            None => self.send_direct(message),
        }
    }

    fn send_direct(&self, message: &Message) -> Result<()> {
        let server = self.settings.smtp_server.trim();
        let builder = if self.settings.smtp_port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(server)
        } else {
            SmtpTransport::starttls_relay(server)
        }
        .map_err(smtp_error)?;
        let mailer = builder
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.username.trim().to_string(),
                self.settings.password.clone(),
            ))
            .timeout(Some(HTTP_TIMEOUT))
            .build();
        mailer.send(message).map_err(smtp_error)?;
        Ok(())
    }

    fn send_tunnelled(&self, message: &Message) -> Result<()> {
        let server = self.settings.smtp_server.trim();
        let stream = self.transport.connect(server, self.settings.smtp_port)?;
        stream.set_read_timeout(Some(SESSION_DEADLINE))?;
        stream.set_write_timeout(Some(SESSION_DEADLINE))?;

        let mut session = SmtpSession::<TcpStream>::new(stream);
        session.greeting()?;
        session.ehlo(EHLO_DOMAIN)?;
        session.starttls()?;

        let mut session = SmtpSession::new(smtp::start_tls(session.into_inner(), server)?);
        session.ehlo(EHLO_DOMAIN)?;
        smtp::transact(
            &mut session,
            self.settings.username.trim(),
            &self.settings.password,
            self.settings.username.trim(),
            &self.recipients(),
            &message.formatted(),
        )
    }
}

impl Channel for EmailSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    fn send_report(&self, quotes: &[AssetQuote]) -> Result<()> {
        if !self.is_configured() {
            return Ok(());
        }
        let today = Local::now().date_naive();
        self.send(&subject_for(today), &html::render(quotes, today))?;
        info!("Report mailed to {}", self.recipients().join(", "));
        Ok(())
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.trim()
        .parse()
        .map_err(|e| DailyError::Mail(format!("invalid address {:?}: {}", addr, e)))
}

fn smtp_error(err: lettre::transport::smtp::Error) -> DailyError {
    match err.status().and_then(|code| code.to_string().parse::<u16>().ok()) {
        Some(code) => DailyError::Smtp {
            code,
            message: err.to_string(),
        },
        None => DailyError::Mail(err.to_string()),
    }
}
