//! Minimal SMTP client session for the tunnelled email path.
//!
//! The session is generic over the stream so the same code runs on the raw
//! tunnel (greeting, EHLO, STARTTLS) and on the TLS stream that replaces it
//! (EHLO, AUTH PLAIN, MAIL FROM, RCPT TO, DATA, QUIT). Replies are read byte
//! by byte: nothing may be buffered past the STARTTLS reply when the stream
//! is handed over to TLS.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use coin_common::{DailyError, Result};
use log::debug;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

/// Domain announced in EHLO.
pub const EHLO_DOMAIN: &str = "localhost";

const MAX_LINE: usize = 4096;

/// Parsed SMTP reply, possibly multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code.
    pub code: u16,
    /// Text of each reply line, code stripped.
    pub lines: Vec<String>,
}

impl Reply {
    /// All reply lines joined by spaces.
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// SMTP client session over any byte stream.
pub struct SmtpSession<S> {
    stream: S,
}

impl<S: Read + Write> SmtpSession<S> {
    /// Session over a connected stream; nothing is sent yet.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Give the stream back, e.g. to wrap it in TLS after STARTTLS.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Wait for the 220 service greeting.
    pub fn greeting(&mut self) -> Result<Reply> {
        self.expect(&[220])
    }

    /// Send EHLO and expect 250.
    pub fn ehlo(&mut self, domain: &str) -> Result<Reply> {
        self.command(&format!("EHLO {}", domain), &[250])
    }

    /// Request STARTTLS and expect 220. The caller then wraps the stream.
    pub fn starttls(&mut self) -> Result<()> {
        self.command("STARTTLS", &[220]).map(drop)
    }

    /// Authenticate with AUTH PLAIN and expect 235.
    pub fn auth_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let token = STANDARD.encode(format!("\0{}\0{}", username, password));
        debug!("SMTP > AUTH PLAIN ****");
        self.send_line(&format!("AUTH PLAIN {}", token))?;
        self.expect(&[235]).map(drop)
    }

    /// Set the envelope sender.
    pub fn mail_from(&mut self, from: &str) -> Result<()> {
        self.command(&format!("MAIL FROM:<{}>", from), &[250]).map(drop)
    }

    /// Add an envelope recipient.
    pub fn rcpt_to(&mut self, to: &str) -> Result<()> {
        self.command(&format!("RCPT TO:<{}>", to), &[250, 251]).map(drop)
    }

    /// Send `message` (CRLF line endings) as the mail body.
    pub fn data(&mut self, message: &[u8]) -> Result<()> {
        self.command("DATA", &[354])?;
        self.stream.write_all(&dot_stuff(message))?;
        if !message.ends_with(b"\r\n") {
            self.stream.write_all(b"\r\n")?;
        }
        self.stream.write_all(b".\r\n")?;
        self.stream.flush()?;
        self.expect(&[250]).map(drop)
    }

    /// End the session and expect 221.
    pub fn quit(&mut self) -> Result<()> {
        self.command("QUIT", &[221]).map(drop)
    }

    /// Send one command line and check the reply code.
    pub fn command(&mut self, line: &str, accepted: &[u16]) -> Result<Reply> {
        debug!("SMTP > {}", line);
        self.send_line(line)?;
        self.expect(accepted)
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\r\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn expect(&mut self, accepted: &[u16]) -> Result<Reply> {
        let reply = self.read_reply()?;
        debug!("SMTP < {} {}", reply.code, reply.text());
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(DailyError::Smtp {
                code: reply.code,
                message: reply.text(),
            })
        }
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let code = line
                .get(..3)
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| DailyError::Smtp {
                    code: 0,
                    message: format!("malformed reply: {:?}", line),
                })?;
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok(Reply { code, lines });
            }
        }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::with_capacity(64);
        let mut byte = [0u8; 1];
        while !line.ends_with(b"\n") {
            if line.len() >= MAX_LINE {
                return Err(DailyError::Smtp {
                    code: 0,
                    message: "reply line too long".to_string(),
                });
            }
            if self.stream.read(&mut byte)? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            line.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&line).trim_end().to_string())
    }
}

/// Authenticate and run one mail transaction, then say goodbye.
///
/// Once the server has accepted the body the message counts as delivered,
/// so a failing QUIT is only logged.
pub fn transact<S: Read + Write>(
    session: &mut SmtpSession<S>,
    username: &str,
    password: &str,
    from: &str,
    to: &[String],
    message: &[u8],
) -> Result<()> {
    session.auth_plain(username, password)?;
    session.mail_from(from)?;
    for recipient in to {
        session.rcpt_to(recipient)?;
    }
    session.data(message)?;
    if let Err(e) = session.quit() {
        debug!("QUIT failed after the message was accepted, ignoring: {}", e);
    }
    Ok(())
}

/// Wrap a plain stream in a TLS client session for `server`.
pub fn start_tls(stream: TcpStream, server: &str) -> Result<StreamOwned<ClientConnection, TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| DailyError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    let name = ServerName::try_from(server)
        .map_err(|e| DailyError::Tls(format!("invalid server name {:?}: {}", server, e)))?
        .to_owned();
    let connection =
        ClientConnection::new(Arc::new(config), name).map_err(|e| DailyError::Tls(e.to_string()))?;
    Ok(StreamOwned::new(connection, stream))
}

/// Escape lines starting with `.` so they cannot end the DATA section.
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 16);
    let mut line_start = true;
    for &byte in message {
        if line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        line_start = byte == b'\n';
    }
    out
}
