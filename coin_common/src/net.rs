//! Shared networking constants, the outbound transport and the proxy tunnel.
//!
//! A `Transport` is built once at startup from the proxy settings and handed
//! to every client: the HTTP clients share its pooled `reqwest` client, and
//! the SMTP sender asks it for raw TCP streams, which are tunnelled through
//! the proxy with HTTP `CONNECT` when one is configured.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use url::Url;

use crate::config::ProxySettings;
use crate::error::DailyError;
use crate::result::Result;

/// Default base URL of the price API.
pub const DEFAULT_PRICE_API_BASE: &str = "https://api.coingecko.com/api/v3";
/// Default base URL of the chat API.
pub const DEFAULT_CHAT_API_BASE: &str = "https://discord.com/api/v10";
/// Timeout applied to every HTTP request and TCP connect.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Proxy port assumed when the proxy URL has none.
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// Upper bound on the size of a CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Parsed `http://host[:port]` forward proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    url: Url,
    host: String,
    port: u16,
}

impl ProxyEndpoint {
    /// Parse a proxy URL. Only the `http` scheme is accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| DailyError::Config(format!("invalid proxy URL {:?}: {}", raw, e)))?;
        if url.scheme() != "http" {
            return Err(DailyError::Config(format!(
                "proxy URL must use http://, got {:?}",
                raw
            )));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| DailyError::Config(format!("proxy URL {:?} has no host", raw)))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PROXY_PORT);
        Ok(Self { url, host, port })
    }

    /// `host:port` of the proxy, with the default port filled in.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The proxy URL as configured.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// Process-wide outbound transport derived from the proxy settings.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::blocking::Client,
    proxy: Option<ProxyEndpoint>,
}

impl Transport {
    /// Build the transport, routing through the proxy when it is enabled.
    pub fn from_settings(settings: &ProxySettings) -> Result<Self> {
        let proxy = settings.active().map(ProxyEndpoint::parse).transpose()?;
        Self::build(proxy)
    }

    /// A transport that connects directly.
    pub fn direct() -> Result<Self> {
        Self::build(None)
    }

    fn build(proxy: Option<ProxyEndpoint>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("CoinDaily/", env!("CARGO_PKG_VERSION")));
        builder = match &proxy {
            Some(proxy) => {
                info!("Routing outbound traffic through proxy {}", proxy.as_str());
                builder.proxy(reqwest::Proxy::all(proxy.as_str())?)
            }
            // Only the settings decide about proxies, not HTTP_PROXY and friends.
            None => builder.no_proxy(),
        };
        Ok(Self {
            http: builder.build()?,
            proxy,
        })
    }

    /// Shared HTTP client.
    pub fn http(&self) -> &reqwest::blocking::Client {
        &self.http
    }

    /// Configured proxy, if any.
    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    /// Open a TCP stream to `host:port`, tunnelled through the proxy when set.
    pub fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let target = format!("{}:{}", host, port);
        match &self.proxy {
            Some(proxy) => open_tunnel(proxy, &target, HTTP_TIMEOUT),
            None => connect_with_timeout(&target, HTTP_TIMEOUT),
        }
    }
}

/// Establish an HTTP `CONNECT` tunnel to `target` (`host:port`) through `proxy`.
///
/// A connect failure to the proxy itself is an I/O error. An unreadable or
/// non-2xx CONNECT response is a `Tunnel` error: the tunnel never came up.
/// The response head is read byte by byte so no bytes the target sends
/// right after the handshake are consumed.
pub fn open_tunnel(proxy: &ProxyEndpoint, target: &str, timeout: Duration) -> Result<TcpStream> {
    let mut stream = connect_with_timeout(&proxy.authority(), timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", target);
    stream
        .write_all(request.as_bytes())
        .map_err(|e| DailyError::Tunnel(format!("failed to send CONNECT request: {}", e)))?;

    let head = read_response_head(&mut stream)
        .map_err(|e| DailyError::Tunnel(format!("failed to read proxy response: {}", e)))?;
    let status_line = head.lines().next().unwrap_or_default().trim().to_string();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok());

    match status {
        Some(code) if (200..300).contains(&code) => {
            debug!("Proxy tunnel to {} established via {}", target, proxy.authority());
            Ok(stream)
        }
        _ => Err(DailyError::Tunnel(format!(
            "proxy CONNECT failed: {}",
            status_line
        ))),
    }
}

fn read_response_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") && !head.ends_with(b"\n\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "response head too large",
            ));
        }
        if stream.read(&mut byte)? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_err = None;
    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", addr),
            )
        })
        .into())
}
