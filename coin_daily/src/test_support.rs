//! In-process fakes for the outbound services: a scripted HTTP endpoint, a
//! scripted SMTP server (optionally fronted by an HTTP CONNECT proxy) and a
//! pause that records instead of sleeping.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use coin_common::retry::Pause;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause that records each requested delay and returns at once.
#[derive(Default)]
pub struct RecordingPause {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Pause for RecordingPause {
    fn pause(&self, delay: Duration) -> bool {
        self.waits.lock().unwrap().push(delay);
        true
    }
}

/// One HTTP request as seen by [`ScriptedServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP server answering each request with the next scripted `(status, body)`.
/// The last entry repeats once the script runs out.
pub struct ScriptedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedServer {
    pub fn start(script: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script: Vec<(u16, String)> = script
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let seen = requests.clone();
        thread::spawn(move || {
            for (served, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { break };
                let Some((status, body)) = script.get(served).or(script.last()).cloned() else {
                    break;
                };
                if let Some(request) = serve_http(stream, status, &body) {
                    seen.lock().unwrap().push(request);
                }
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve_http(stream: TcpStream, status: u16, body: &str) -> Option<RecordedRequest> {
    stream.set_read_timeout(Some(IO_TIMEOUT)).ok()?;
    let mut reader = BufReader::new(stream.try_clone().ok()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut raw = vec![0u8; length];
    reader.read_exact(&mut raw).ok()?;

    let request = RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&raw).into_owned(),
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        body.len(),
        body
    );
    let mut stream = stream;
    stream.write_all(response.as_bytes()).ok()?;
    stream.flush().ok()?;
    Some(request)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Behaviour of a [`FakeSmtp`] server.
#[derive(Debug, Clone, Copy)]
pub struct SmtpScript {
    /// When set the server first acts as an HTTP proxy and answers the
    /// CONNECT head with this reply; a non-2xx reply closes the connection.
    pub proxy_reply: Option<&'static str>,
    pub starttls: u16,
    pub auth: u16,
    /// Close the connection instead of answering QUIT.
    pub quit_drops: bool,
}

impl Default for SmtpScript {
    fn default() -> Self {
        Self {
            proxy_reply: None,
            starttls: 220,
            auth: 235,
            quit_drops: false,
        }
    }
}

/// Plain-text SMTP server that records every command line it receives.
pub struct FakeSmtp {
    addr: SocketAddr,
    transcript: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl FakeSmtp {
    pub fn start(script: SmtpScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let transcript = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let log = transcript.clone();
        let count = connections.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                count.fetch_add(1, Ordering::SeqCst);
                let _ = serve_smtp(stream, script, &log);
            }
        });

        Self {
            addr,
            transcript,
            connections,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve_smtp(
    stream: TcpStream,
    script: SmtpScript,
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut out = stream;
    let record = |line: &str| log.lock().unwrap().push(line.to_string());

    if let Some(reply) = script.proxy_reply {
        let mut first = true;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            if first {
                record(line);
                first = false;
            }
            if line.is_empty() {
                break;
            }
        }
        out.write_all(reply.as_bytes())?;
        if !reply.starts_with("HTTP/1.1 2") && !reply.starts_with("HTTP/1.0 2") {
            return Ok(());
        }
    }

    out.write_all(b"220 fake ESMTP ready\r\n")?;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        record(&line);
        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match verb.as_str() {
            "EHLO" | "HELO" => out.write_all(b"250-fake\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n")?,
            "STARTTLS" => {
                out.write_all(format!("{} starttls\r\n", script.starttls).as_bytes())?;
                // A real TLS handshake is out of reach for this fake.
                if script.starttls == 220 {
                    return Ok(());
                }
            }
            "AUTH" => out.write_all(format!("{} auth\r\n", script.auth).as_bytes())?,
            "MAIL" | "RCPT" => out.write_all(b"250 ok\r\n")?,
            "DATA" => {
                out.write_all(b"354 go ahead\r\n")?;
                loop {
                    let mut body = String::new();
                    if reader.read_line(&mut body)? == 0 {
                        return Ok(());
                    }
                    let body = body.trim_end();
                    if body == "." {
                        break;
                    }
                    record(body);
                }
                out.write_all(b"250 queued\r\n")?;
            }
            "QUIT" => {
                if !script.quit_drops {
                    out.write_all(b"221 bye\r\n")?;
                }
                return Ok(());
            }
            _ => out.write_all(b"502 unknown\r\n")?,
        }
    }
}
