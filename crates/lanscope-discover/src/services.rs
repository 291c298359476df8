//! Application-level service probes used for fingerprinting.
//!
//! Every probe carries its own timeout and reports failures as a
//! [`ProbeError`] kind rather than propagating transport errors.

use std::borrow::Cow;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::DiscoverConfig;
use crate::error::{ProbeError, ProbeResult, Result};

pub const USER_AGENT: &str = "NetworkScanner/1.0";

/// Bytes of a page body kept for fingerprinting.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// A fetched web service root.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// All values of a header joined with `", "`, as a repeated header folds.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        let mut values = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str());

        let first = values.next()?;
        match values.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{first}, {second}");
                for value in values {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                Some(Cow::Owned(joined))
            }
        }
    }
}

#[async_trait]
pub trait ServiceProber: Send + Sync {
    /// GET the service root on `port` (`https` for TLS ports, otherwise `http`).
    async fn fetch_http(&self, ip: Ipv4Addr, port: u16) -> ProbeResult<HttpResponse>;

    /// Send an RTSP `OPTIONS` request and return the response banner.
    async fn rtsp_options(&self, ip: Ipv4Addr, port: u16) -> ProbeResult<String>;
}

/// Probes real services over the network.
pub struct NetServiceProber {
    client: reqwest::Client,
    rtsp_timeout: Duration,
    https_ports: Vec<u16>,
}

impl NetServiceProber {
    pub fn new(http_timeout: Duration, rtsp_timeout: Duration) -> Result<Self> {
        // Local devices almost always present self-signed certificates.
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .danger_accept_invalid_certs(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            rtsp_timeout,
            https_ports: vec![443],
        })
    }

    /// Ports fetched over `https` instead of `http` (default: 443).
    pub fn with_https_ports(mut self, ports: Vec<u16>) -> Self {
        self.https_ports = ports;
        self
    }

    fn url_for(&self, ip: Ipv4Addr, port: u16) -> String {
        let scheme = if self.https_ports.contains(&port) {
            "https"
        } else {
            "http"
        };
        format!("{scheme}://{ip}:{port}/")
    }

    pub fn from_config(config: &DiscoverConfig) -> Result<Self> {
        Self::new(config.http_timeout(), config.rtsp_timeout())
    }
}

#[async_trait]
impl ServiceProber for NetServiceProber {
    async fn fetch_http(&self, ip: Ipv4Addr, port: u16) -> ProbeResult<HttpResponse> {
        let url = self.url_for(ip, port);

        let mut resp = self.client.get(&url).send().await.map_err(http_error_kind)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        // Streaming roots never end; score whatever arrived before the cap
        // or the deadline.
        let mut body = Vec::new();
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= MAX_BODY_BYTES {
                        body.truncate(MAX_BODY_BYTES);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(
                        ip = %ip,
                        port,
                        received = body.len(),
                        error = %e,
                        "Body read cut short"
                    );
                    break;
                }
            }
        }

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    async fn rtsp_options(&self, ip: Ipv4Addr, port: u16) -> ProbeResult<String> {
        let addr = SocketAddr::from((ip, port));
        let mut stream = match timeout(self.rtsp_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(ProbeError::Unreachable),
            Err(_) => return Err(ProbeError::Timeout),
        };

        let request = format!(
            "OPTIONS rtsp://{ip}:{port}/ RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: {USER_AGENT}\r\n\r\n"
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|_| ProbeError::Unreachable)?;

        let mut buf = [0u8; 1024];
        match timeout(self.rtsp_timeout, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Err(ProbeError::NoSignal),
            Ok(Ok(n)) => {
                let banner = String::from_utf8_lossy(&buf[..n]).into_owned();
                if banner.contains("RTSP/") {
                    Ok(banner)
                } else {
                    Err(ProbeError::Protocol)
                }
            }
            Ok(Err(_)) => Err(ProbeError::Unreachable),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

fn http_error_kind(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else if e.is_connect() {
        ProbeError::Unreachable
    } else {
        ProbeError::Protocol
    }
}
