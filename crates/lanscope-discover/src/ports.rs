//! TCP connect port scanning.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[async_trait]
pub trait PortScan: Send + Sync {
    /// The subset of `ports` accepting a TCP connection, in input order.
    async fn scan_ports(&self, ip: Ipv4Addr, ports: &[u16]) -> Vec<u16>;
}

/// Marks a port open when a plain TCP connect succeeds within the timeout.
/// No application protocol is spoken; the stream is dropped immediately.
pub struct TcpPortScanner {
    timeout: Duration,
}

impl TcpPortScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn is_open(ip: Ipv4Addr, port: u16, limit: Duration) -> bool {
        let addr = SocketAddr::from((ip, port));
        matches!(timeout(limit, TcpStream::connect(addr)).await, Ok(Ok(_)))
    }
}

#[async_trait]
impl PortScan for TcpPortScanner {
    async fn scan_ports(&self, ip: Ipv4Addr, ports: &[u16]) -> Vec<u16> {
        // Ports are independent; test them together and collect in input order.
        let handles: Vec<_> = ports
            .iter()
            .map(|&port| {
                let limit = self.timeout;
                (port, tokio::spawn(Self::is_open(ip, port, limit)))
            })
            .collect();

        let mut open = Vec::new();
        for (port, handle) in handles {
            if matches!(handle.await, Ok(true)) {
                open.push(port);
            }
        }

        if !open.is_empty() {
            tracing::debug!(ip = %ip, open_ports = ?open, "Open ports found");
        }
        open
    }
}
