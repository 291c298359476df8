//! Concurrent host liveness probing.
//!
//! One task per candidate address, bounded by a semaphore, joined before
//! returning. Total wall time tracks the slowest probe, not the sum.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::{DiscoverConfig, ProbeMethod};
use crate::error::{ProbeError, ProbeResult};

/// A single reachability check.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self, ip: Ipv4Addr) -> ProbeResult<()>;
}

/// One ICMP echo through the system `ping` binary.
pub struct IcmpProbe {
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LivenessProbe for IcmpProbe {
    async fn check(&self, ip: Ipv4Addr) -> ProbeResult<()> {
        let target = ip.to_string();
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            cmd.args(["-n", "1", "-w", "1000", &target]);
        } else {
            cmd.args(["-c", "1", "-W", "1", &target]);
        }
        cmd.kill_on_drop(true);

        match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(_)) => Err(ProbeError::Unreachable),
            Ok(Err(e)) => {
                tracing::debug!(ip = %ip, error = %e, "Failed to run ping");
                Err(ProbeError::Protocol)
            }
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

/// TCP connect to a few common ports.
///
/// A refused connection still proves something answered at the address.
pub struct TcpProbe {
    ports: Vec<u16>,
    timeout: Duration,
}

impl TcpProbe {
    pub const DEFAULT_PORTS: [u16; 4] = [554, 80, 443, 8080];

    pub fn new(ports: Vec<u16>, timeout: Duration) -> Self {
        Self { ports, timeout }
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn check(&self, ip: Ipv4Addr) -> ProbeResult<()> {
        if self.ports.is_empty() {
            return Err(ProbeError::NoSignal);
        }
        // Split the budget so one probe never exceeds the configured timeout.
        let per_port = self.timeout / self.ports.len() as u32;
        for &port in &self.ports {
            let addr = SocketAddr::from((ip, port));
            match timeout(per_port, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(()),
                Ok(Err(_)) | Err(_) => continue,
            }
        }
        Err(ProbeError::Timeout)
    }
}

/// Build the configured liveness probe.
pub fn liveness_probe(config: &DiscoverConfig) -> Arc<dyn LivenessProbe> {
    match config.probe_method {
        ProbeMethod::Icmp => Arc::new(IcmpProbe::new(config.ping_timeout())),
        ProbeMethod::Tcp => Arc::new(TcpProbe::new(
            TcpProbe::DEFAULT_PORTS.to_vec(),
            config.ping_timeout(),
        )),
    }
}

/// Fans liveness probes out over a candidate list.
pub struct HostProber {
    probe: Arc<dyn LivenessProbe>,
    concurrency: Arc<Semaphore>,
}

impl HostProber {
    pub fn new(probe: Arc<dyn LivenessProbe>, max_concurrent: usize) -> Self {
        Self {
            probe,
            concurrency: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// The first `bound` host addresses of `network`.
    pub fn candidates(network: Ipv4Net, bound: usize) -> Vec<Ipv4Addr> {
        network.hosts().take(bound).collect()
    }

    /// Probe at most `bound` of `candidates` concurrently and return the
    /// ones that answered. Returns only after every probe has finished.
    pub async fn probe(&self, candidates: &[Ipv4Addr], bound: usize) -> Vec<Ipv4Addr> {
        let mut handles = Vec::with_capacity(candidates.len().min(bound));

        for &ip in candidates.iter().take(bound) {
            let probe = self.probe.clone();
            let semaphore = self.concurrency.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match probe.check(ip).await {
                    Ok(()) => Some(ip),
                    Err(e) => {
                        tracing::trace!(ip = %ip, reason = %e, "Host not responding");
                        None
                    }
                }
            }));
        }

        let probed = handles.len();
        let mut alive = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(ip)) => alive.push(ip),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Liveness probe task panicked"),
            }
        }

        tracing::info!(probed, hosts_up = alive.len(), "Host discovery complete");
        alive
    }
}
