//! Local subnet resolution.
//!
//! Reads the default route from the system routing table and computes the
//! network containing the default interface's IPv4 address. Lookup failures
//! never surface: the locator falls back to a fixed range instead.

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::process::Command;

use crate::error::{DiscoverError, Result};

#[async_trait]
pub trait NetworkLocator: Send + Sync {
    /// The range to scan this cycle. Never fails.
    async fn resolve(&self) -> Ipv4Net;
}

/// Resolves the subnet via `ip route` / `ip addr`.
pub struct SystemLocator {
    fallback: Ipv4Net,
    ip_path: String,
}

impl SystemLocator {
    pub fn new(fallback: Ipv4Net) -> Self {
        Self {
            fallback,
            ip_path: "ip".to_string(),
        }
    }

    /// Use a specific `ip` binary instead of the one on `PATH`.
    pub fn with_ip_path(mut self, ip_path: impl Into<String>) -> Self {
        self.ip_path = ip_path.into();
        self
    }

    async fn lookup(&self) -> Result<Ipv4Net> {
        let routes = self.run_ip(&["-4", "route", "show", "default"]).await?;
        let device = parse_default_device(&routes)
            .ok_or_else(|| DiscoverError::Lookup("no default route".into()))?;

        let addrs = self.run_ip(&["-o", "-4", "addr", "show", "dev", &device]).await?;
        parse_interface_network(&addrs)
            .ok_or_else(|| DiscoverError::Lookup(format!("no IPv4 address on {device}")))
    }

    async fn run_ip(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.ip_path).args(args).output().await?;
        if !output.status.success() {
            return Err(DiscoverError::Lookup(format!(
                "{} {} exited with {}",
                self.ip_path,
                args.join(" "),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl NetworkLocator for SystemLocator {
    async fn resolve(&self) -> Ipv4Net {
        match self.lookup().await {
            Ok(net) => {
                tracing::debug!(cidr = %net, "Resolved local network");
                net
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.fallback,
                    "Network lookup failed, using fallback range"
                );
                self.fallback
            }
        }
    }
}

/// A locator that always returns the same range (config override, tests).
pub struct FixedLocator(pub Ipv4Net);

#[async_trait]
impl NetworkLocator for FixedLocator {
    async fn resolve(&self) -> Ipv4Net {
        self.0
    }
}

/// Extract the device name from `ip route show default` output.
///
/// `default via 192.168.1.1 dev eth0 proto dhcp metric 100`
fn parse_default_device(routes: &str) -> Option<String> {
    routes
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| {
            let mut parts = line.split_whitespace();
            parts.find(|p| *p == "dev")?;
            parts.next().map(String::from)
        })
}

/// Extract the first IPv4 network from `ip -o -4 addr show` output.
///
/// `2: eth0    inet 192.168.1.23/24 brd 192.168.1.255 scope global eth0`
fn parse_interface_network(addrs: &str) -> Option<Ipv4Net> {
    addrs.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        parts.find(|p| *p == "inet")?;
        let net: Ipv4Net = parts.next()?.parse().ok()?;
        Some(net.trunc())
    })
}
