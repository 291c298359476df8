//! One discovery cycle: locate → probe → scan → classify → assemble.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use lanscope_core::ScanSnapshot;
use uuid::Uuid;

use crate::classifier::DeviceClassifier;
use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::locator::{FixedLocator, NetworkLocator, SystemLocator};
use crate::ports::{PortScan, TcpPortScanner};
use crate::prober::{self, HostProber};
use crate::services::{NetServiceProber, ServiceProber};

/// Produces one complete snapshot per call.
#[async_trait]
pub trait ScanCycle: Send + Sync {
    async fn run(&self) -> Result<ScanSnapshot>;
}

/// The production cycle wired from its four stages.
pub struct DiscoveryPipeline {
    locator: Arc<dyn NetworkLocator>,
    prober: HostProber,
    ports: Arc<dyn PortScan>,
    classifier: DeviceClassifier,
    max_hosts: usize,
    candidate_ports: Vec<u16>,
}

impl DiscoveryPipeline {
    pub fn new(
        locator: Arc<dyn NetworkLocator>,
        prober: HostProber,
        ports: Arc<dyn PortScan>,
        services: Arc<dyn ServiceProber>,
        max_hosts: usize,
        candidate_ports: Vec<u16>,
    ) -> Self {
        Self {
            locator,
            prober,
            ports,
            classifier: DeviceClassifier::new(services),
            max_hosts,
            candidate_ports,
        }
    }

    /// Build the network-backed pipeline described by `config`.
    pub fn from_config(config: &DiscoverConfig) -> Result<Self> {
        let locator: Arc<dyn NetworkLocator> = match config.network_range {
            Some(net) => Arc::new(FixedLocator(net)),
            None => Arc::new(
                SystemLocator::new(config.fallback_cidr).with_ip_path(config.ip_path.as_str()),
            ),
        };
        let prober = HostProber::new(prober::liveness_probe(config), config.max_concurrent_probes);
        let ports = Arc::new(TcpPortScanner::new(config.port_timeout()));
        let services = Arc::new(NetServiceProber::from_config(config)?);

        Ok(Self::new(
            locator,
            prober,
            ports,
            services,
            config.max_hosts,
            config.candidate_ports.clone(),
        ))
    }
}

#[async_trait]
impl ScanCycle for DiscoveryPipeline {
    async fn run(&self) -> Result<ScanSnapshot> {
        let scan_id = Uuid::new_v4();
        let start = Instant::now();

        let network = self.locator.resolve().await;
        tracing::info!(scan_id = %scan_id, cidr = %network, "Starting discovery cycle");

        let candidates = HostProber::candidates(network, self.max_hosts);
        let mut active_hosts = self.prober.probe(&candidates, self.max_hosts).await;
        active_hosts.sort_unstable();

        let mut devices = Vec::new();
        for &ip in &active_hosts {
            let open_ports = self.ports.scan_ports(ip, &self.candidate_ports).await;
            if open_ports.is_empty() {
                continue;
            }
            let classification = self.classifier.classify(ip, &open_ports).await;
            devices.push(classification.into_record(ip, open_ports));
        }

        let snapshot = ScanSnapshot::assemble(scan_id, network, active_hosts, devices, Utc::now());

        tracing::info!(
            scan_id = %scan_id,
            cidr = %network,
            hosts_up = snapshot.active_hosts.len(),
            devices = snapshot.total_devices,
            identified = snapshot.identified_devices,
            duration_ms = start.elapsed().as_millis(),
            "Discovery cycle complete"
        );

        Ok(snapshot)
    }
}
