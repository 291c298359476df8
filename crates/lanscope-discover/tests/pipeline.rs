//! End-to-end discovery cycles over a simulated network.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use lanscope_core::{Category, DeviceId, DeviceType, ScanSnapshot};
use lanscope_discover::error::{ProbeError, ProbeResult};
use lanscope_discover::locator::FixedLocator;
use lanscope_discover::orchestrator::{ScanOrchestrator, StartOutcome};
use lanscope_discover::pipeline::{DiscoveryPipeline, ScanCycle};
use lanscope_discover::ports::PortScan;
use lanscope_discover::prober::{HostProber, LivenessProbe};
use lanscope_discover::services::{HttpResponse, ServiceProber};

/// One simulated host: open ports plus what its services answer.
#[derive(Default, Clone)]
struct Host {
    ports: Vec<u16>,
    http: HashMap<u16, HttpResponse>,
    rtsp: Option<String>,
}

impl Host {
    fn ports(ports: &[u16]) -> Self {
        Self {
            ports: ports.to_vec(),
            ..Default::default()
        }
    }

    fn http(mut self, port: u16, body: &str, server: &str) -> Self {
        self.http.insert(
            port,
            HttpResponse {
                status: 200,
                headers: vec![("server".into(), server.into())],
                body: body.into(),
            },
        );
        self
    }
}

/// Stands in for every network-facing stage at once.
#[derive(Default)]
struct SimulatedLan {
    hosts: HashMap<Ipv4Addr, Host>,
    liveness_checks: AtomicUsize,
}

impl SimulatedLan {
    fn host(mut self, last_octet: u8, host: Host) -> Self {
        self.hosts.insert(addr(last_octet), host);
        self
    }
}

#[async_trait]
impl LivenessProbe for SimulatedLan {
    async fn check(&self, ip: Ipv4Addr) -> ProbeResult<()> {
        self.liveness_checks.fetch_add(1, Ordering::SeqCst);
        if self.hosts.contains_key(&ip) {
            Ok(())
        } else {
            Err(ProbeError::Timeout)
        }
    }
}

#[async_trait]
impl PortScan for SimulatedLan {
    async fn scan_ports(&self, ip: Ipv4Addr, ports: &[u16]) -> Vec<u16> {
        let open = self.hosts.get(&ip).map(|h| h.ports.as_slice()).unwrap_or_default();
        ports.iter().copied().filter(|p| open.contains(p)).collect()
    }
}

#[async_trait]
impl ServiceProber for SimulatedLan {
    async fn fetch_http(&self, ip: Ipv4Addr, port: u16) -> ProbeResult<HttpResponse> {
        self.hosts
            .get(&ip)
            .and_then(|h| h.http.get(&port).cloned())
            .ok_or(ProbeError::Unreachable)
    }

    async fn rtsp_options(&self, ip: Ipv4Addr, _port: u16) -> ProbeResult<String> {
        self.hosts
            .get(&ip)
            .and_then(|h| h.rtsp.clone())
            .ok_or(ProbeError::Timeout)
    }
}

const CANDIDATE_PORTS: [u16; 13] = [
    80, 443, 554, 1935, 8080, 8554, 5004, 5005, 1234, 8081, 22, 135, 445,
];

fn addr(last_octet: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, last_octet)
}

fn pipeline(lan: Arc<SimulatedLan>, max_hosts: usize) -> DiscoveryPipeline {
    let network: Ipv4Net = "192.168.1.0/24".parse().unwrap();
    DiscoveryPipeline::new(
        Arc::new(FixedLocator(network)),
        HostProber::new(lan.clone(), 16),
        lan.clone(),
        lan,
        max_hosts,
        CANDIDATE_PORTS.to_vec(),
    )
}

fn office_lan() -> SimulatedLan {
    SimulatedLan::default()
        .host(5, Host::ports(&[5004]))
        .host(10, Host::ports(&[554]))
        .host(
            20,
            Host::ports(&[80, 554]).http(80, "<html><title>hikvision</title></html>", "hikvision"),
        )
        .host(
            30,
            Host::ports(&[22, 80]).http(80, "<h1>It works!</h1>", "Apache/2.4.57"),
        )
        .host(40, Host::ports(&[]))
        .host(45, Host::ports(&[445, 135]))
        // Beyond the host bound; never probed.
        .host(60, Host::ports(&[554]))
}

fn assert_snapshot_invariants(snapshot: &ScanSnapshot) {
    assert_eq!(snapshot.total_devices, snapshot.devices.len());

    let bucketed: usize = snapshot.device_categories.values().map(Vec::len).sum();
    assert_eq!(bucketed, snapshot.devices.len());
    for device in &snapshot.devices {
        assert!(!device.ports.is_empty());
        assert!(device.confidence <= 100);
        assert_eq!(device.confidence == 0, device.device_type.is_unknown());
        assert!(snapshot.category(device.category()).contains(device));
    }
}

#[tokio::test]
async fn test_cycle_builds_full_inventory() {
    let lan = Arc::new(office_lan());
    let snapshot = pipeline(lan.clone(), 50).run().await.unwrap();

    assert_snapshot_invariants(&snapshot);
    assert_eq!(snapshot.network_range, Some("192.168.1.0/24".parse().unwrap()));
    assert_eq!(lan.liveness_checks.load(Ordering::SeqCst), 50);

    // Responsive hosts are listed in address order, open ports or not.
    assert_eq!(
        snapshot.active_hosts,
        vec![addr(5), addr(10), addr(20), addr(30), addr(40), addr(45)]
    );

    let ips: Vec<_> = snapshot.devices.iter().map(|d| d.ip).collect();
    assert_eq!(ips, vec![addr(5), addr(10), addr(20), addr(30), addr(45)]);
    assert_eq!(snapshot.total_devices, 5);
    // HikVision 70, Windows 70, bare RTSP 70, Linux 60.
    assert_eq!(snapshot.identified_devices, 4);
}

#[tokio::test]
async fn test_cycle_classifies_each_host() {
    let snapshot = pipeline(Arc::new(office_lan()), 50).run().await.unwrap();
    let device = |octet| snapshot.device(&DeviceId::for_ip(addr(octet))).unwrap();

    let rtsp_only = device(10);
    assert_eq!(rtsp_only.device_type, DeviceType::IpCamera);
    assert_eq!(rtsp_only.manufacturer, "Unknown");
    assert_eq!(rtsp_only.confidence, 70);
    assert_eq!(rtsp_only.name, "Unknown IP Camera");

    let hikvision = device(20);
    assert_eq!(hikvision.manufacturer, "HikVision");
    assert_eq!(hikvision.confidence, 70);
    assert_eq!(hikvision.name, "HikVision IP Camera");
    assert_eq!(hikvision.ports, vec![80, 554]);
    assert_eq!(hikvision.services.len(), 1);

    let linux = device(30);
    assert_eq!(linux.device_type, DeviceType::LinuxServer);
    assert_eq!(linux.confidence, 60);
    assert_eq!(linux.services[0].server_header.as_deref(), Some("Apache/2.4.57"));

    let windows = device(45);
    assert_eq!(windows.device_type, DeviceType::WindowsPc);
    // Reported in candidate-port order, not the order the host lists them.
    assert_eq!(windows.ports, vec![135, 445]);

    let unknown = device(5);
    assert!(unknown.device_type.is_unknown());
    assert_eq!(unknown.confidence, 0);

    assert!(snapshot.device(&DeviceId::for_ip(addr(40))).is_none());
    assert!(snapshot.device(&DeviceId::for_ip(addr(60))).is_none());
}

#[tokio::test]
async fn test_cycle_groups_by_category() {
    let snapshot = pipeline(Arc::new(office_lan()), 50).run().await.unwrap();
    let ips = |c: Category| snapshot.category(c).iter().map(|d| d.ip).collect::<Vec<_>>();

    assert_eq!(ips(Category::IpCameras), vec![addr(10), addr(20)]);
    assert_eq!(ips(Category::Servers), vec![addr(30)]);
    assert_eq!(ips(Category::Pcs), vec![addr(45)]);
    assert_eq!(ips(Category::Unknown), vec![addr(5)]);
    assert!(ips(Category::NetworkDevices).is_empty());
}

#[tokio::test]
async fn test_host_bound_limits_probing() {
    let lan = Arc::new(office_lan());
    let snapshot = pipeline(lan.clone(), 8).run().await.unwrap();

    assert_eq!(lan.liveness_checks.load(Ordering::SeqCst), 8);
    assert_eq!(snapshot.active_hosts, vec![addr(5)]);
    assert_eq!(snapshot.total_devices, 1);
}

#[tokio::test]
async fn test_quiet_network_yields_empty_snapshot() {
    let snapshot = pipeline(Arc::new(SimulatedLan::default()), 50)
        .run()
        .await
        .unwrap();

    assert!(snapshot.scan_timestamp.is_some());
    assert!(snapshot.active_hosts.is_empty());
    assert_eq!(snapshot.total_devices, 0);
    assert_eq!(snapshot.device_categories.len(), Category::ALL.len());
    assert!(snapshot.device_categories.values().all(Vec::is_empty));
}

#[tokio::test]
async fn test_snapshot_json_shape() {
    let snapshot = pipeline(Arc::new(office_lan()), 50).run().await.unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&snapshot.to_json_pretty().unwrap()).unwrap();

    assert_eq!(json["total_devices"], 5);
    assert_eq!(json["device_categories"]["IP Cameras"].as_array().unwrap().len(), 2);
    let camera = &json["device_categories"]["IP Cameras"][1];
    assert_eq!(camera["type"], "IP Camera");
    assert_eq!(camera["ip"], "192.168.1.20");
    assert_eq!(camera["status"], "online");
}

#[tokio::test(start_paused = true)]
async fn test_orchestrator_serves_pipeline_results() {
    let orchestrator = ScanOrchestrator::new(
        Arc::new(pipeline(Arc::new(office_lan()), 50)),
        Duration::from_secs(30),
    );
    assert_eq!(orchestrator.start(), StartOutcome::Started);

    for _ in 0..100 {
        if orchestrator.status().cycles_completed > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = orchestrator.status();
    assert!(status.is_scanning);
    assert_eq!(status.device_count, 5);
    assert!(status.last_scan.is_some());
    assert_eq!(orchestrator.devices().len(), 5);
    assert_eq!(orchestrator.categories()[&Category::IpCameras].len(), 2);
    assert_eq!(
        orchestrator.device(&DeviceId::for_ip(addr(30))).unwrap().device_type,
        DeviceType::LinuxServer
    );

    orchestrator.stop();
    assert!(!orchestrator.status().is_scanning);
    assert_eq!(orchestrator.snapshot().total_devices, 5);
}
