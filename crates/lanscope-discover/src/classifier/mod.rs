//! Multi-signal device classification.
//!
//! Three signal sources are consulted in fixed priority order:
//!
//! 1. HTTP banner and content scoring against [`signatures::SIGNATURES`]
//! 2. RTSP `OPTIONS` banner matching, only if HTTP was inconclusive
//! 3. Open-port pattern inference, only if both of the above were
//!
//! A probe that fails contributes no evidence. It is recorded in
//! [`Classification::failures`] and never aborts classification.

pub mod inference;
pub mod signatures;

use std::net::Ipv4Addr;
use std::sync::Arc;

use lanscope_core::types::UNKNOWN;
use lanscope_core::{DeviceId, DeviceRecord, DeviceStatus, DeviceType, ServiceProbe};

use crate::error::ProbeError;
use crate::services::{HttpResponse, ServiceProber};

/// Web ports fetched for fingerprinting, in priority order.
pub const WEB_PORTS: [u16; 4] = [80, 443, 8080, 8081];

/// HTTP and RTSP signals must exceed this to assign a type.
pub const ACCEPT_THRESHOLD: u8 = 50;

const GENERIC_WEB_CONFIDENCE: u8 = 20;
const KNOWN_RTSP_CONFIDENCE: u8 = 80;
const UNKNOWN_RTSP_CONFIDENCE: u8 = 60;

/// Vendor substrings recognised in RTSP banners.
const RTSP_VENDORS: &[(&str, &str)] = &[("hikvision", "HikVision"), ("dahua", "Dahua")];

/// A probe that yielded no evidence, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub service: String,
    pub error: ProbeError,
}

/// The classifier's verdict for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub model: String,
    pub confidence: u8,
    /// Every successful service probe, in the order it ran.
    pub evidence: Vec<ServiceProbe>,
    pub failures: Vec<ProbeFailure>,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            device_type: DeviceType::Unknown,
            manufacturer: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            confidence: 0,
            evidence: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.device_type.is_unknown()
    }

    /// Take type, manufacturer, model and confidence from a probe that
    /// crossed the threshold.
    fn adopt(&mut self, probe: &ServiceProbe) {
        self.device_type = probe.device_type;
        self.manufacturer = probe.manufacturer.clone();
        self.model = probe.model.clone();
        self.confidence = probe.confidence;
    }

    fn fail(&mut self, service: impl Into<String>, error: ProbeError) {
        self.failures.push(ProbeFailure {
            service: service.into(),
            error,
        });
    }

    pub fn into_record(self, ip: Ipv4Addr, ports: Vec<u16>) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId::for_ip(ip),
            name: DeviceRecord::display_name(&self.manufacturer, self.device_type),
            ip,
            device_type: self.device_type,
            manufacturer: self.manufacturer,
            model: self.model,
            confidence: self.confidence,
            ports,
            services: self.evidence,
            status: DeviceStatus::Online,
        }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::unknown()
    }
}

pub struct DeviceClassifier {
    prober: Arc<dyn ServiceProber>,
}

impl DeviceClassifier {
    pub fn new(prober: Arc<dyn ServiceProber>) -> Self {
        Self { prober }
    }

    pub async fn classify(&self, ip: Ipv4Addr, open_ports: &[u16]) -> Classification {
        let mut result = Classification::unknown();

        for port in WEB_PORTS.into_iter().filter(|p| open_ports.contains(p)) {
            let service = format!("HTTP ({port})");
            match self.prober.fetch_http(ip, port).await {
                Ok(resp) => {
                    let probe = http_evidence(service, &resp);
                    if result.is_unknown() && accepts(&probe) {
                        result.adopt(&probe);
                    }
                    result.evidence.push(probe);
                }
                Err(e) => result.fail(service, e),
            }
        }

        if result.is_unknown() && open_ports.contains(&inference::RTSP) {
            let service = format!("RTSP ({})", inference::RTSP);
            match self.prober.rtsp_options(ip, inference::RTSP).await {
                Ok(banner) => {
                    let probe = rtsp_evidence(service, &banner);
                    if accepts(&probe) {
                        result.adopt(&probe);
                    }
                    result.evidence.push(probe);
                }
                Err(e) => result.fail(service, e),
            }
        }

        if result.is_unknown() {
            let inferred = inference::infer_from_ports(open_ports);
            result.device_type = inferred.device_type;
            result.confidence = inferred.confidence;
            if inferred.device_type.is_unknown() {
                result.fail("port inference", ProbeError::NoSignal);
            }
        }

        tracing::debug!(
            ip = %ip,
            device_type = %result.device_type,
            manufacturer = %result.manufacturer,
            confidence = result.confidence,
            evidence = result.evidence.len(),
            failures = result.failures.len(),
            "Host classified"
        );

        result
    }
}

fn accepts(probe: &ServiceProbe) -> bool {
    !probe.device_type.is_unknown() && probe.confidence > ACCEPT_THRESHOLD
}

fn http_evidence(service: String, resp: &HttpResponse) -> ServiceProbe {
    let server_header = resp.header("server").map(String::from);
    let title = signatures::extract_title(&resp.body);

    match signatures::best_match(resp) {
        Some(m) => ServiceProbe {
            service,
            device_type: m.signature.device_type,
            manufacturer: m.signature.manufacturer.to_string(),
            model: m.model.unwrap_or_else(|| UNKNOWN.to_string()),
            confidence: m.score.min(100) as u8,
            server_header,
            title,
        },
        None => ServiceProbe {
            service,
            device_type: DeviceType::WebService,
            manufacturer: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            confidence: GENERIC_WEB_CONFIDENCE,
            server_header,
            title,
        },
    }
}

fn rtsp_evidence(service: String, banner: &str) -> ServiceProbe {
    let banner = banner.to_lowercase();
    let (manufacturer, confidence) = RTSP_VENDORS
        .iter()
        .find(|(needle, _)| banner.contains(needle))
        .map(|(_, vendor)| (*vendor, KNOWN_RTSP_CONFIDENCE))
        .unwrap_or((UNKNOWN, UNKNOWN_RTSP_CONFIDENCE));

    ServiceProbe {
        service,
        device_type: DeviceType::IpCamera,
        manufacturer: manufacturer.to_string(),
        model: UNKNOWN.to_string(),
        confidence,
        server_header: None,
        title: None,
    }
}
