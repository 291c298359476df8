//! Inventory types for the Lanscope device discovery engine.
//!
//! Everything here is rebuilt from scratch by each discovery cycle; nothing
//! is carried over between cycles except the deterministic device ID.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LanscopeError;

/// Namespace UUID for deterministic device IDs.
const LANSCOPE_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1c, 0x8e, 0x52, 0x47, 0x0b, 0x4d, 0x9a, 0xa6, 0x21, 0x5e, 0x0d, 0x7b, 0xc4, 0x19, 0x88,
]);

/// Placeholder used for manufacturer and model when nothing better is known.
pub const UNKNOWN: &str = "Unknown";

// ── Devices ──────────────────────────────────────────────────────

/// Stable identifier for a device, derived from its IP address.
///
/// The same address always maps to the same ID so consumers can diff
/// records across cycles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn for_ip(ip: Ipv4Addr) -> Self {
        Self(Uuid::new_v5(&LANSCOPE_NS, format!("device:{ip}").as_bytes()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Best-guess device type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeviceType {
    #[serde(rename = "IP Camera")]
    IpCamera,
    #[serde(rename = "Network Device")]
    NetworkDevice,
    #[serde(rename = "Router")]
    Router,
    #[serde(rename = "Streaming Server")]
    StreamingServer,
    #[serde(rename = "Web Service")]
    WebService,
    #[serde(rename = "Linux Server")]
    LinuxServer,
    #[serde(rename = "Windows PC")]
    WindowsPc,
    #[default]
    #[serde(rename = "Unknown")]
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpCamera => "IP Camera",
            Self::NetworkDevice => "Network Device",
            Self::Router => "Router",
            Self::StreamingServer => "Streaming Server",
            Self::WebService => "Web Service",
            Self::LinuxServer => "Linux Server",
            Self::WindowsPc => "Windows PC",
            Self::Unknown => UNKNOWN,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One service probe that contributed evidence about a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceProbe {
    /// Service label, e.g. `HTTP (80)` or `RTSP (554)`.
    pub service: String,
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub model: String,
    pub confidence: u8,
    /// Raw `Server` header, HTTP only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_header: Option<String>,
    /// HTML page title, HTTP only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Online,
}

/// A classified device as published in the inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    /// `"{manufacturer} {type}"`.
    pub name: String,
    pub ip: Ipv4Addr,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub model: String,
    pub confidence: u8,
    pub ports: Vec<u16>,
    pub services: Vec<ServiceProbe>,
    pub status: DeviceStatus,
}

impl DeviceRecord {
    pub fn display_name(manufacturer: &str, device_type: DeviceType) -> String {
        format!("{manufacturer} {device_type}")
    }

    pub fn category(&self) -> Category {
        Category::for_type(self.device_type)
    }
}

// ── Categories ───────────────────────────────────────────────────

/// Coarse presentation bucket. Every device lands in exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    #[serde(rename = "IP Cameras")]
    IpCameras,
    #[serde(rename = "Network Devices")]
    NetworkDevices,
    #[serde(rename = "Servers")]
    Servers,
    #[serde(rename = "PCs")]
    Pcs,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::IpCameras,
        Self::NetworkDevices,
        Self::Servers,
        Self::Pcs,
        Self::Unknown,
    ];

    /// Bucket a device type by substring priority: Camera, Network/Router,
    /// Server, PC, then Unknown.
    pub fn for_type(device_type: DeviceType) -> Self {
        let label = device_type.as_str();
        if label.contains("Camera") {
            Self::IpCameras
        } else if label.contains("Network") || label.contains("Router") {
            Self::NetworkDevices
        } else if label.contains("Server") {
            Self::Servers
        } else if label.contains("PC") {
            Self::Pcs
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpCameras => "IP Cameras",
            Self::NetworkDevices => "Network Devices",
            Self::Servers => "Servers",
            Self::Pcs => "PCs",
            Self::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = LanscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LanscopeError::UnknownCategory(s.to_string()))
    }
}

// ── Snapshot ─────────────────────────────────────────────────────

/// The complete result of one discovery cycle.
///
/// Built in one piece by [`ScanSnapshot::assemble`] and never mutated
/// afterwards, so `total_devices` and `device_categories` always agree
/// with `devices`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSnapshot {
    pub scan_id: Option<Uuid>,
    pub devices: Vec<DeviceRecord>,
    pub scan_timestamp: Option<DateTime<Utc>>,
    pub total_devices: usize,
    /// Devices classified with confidence above 50.
    pub identified_devices: usize,
    pub device_categories: BTreeMap<Category, Vec<DeviceRecord>>,
    pub network_range: Option<Ipv4Net>,
    /// Every address that answered the liveness probe, with or without open ports.
    pub active_hosts: Vec<Ipv4Addr>,
}

impl ScanSnapshot {
    /// The snapshot visible before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            scan_id: None,
            devices: Vec::new(),
            scan_timestamp: None,
            total_devices: 0,
            identified_devices: 0,
            device_categories: empty_buckets(),
            network_range: None,
            active_hosts: Vec::new(),
        }
    }

    pub fn assemble(
        scan_id: Uuid,
        network_range: Ipv4Net,
        active_hosts: Vec<Ipv4Addr>,
        devices: Vec<DeviceRecord>,
        scan_timestamp: DateTime<Utc>,
    ) -> Self {
        let mut device_categories = empty_buckets();
        for device in &devices {
            device_categories
                .entry(device.category())
                .or_default()
                .push(device.clone());
        }

        Self {
            scan_id: Some(scan_id),
            total_devices: devices.len(),
            identified_devices: devices.iter().filter(|d| d.confidence > 50).count(),
            devices,
            scan_timestamp: Some(scan_timestamp),
            device_categories,
            network_range: Some(network_range),
            active_hosts,
        }
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn category(&self, category: Category) -> &[DeviceRecord] {
        self.device_categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn to_json_pretty(&self) -> Result<String, LanscopeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

fn empty_buckets() -> BTreeMap<Category, Vec<DeviceRecord>> {
    Category::ALL.into_iter().map(|c| (c, Vec::new())).collect()
}
