//! Device type inference from the open-port set alone.
//!
//! Used only when neither the HTTP nor the RTSP probe produced a
//! classification. Rules are evaluated top to bottom; first match wins.

use lanscope_core::DeviceType;

pub const SSH: u16 = 22;
pub const HTTP: u16 = 80;
pub const MSRPC: u16 = 135;
pub const HTTPS: u16 = 443;
pub const SMB: u16 = 445;
pub const RTSP: u16 = 554;
pub const RTMP: u16 = 1935;
pub const HTTP_ALT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
    pub device_type: DeviceType,
    pub confidence: u8,
}

impl Inference {
    const fn new(device_type: DeviceType, confidence: u8) -> Self {
        Self {
            device_type,
            confidence,
        }
    }
}

pub fn infer_from_ports(open_ports: &[u16]) -> Inference {
    let has = |port: u16| open_ports.contains(&port);
    let web = has(HTTP) || has(HTTPS);

    if has(RTSP) {
        return Inference::new(DeviceType::IpCamera, if web { 80 } else { 70 });
    }
    if has(HTTP) && has(HTTP_ALT) {
        return Inference::new(DeviceType::NetworkDevice, 60);
    }
    if has(RTMP) {
        return Inference::new(DeviceType::StreamingServer, 70);
    }
    // SSH must be tested before bare web, which would otherwise shadow it.
    if has(SSH) && web {
        return Inference::new(DeviceType::LinuxServer, 60);
    }
    if web {
        return Inference::new(DeviceType::WebService, 30);
    }
    if has(MSRPC) || has(SMB) {
        return Inference::new(DeviceType::WindowsPc, 70);
    }
    Inference::new(DeviceType::Unknown, 0)
}
