//! Static HTTP fingerprint table and its scoring function.
//!
//! Scoring is a pure function of the response content and headers so it can
//! be exercised without any network.

use std::sync::OnceLock;

use lanscope_core::DeviceType;
use regex::Regex;

use crate::services::HttpResponse;

/// Points per content pattern found in the page body.
pub const CONTENT_SCORE: u32 = 30;

/// Points per pattern found in an inspected response header.
pub const HEADER_SCORE: u32 = 40;

/// A signature is accepted only when its total exceeds this.
pub const MATCH_THRESHOLD: u32 = 50;

/// Vendor-specific model extraction from page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRule {
    /// HikVision part numbers: `DS-2CD2043G0-I` and friends.
    HikvisionPartNumber,
}

impl ModelRule {
    fn extract(&self, content_lower: &str) -> Option<String> {
        match self {
            Self::HikvisionPartNumber => {
                static DS_MODEL: OnceLock<Regex> = OnceLock::new();
                let re = DS_MODEL.get_or_init(|| Regex::new(r"ds-\w+").expect("static regex"));
                re.find(content_lower).map(|m| m.as_str().to_uppercase())
            }
        }
    }
}

#[derive(Debug)]
pub struct Signature {
    pub name: &'static str,
    /// Lower-case substrings looked for in the body and inspected headers.
    pub patterns: &'static [&'static str],
    /// Header names whose values are matched against `patterns`.
    pub headers: &'static [&'static str],
    pub device_type: DeviceType,
    pub manufacturer: &'static str,
    pub model_rule: Option<ModelRule>,
}

/// Evaluated top to bottom; the first signature over the threshold wins.
pub static SIGNATURES: &[Signature] = &[
    Signature {
        name: "hikvision",
        patterns: &["hikvision", "web service", "ipcam", "dvr", "nvr", "hik-connect"],
        headers: &["server", "www-authenticate"],
        device_type: DeviceType::IpCamera,
        manufacturer: "HikVision",
        model_rule: Some(ModelRule::HikvisionPartNumber),
    },
    Signature {
        name: "dahua",
        patterns: &["dahua", "dhipcam", "netsurf", "webs", "dss"],
        headers: &["server", "www-authenticate"],
        device_type: DeviceType::IpCamera,
        manufacturer: "Dahua",
        model_rule: None,
    },
    Signature {
        name: "axis",
        patterns: &["axis", "vapix", "axis communications"],
        headers: &["server"],
        device_type: DeviceType::IpCamera,
        manufacturer: "Axis",
        model_rule: None,
    },
    Signature {
        name: "foscam",
        patterns: &["foscam", "ipcamera", "netwave"],
        headers: &["server"],
        device_type: DeviceType::IpCamera,
        manufacturer: "Foscam",
        model_rule: None,
    },
    Signature {
        name: "ubiquiti",
        patterns: &["ubiquiti", "unifi", "airmax", "edgeos"],
        headers: &["server"],
        device_type: DeviceType::NetworkDevice,
        manufacturer: "Ubiquiti",
        model_rule: None,
    },
    Signature {
        name: "tp-link",
        patterns: &["tp-link", "tplink", "archer"],
        headers: &["server"],
        device_type: DeviceType::Router,
        manufacturer: "TP-Link",
        model_rule: None,
    },
    Signature {
        name: "netgear",
        patterns: &["netgear", "readynas"],
        headers: &["server"],
        device_type: DeviceType::Router,
        manufacturer: "Netgear",
        model_rule: None,
    },
    Signature {
        name: "linksys",
        patterns: &["linksys", "cisco"],
        headers: &["server"],
        device_type: DeviceType::Router,
        manufacturer: "Linksys",
        model_rule: None,
    },
    Signature {
        name: "generic_camera",
        patterns: &["camera", "webcam", "ipcam", "surveillance", "cctv", "dvr", "nvr"],
        headers: &["server", "www-authenticate"],
        device_type: DeviceType::IpCamera,
        manufacturer: "Generic",
        model_rule: None,
    },
];

/// A signature that crossed the threshold.
#[derive(Debug, Clone)]
pub struct SignatureMatch {
    pub signature: &'static Signature,
    pub score: u32,
    pub model: Option<String>,
}

impl Signature {
    /// Additive score of this signature against a lower-cased body.
    pub fn score(&self, content_lower: &str, response: &HttpResponse) -> u32 {
        let content_hits = self
            .patterns
            .iter()
            .filter(|p| content_lower.contains(*p))
            .count() as u32;

        let header_hits: u32 = self
            .headers
            .iter()
            .filter_map(|name| response.header(name))
            .map(|value| {
                let value = value.to_lowercase();
                self.patterns.iter().filter(|p| value.contains(*p)).count() as u32
            })
            .sum();

        content_hits * CONTENT_SCORE + header_hits * HEADER_SCORE
    }
}

/// Score a response against [`SIGNATURES`] in table order.
pub fn best_match(response: &HttpResponse) -> Option<SignatureMatch> {
    let content = response.body.to_lowercase();

    SIGNATURES.iter().find_map(|signature| {
        let score = signature.score(&content, response);
        if score <= MATCH_THRESHOLD {
            return None;
        }
        let model = signature.model_rule.and_then(|rule| rule.extract(&content));
        Some(SignatureMatch {
            signature,
            score,
            model,
        })
    })
}

/// The trimmed contents of the first `<title>` element, if any.
pub fn extract_title(body: &str) -> Option<String> {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let re = TITLE
        .get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}
