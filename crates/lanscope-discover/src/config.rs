//! Configuration for the lanscope-discover engine.

use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `lanscope.toml` `[discover]` section or
/// `LANSCOPE_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Scan this range instead of resolving it from the default route.
    #[serde(default)]
    pub network_range: Option<Ipv4Net>,

    /// Path to the `ip` binary used to read the routing table.
    #[serde(default = "default_ip_path")]
    pub ip_path: String,

    /// Range used when the default route cannot be resolved.
    #[serde(default = "default_fallback_cidr")]
    pub fallback_cidr: Ipv4Net,

    /// Maximum number of addresses probed per cycle.
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,

    /// Maximum number of liveness probes in flight at once.
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// How liveness is checked.
    #[serde(default)]
    pub probe_method: ProbeMethod,

    /// Hard limit on one liveness probe.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Connect timeout for one port test.
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Timeout for fetching a web service root.
    #[serde(default = "default_service_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Timeout for the RTSP OPTIONS exchange.
    #[serde(default = "default_service_timeout_ms")]
    pub rtsp_timeout_ms: u64,

    /// Pause between the end of one cycle and the start of the next.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// TCP ports tested on every responsive host.
    #[serde(default = "default_candidate_ports")]
    pub candidate_ports: Vec<u16>,
}

/// Liveness check used by the host prober.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// One ICMP echo via the system `ping` binary.
    #[default]
    Icmp,
    /// TCP connect to a handful of common ports.
    Tcp,
}

impl DiscoverConfig {
    /// Load from an optional config file plus environment overrides.
    ///
    /// A missing `[discover]` section yields the defaults; a present but
    /// malformed one is an error.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("LANSCOPE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("discover.candidate_ports")
                    .try_parsing(true),
            )
            .build()?;

        let loaded = match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => DiscoverConfig::default(),
            Err(e) => return Err(e.into()),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_hosts == 0 {
            return Err(DiscoverError::InvalidConfig("max_hosts must be positive".into()));
        }
        if self.max_concurrent_probes == 0 {
            return Err(DiscoverError::InvalidConfig(
                "max_concurrent_probes must be positive".into(),
            ));
        }
        if self.candidate_ports.is_empty() {
            return Err(DiscoverError::InvalidConfig(
                "candidate_ports must not be empty".into(),
            ));
        }
        let durations = [
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("port_timeout_ms", self.port_timeout_ms),
            ("http_timeout_ms", self.http_timeout_ms),
            ("rtsp_timeout_ms", self.rtsp_timeout_ms),
            ("scan_interval_secs", self.scan_interval_secs),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(DiscoverError::InvalidConfig(format!("{key} must be positive")));
        }
        Ok(())
    }

    /// Pin the scan to `target` (CIDR notation), bypassing route lookup.
    pub fn with_target(mut self, target: &str) -> Result<Self> {
        let net: Ipv4Net = target
            .trim()
            .parse()
            .map_err(|e| DiscoverError::InvalidRange(format!("{target}: {e}")))?;
        self.network_range = Some(net.trunc());
        Ok(self)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn rtsp_timeout(&self) -> Duration {
        Duration::from_millis(self.rtsp_timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

fn default_ip_path() -> String {
    "ip".to_string()
}

fn default_fallback_cidr() -> Ipv4Net {
    let base = Ipv4Addr::new(192, 168, 100, 0);
    Ipv4Net::new(base, 24).unwrap_or_else(|_| Ipv4Net::from(base))
}

fn default_max_hosts() -> usize {
    50
}

fn default_max_concurrent_probes() -> usize {
    64
}

fn default_ping_timeout_ms() -> u64 {
    2_000
}

fn default_port_timeout_ms() -> u64 {
    1_000
}

fn default_service_timeout_ms() -> u64 {
    5_000
}

fn default_scan_interval_secs() -> u64 {
    30
}

/// Streaming ports, plus the extra web/SSH/SMB ports port inference needs.
fn default_candidate_ports() -> Vec<u16> {
    vec![80, 443, 554, 1935, 8080, 8554, 5004, 5005, 1234, 8081, 22, 135, 445]
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            network_range: None,
            ip_path: default_ip_path(),
            fallback_cidr: default_fallback_cidr(),
            max_hosts: default_max_hosts(),
            max_concurrent_probes: default_max_concurrent_probes(),
            probe_method: ProbeMethod::default(),
            ping_timeout_ms: default_ping_timeout_ms(),
            port_timeout_ms: default_port_timeout_ms(),
            http_timeout_ms: default_service_timeout_ms(),
            rtsp_timeout_ms: default_service_timeout_ms(),
            scan_interval_secs: default_scan_interval_secs(),
            candidate_ports: default_candidate_ports(),
        }
    }
}
