//! Error types for the lanscope-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid network range: {0}")]
    InvalidRange(String),

    #[error("Network lookup failed: {0}")]
    Lookup(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;

/// Why a single probe produced no evidence.
///
/// Probe failures are expected on a live network and never abort a cycle;
/// they are kept so callers can tell why a host went unclassified.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("host unreachable")]
    Unreachable,

    #[error("probe timed out")]
    Timeout,

    #[error("unexpected protocol response")]
    Protocol,

    #[error("no identifying signal")]
    NoSignal,
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
