//! lanscope-discover: Local network device discovery and classification.
//!
//! Resolves the local subnet, probes hosts for liveness, scans a fixed set of
//! candidate ports, fingerprints the services it finds, and keeps an
//! atomically published inventory snapshot current on a fixed interval.

pub mod classifier;
pub mod config;
pub mod error;
pub mod locator;
pub mod orchestrator;
pub mod pipeline;
pub mod ports;
pub mod prober;
pub mod services;
