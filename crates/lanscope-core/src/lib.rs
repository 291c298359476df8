//! lanscope-core: Shared inventory types and error handling for Lanscope.
//!
//! This crate provides the types exchanged between the discovery engine and
//! the collaborators that read its output:
//! - Device records and the evidence gathered while classifying them
//! - Category buckets used to group devices for presentation
//! - The scan snapshot published at the end of every discovery cycle
//! - Common error types

pub mod error;
pub mod types;

pub use error::LanscopeError;
pub use types::{
    Category, DeviceId, DeviceRecord, DeviceStatus, DeviceType, ScanSnapshot, ServiceProbe,
};
