//! lanwatch-core: Shared types, scan configuration, and validation for lanwatch.
//!
//! This crate provides the foundational types used across all lanwatch components:
//! - Device, ScanRecord and ScanSession records kept by the repository
//! - Transient probe observations produced by the discovery backends
//! - `ScanConfig` with eager validation and the named presets
//! - Configuration error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{ProbeMethod, ScanConfig, ScanPreset};
pub use error::ConfigError;
pub use types::{
    Device, DeviceId, DeviceType, OnlineInterval, ProbeObservation, ScanRecord, ScanSession,
    ScanType, ServiceHint, SessionId,
};
