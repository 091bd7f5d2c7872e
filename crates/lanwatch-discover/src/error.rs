//! Error types for the lanwatch-discover crate.

use thiserror::Error;

use lanwatch_core::{ConfigError, DeviceId};
use lanwatch_store::StoreError;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Process {program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Every probe strategy failed for {subnet}")]
    AllStrategiesFailed { subnet: String },

    #[error("Could not resolve subnet: {0}")]
    SubnetResolution(String),

    #[error("Periodic scan loop is already running")]
    PeriodicLoopActive,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    pub fn device_not_found(id: DeviceId) -> Self {
        Self::DeviceNotFound(id.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
