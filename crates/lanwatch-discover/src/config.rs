//! Daemon configuration for the lanwatch scanner.

use serde::Deserialize;

use lanwatch_core::{ScanConfig, ScanType};

/// Minimum periodic scan interval accepted from operators.
pub const MIN_SCAN_INTERVAL_SECS: u64 = 60;

/// Top-level discover configuration.
///
/// Loaded from `lanwatch.toml` `[discover]` section or
/// `LANWATCH__DISCOVER__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Run nmap through `docker run --network=host` instead of a local binary.
    #[serde(default)]
    pub use_docker: bool,

    /// Image used when `use_docker` is set.
    #[serde(default = "default_docker_image")]
    pub docker_image: String,

    /// Directory for the JSON device store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Optional IEEE `oui.txt` registry for vendor lookups.
    #[serde(default)]
    pub oui_file: Option<String>,

    /// Seconds between periodic sweeps.
    #[serde(default = "default_interval")]
    pub scan_interval_secs: u64,

    /// Seconds to wait after a failed sweep before retrying.
    #[serde(default = "default_cooldown")]
    pub error_cooldown_secs: u64,

    /// Scan type used by the periodic loop.
    #[serde(default)]
    pub default_scan_type: ScanType,

    /// Days of history kept by the retention sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Preset applied on startup; overrides `scan` when set.
    #[serde(default)]
    pub preset: Option<String>,

    /// Per-sweep probing parameters.
    #[serde(default)]
    pub scan: ScanConfig,
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_docker_image() -> String {
    "instrumentisto/nmap:latest".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_interval() -> u64 {
    300
}

fn default_cooldown() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    30
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            use_docker: false,
            docker_image: default_docker_image(),
            data_dir: default_data_dir(),
            oui_file: None,
            scan_interval_secs: default_interval(),
            error_cooldown_secs: default_cooldown(),
            default_scan_type: ScanType::default(),
            retention_days: default_retention_days(),
            preset: None,
            scan: ScanConfig::default(),
        }
    }
}
