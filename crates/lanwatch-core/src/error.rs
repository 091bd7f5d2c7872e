use thiserror::Error;

/// Rejections raised while constructing or updating a [`ScanConfig`](crate::ScanConfig).
///
/// These are never retried: the caller attempting the mutation gets them back
/// before any probing happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid subnet CIDR: {0}")]
    InvalidCidr(String),

    #[error("Invalid excluded IP address: {0}")]
    InvalidExcludedIp(String),

    #[error("Scan rate must be between 1 and 1000, got {0}")]
    RateOutOfRange(u32),

    #[error("Worker concurrency must be between 1 and 200, got {0}")]
    ConcurrencyOutOfRange(usize),

    #[error("Retry count must be between 0 and 5, got {0}")]
    RetriesOutOfRange(u32),

    #[error("Invalid timeout format: {0}")]
    InvalidTimeout(String),

    #[error("Unknown probe method: {0} (supported: icmp, tcp_syn, tcp_ack, udp)")]
    UnknownProbeMethod(String),

    #[error("Port must be between 1 and 65535, got {0}")]
    PortOutOfRange(u32),

    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("Scan interval must be at least {min} seconds, got {got}")]
    IntervalTooShort { got: u64, min: u64 },

    #[error("Unknown preset: {0} (available: fast, balanced, thorough, stealth)")]
    UnknownPreset(String),

    #[error("Unknown scan type: {0} (available: ping, arp, comprehensive)")]
    UnknownScanType(String),

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}
