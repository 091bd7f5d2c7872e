//! Per-sweep scan configuration.
//!
//! A `ScanConfig` is validated eagerly: every constructor and every update
//! path goes through [`ScanConfig::validate`], and invalid values are
//! rejected rather than clamped.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use ipnet::Ipv4Net;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

static TIMEOUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m)?$").expect("timeout pattern is valid")
});

/// A liveness-detection technique.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ProbeMethod {
    /// ICMP echo request.
    Icmp,
    /// TCP SYN to the configured SYN ports.
    TcpSyn,
    /// TCP ACK to the configured ACK ports.
    TcpAck,
    /// UDP probe.
    Udp,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::TcpSyn => "tcp_syn",
            Self::TcpAck => "tcp_ack",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(Self::Icmp),
            "tcp_syn" => Ok(Self::TcpSyn),
            "tcp_ack" => Ok(Self::TcpAck),
            "udp" => Ok(Self::Udp),
            other => Err(ConfigError::UnknownProbeMethod(other.to_string())),
        }
    }
}

impl TryFrom<String> for ProbeMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Configuration for one sweep.
///
/// Missing fields deserialize to the `balanced` preset values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Manually specified subnet, e.g. `192.168.1.0/24`.
    pub subnet_cidr: Option<String>,
    pub auto_detect_subnet: bool,
    pub exclude_ips: Vec<String>,

    /// Minimum packet rate handed to the scanner (packets/second).
    pub scan_rate: u32,
    /// Worker pool size for per-host fallback probing.
    pub max_workers: usize,
    /// Per-host timeout, `<number>[ms|s|m]`.
    pub scan_timeout: String,
    pub max_retries: u32,

    pub resolve_hostnames: bool,
    pub fetch_vendor_info: bool,
    pub arp_lookup_enabled: bool,
    pub fallback_enabled: bool,

    pub ping_methods: Vec<ProbeMethod>,
    pub tcp_ping_ports: Vec<u16>,
    pub ack_ping_ports: Vec<u16>,

    pub enable_port_scan: bool,
    /// Port list for detail passes, e.g. `1-1000,8080`.
    pub port_range: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanPreset::Balanced.config()
    }
}

impl ScanConfig {
    /// Deserialize a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validated()
    }

    /// Validate and return `self`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cidr) = &self.subnet_cidr {
            parse_cidr(cidr)?;
        }

        for ip in &self.exclude_ips {
            ip.parse::<Ipv4Addr>()
                .map_err(|_| ConfigError::InvalidExcludedIp(ip.clone()))?;
        }

        if !(1..=1000).contains(&self.scan_rate) {
            return Err(ConfigError::RateOutOfRange(self.scan_rate));
        }
        if !(1..=200).contains(&self.max_workers) {
            return Err(ConfigError::ConcurrencyOutOfRange(self.max_workers));
        }
        if self.max_retries > 5 {
            return Err(ConfigError::RetriesOutOfRange(self.max_retries));
        }

        parse_timeout(&self.scan_timeout)?;

        for port in self.tcp_ping_ports.iter().chain(&self.ack_ping_ports) {
            if *port == 0 {
                return Err(ConfigError::PortOutOfRange(u32::from(*port)));
            }
        }

        parse_port_ranges(&self.port_range)?;

        Ok(())
    }

    /// The per-host timeout as a `Duration`.
    pub fn host_timeout(&self) -> Duration {
        parse_timeout(&self.scan_timeout).unwrap_or(Duration::from_secs(3))
    }

    /// The manual subnet, if one is configured and parses.
    pub fn manual_subnet(&self) -> Option<Ipv4Net> {
        self.subnet_cidr.as_deref().and_then(|c| parse_cidr(c).ok())
    }

    /// Excluded addresses as a set. Unparseable entries are dropped;
    /// `validate` rejects them before this is reached.
    pub fn excluded_addrs(&self) -> HashSet<Ipv4Addr> {
        self.exclude_ips
            .iter()
            .filter_map(|ip| ip.parse().ok())
            .collect()
    }

    pub fn should_exclude(&self, ip: &Ipv4Addr) -> bool {
        self.exclude_ips.iter().any(|e| e.parse::<Ipv4Addr>().ok() == Some(*ip))
    }

    pub fn uses(&self, method: ProbeMethod) -> bool {
        self.ping_methods.contains(&method)
    }
}

/// Parse an IPv4 CIDR. Host bits are allowed and truncated.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net, ConfigError> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map(|n| n.trunc())
        .map_err(|_| ConfigError::InvalidCidr(cidr.to_string()))
}

/// Parse `<number>[ms|s|m]`. A bare number is seconds.
pub fn parse_timeout(timeout: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTimeout(timeout.to_string());
    let caps = TIMEOUT_RE.captures(timeout.trim()).ok_or_else(invalid)?;
    let value: f64 = caps[1].parse().map_err(|_| invalid())?;
    let secs = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => value / 1000.0,
        Some("m") => value * 60.0,
        _ => value,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

/// Parse a port list like `22,80,8000-8100` into inclusive ranges.
pub fn parse_port_ranges(list: &str) -> Result<Vec<(u16, u16)>, ConfigError> {
    let invalid = || ConfigError::InvalidPortRange(list.to_string());
    if list.trim().is_empty() {
        return Err(invalid());
    }

    list.split(',')
        .map(|part| {
            let part = part.trim();
            let (lo, hi) = match part.split_once('-') {
                Some((a, b)) => (a.trim(), b.trim()),
                None => (part, part),
            };
            let lo = parse_port(lo).ok_or_else(invalid)?;
            let hi = parse_port(hi).ok_or_else(invalid)?;
            if lo > hi {
                return Err(invalid());
            }
            Ok((lo, hi))
        })
        .collect()
}

fn parse_port(s: &str) -> Option<u16> {
    let n: u32 = s.parse().ok()?;
    if (1..=65535).contains(&n) {
        u16::try_from(n).ok()
    } else {
        None
    }
}

// ── Presets ───────────────────────────────────────────────────────

/// Named parameter sets tuned for different trade-offs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanPreset {
    /// High rate, minimal probing, no enrichment lookups.
    Fast,
    /// Default day-to-day trade-off.
    Balanced,
    /// Several probe methods, many ports, generous timeouts.
    Thorough,
    /// Lowest rate and footprint.
    Stealth,
}

impl ScanPreset {
    pub const ALL: [ScanPreset; 4] = [Self::Fast, Self::Balanced, Self::Thorough, Self::Stealth];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Thorough => "thorough",
            Self::Stealth => "stealth",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fast => "Fast scan",
            Self::Balanced => "Balanced",
            Self::Thorough => "Thorough scan",
            Self::Stealth => "Stealth scan",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Fast => "Quick device discovery; fastest, slightly less accurate",
            Self::Balanced => "Balance of speed and accuracy, recommended for daily use",
            Self::Thorough => "Maximum accuracy, longer scan time",
            Self::Stealth => "Minimal network impact, slowest scan",
        }
    }

    /// The fixed parameter set for this preset.
    pub fn config(&self) -> ScanConfig {
        let base = ScanConfig {
            subnet_cidr: None,
            auto_detect_subnet: true,
            exclude_ips: Vec::new(),
            scan_rate: 100,
            max_workers: 50,
            scan_timeout: "3s".to_string(),
            max_retries: 2,
            resolve_hostnames: true,
            fetch_vendor_info: true,
            arp_lookup_enabled: true,
            fallback_enabled: true,
            ping_methods: vec![ProbeMethod::Icmp],
            tcp_ping_ports: vec![22, 80, 443],
            ack_ping_ports: vec![80],
            enable_port_scan: false,
            port_range: "1-1000".to_string(),
        };

        match self {
            Self::Fast => ScanConfig {
                scan_rate: 300,
                max_workers: 100,
                scan_timeout: "1s".to_string(),
                max_retries: 1,
                resolve_hostnames: false,
                fetch_vendor_info: false,
                ping_methods: vec![ProbeMethod::Icmp],
                tcp_ping_ports: vec![80],
                ack_ping_ports: Vec::new(),
                ..base
            },
            Self::Balanced => base,
            Self::Thorough => ScanConfig {
                scan_rate: 50,
                max_workers: 30,
                scan_timeout: "5s".to_string(),
                max_retries: 3,
                ping_methods: vec![ProbeMethod::Icmp, ProbeMethod::TcpSyn, ProbeMethod::TcpAck],
                tcp_ping_ports: vec![22, 23, 25, 53, 80, 110, 443, 993, 995],
                ack_ping_ports: vec![80, 443],
                ..base
            },
            Self::Stealth => ScanConfig {
                scan_rate: 10,
                max_workers: 10,
                scan_timeout: "10s".to_string(),
                max_retries: 1,
                resolve_hostnames: false,
                fetch_vendor_info: true,
                ping_methods: vec![ProbeMethod::TcpSyn],
                tcp_ping_ports: vec![80, 443],
                ack_ping_ports: Vec::new(),
                ..base
            },
        }
    }
}

impl FromStr for ScanPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "thorough" => Ok(Self::Thorough),
            "stealth" => Ok(Self::Stealth),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}
