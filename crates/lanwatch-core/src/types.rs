//! Core domain types for lanwatch.
//!
//! `Device`, `ScanRecord` and `ScanSession` are persisted by the repository;
//! `ProbeObservation` is transient and only lives for the duration of a sweep.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for a tracked device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a scan session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Scan types ────────────────────────────────────────────────────

/// Which discovery pipeline a sweep runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// Host discovery only.
    #[default]
    Ping,
    /// Address-resolution sweep of the local segment.
    Arp,
    /// Discovery pass followed by a port/service detail pass over live hosts.
    Comprehensive,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Arp => "arp",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ping" => Ok(Self::Ping),
            "arp" => Ok(Self::Arp),
            "comprehensive" | "full" => Ok(Self::Comprehensive),
            _ => Err(ConfigError::UnknownScanType(s.to_string())),
        }
    }
}

// ── Device classification ─────────────────────────────────────────

/// Device category inferred from exposed ports, services and OS hints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    RouterGateway,
    NetworkPrinter,
    NasFileServer,
    IpCamera,
    WindowsComputer,
    LinuxComputer,
    MacComputer,
    Computer,
    MobileDevice,
    Unknown,
}

impl DeviceType {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::RouterGateway => "Router/Gateway",
            Self::NetworkPrinter => "Network Printer",
            Self::NasFileServer => "NAS/File Server",
            Self::IpCamera => "IP Camera",
            Self::WindowsComputer => "Windows Computer",
            Self::LinuxComputer => "Linux Computer",
            Self::MacComputer => "Mac Computer",
            Self::Computer => "Computer",
            Self::MobileDevice => "Mobile Device",
            Self::Unknown => "Unknown Device",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Transient observations ────────────────────────────────────────

/// A service fingerprint reported for an open port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceHint {
    pub port: u16,
    pub protocol: String,
    pub name: String,
    pub version: Option<String>,
}

/// One probed host in one sweep.
///
/// Produced by a probe backend and consumed by the discovery engine. Never
/// persisted directly; the lifecycle manager folds it into a [`Device`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeObservation {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub is_online: bool,
    /// Round-trip time in milliseconds.
    pub response_time_ms: Option<f64>,
    pub open_ports: Vec<u16>,
    pub services: Vec<ServiceHint>,
    pub os_hint: Option<String>,
    pub device_type: Option<DeviceType>,
}

impl ProbeObservation {
    /// A bare liveness observation for `ip`.
    pub fn online(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            vendor: None,
            is_online: true,
            response_time_ms: None,
            open_ports: Vec::new(),
            services: Vec::new(),
            os_hint: None,
            device_type: None,
        }
    }

    /// Fill empty fields of `self` from `other` without touching liveness.
    ///
    /// Used when a detail pass and a discovery pass both reported the same host.
    pub fn absorb(&mut self, other: ProbeObservation) {
        if self.mac.is_none() {
            self.mac = other.mac;
        }
        if self.hostname.is_none() {
            self.hostname = other.hostname;
        }
        if self.vendor.is_none() {
            self.vendor = other.vendor;
        }
        if self.response_time_ms.is_none() {
            self.response_time_ms = other.response_time_ms;
        }
        if self.open_ports.is_empty() {
            self.open_ports = other.open_ports;
        }
        if self.services.is_empty() {
            self.services = other.services;
        }
        if self.os_hint.is_none() {
            self.os_hint = other.os_hint;
        }
        if self.device_type.is_none() {
            self.device_type = other.device_type;
        }
    }
}

// ── Persistent records ────────────────────────────────────────────

/// A host seen at least once on the network, keyed by IP address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: DeviceId,
    pub ip_address: Ipv4Addr,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    /// User-assigned alias.
    pub custom_name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_online: bool,
    pub open_ports: Vec<u16>,
}

impl Device {
    /// Create a device from its first observation.
    pub fn from_observation(obs: &ProbeObservation, seen_at: DateTime<Utc>) -> Self {
        Self {
            id: DeviceId::new(),
            ip_address: obs.ip,
            mac_address: obs.mac.clone(),
            hostname: obs.hostname.clone(),
            vendor: obs.vendor.clone(),
            custom_name: None,
            device_type: obs.device_type,
            first_seen: seen_at,
            last_seen: seen_at,
            is_online: obs.is_online,
            open_ports: obs.open_ports.clone(),
        }
    }

    /// Merge a later observation of the same address.
    ///
    /// Liveness and last-seen are always overwritten. Identity fields (MAC,
    /// hostname, vendor) are only back-filled while empty and are never
    /// replaced once set.
    pub fn merge_observation(&mut self, obs: &ProbeObservation, seen_at: DateTime<Utc>) {
        self.last_seen = seen_at;
        self.is_online = obs.is_online;

        if self.mac_address.is_none() {
            self.mac_address = obs.mac.clone();
        }
        if self.hostname.is_none() {
            self.hostname = obs.hostname.clone();
        }
        if self.vendor.is_none() {
            self.vendor = obs.vendor.clone();
        }
        if !obs.open_ports.is_empty() {
            self.open_ports = obs.open_ports.clone();
        }
        if obs.device_type.is_some() {
            self.device_type = obs.device_type;
        }
    }

    /// Alias, then hostname, then IP address.
    pub fn display_name(&self) -> String {
        self.custom_name
            .clone()
            .or_else(|| self.hostname.clone())
            .unwrap_or_else(|| self.ip_address.to_string())
    }
}

/// One liveness sample for one device in one sweep. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRecord {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub scan_time: DateTime<Utc>,
    pub is_online: bool,
    pub response_time_ms: Option<f64>,
}

impl ScanRecord {
    pub fn new(
        device_id: DeviceId,
        scan_time: DateTime<Utc>,
        is_online: bool,
        response_time_ms: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            scan_time,
            is_online,
            response_time_ms,
        }
    }
}

/// Audit record for one sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanSession {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub subnet: String,
    pub scan_type: ScanType,
    /// Name of the probe strategy that produced the batch.
    pub strategy: Option<String>,
    pub devices_found: u32,
    pub error: Option<String>,
}

impl ScanSession {
    /// Open a session at `start_time`.
    pub fn open(subnet: &str, scan_type: ScanType, start_time: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            start_time,
            end_time: None,
            subnet: subnet.to_string(),
            scan_type,
            strategy: None,
            devices_found: 0,
            error: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }
}

/// A contiguous online period. `end == None` means still online.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineInterval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(ip: [u8; 4]) -> ProbeObservation {
        ProbeObservation::online(Ipv4Addr::from(ip))
    }

    #[test]
    fn test_new_device_first_seen_equals_last_seen() {
        let now = Utc::now();
        let device = Device::from_observation(&obs([192, 168, 1, 10]), now);
        assert_eq!(device.first_seen, now);
        assert_eq!(device.last_seen, now);
        assert!(device.is_online);
        assert!(device.custom_name.is_none());
    }

    #[test]
    fn test_merge_never_overwrites_identity() {
        let t0 = Utc::now();
        let mut first = obs([192, 168, 1, 10]);
        first.hostname = Some("A".to_string());
        let mut device = Device::from_observation(&first, t0);

        let mut second = obs([192, 168, 1, 10]);
        second.hostname = Some("B".to_string());
        second.mac = Some("AA:BB:CC:11:22:33".to_string());
        let t1 = t0 + chrono::TimeDelta::seconds(300);
        device.merge_observation(&second, t1);

        assert_eq!(device.hostname.as_deref(), Some("A"));
        assert_eq!(device.mac_address.as_deref(), Some("AA:BB:CC:11:22:33"));
        assert_eq!(device.last_seen, t1);
        assert_eq!(device.first_seen, t0);
    }

    #[test]
    fn test_merge_keeps_ports_when_observation_has_none() {
        let now = Utc::now();
        let mut detailed = obs([10, 0, 0, 2]);
        detailed.open_ports = vec![22, 80];
        let mut device = Device::from_observation(&detailed, now);

        device.merge_observation(&obs([10, 0, 0, 2]), now);
        assert_eq!(device.open_ports, vec![22, 80]);
    }

    #[test]
    fn test_display_name_precedence() {
        let now = Utc::now();
        let mut device = Device::from_observation(&obs([10, 0, 0, 3]), now);
        assert_eq!(device.display_name(), "10.0.0.3");
        device.hostname = Some("nas.lan".to_string());
        assert_eq!(device.display_name(), "nas.lan");
        device.custom_name = Some("Basement NAS".to_string());
        assert_eq!(device.display_name(), "Basement NAS");
    }

    #[test]
    fn test_scan_type_parse() {
        assert_eq!("ping".parse::<ScanType>().unwrap(), ScanType::Ping);
        assert_eq!("ARP".parse::<ScanType>().unwrap(), ScanType::Arp);
        assert_eq!(
            "comprehensive".parse::<ScanType>().unwrap(),
            ScanType::Comprehensive
        );
        assert!("syn".parse::<ScanType>().is_err());
    }

    #[test]
    fn test_absorb_fills_only_gaps() {
        let mut detail = obs([10, 0, 0, 4]);
        detail.open_ports = vec![443];
        let mut discovery = obs([10, 0, 0, 4]);
        discovery.mac = Some("00:11:22:33:44:55".to_string());
        discovery.open_ports = vec![1];
        discovery.response_time_ms = Some(1.5);

        detail.absorb(discovery);
        assert_eq!(detail.open_ports, vec![443]);
        assert_eq!(detail.mac.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(detail.response_time_ms, Some(1.5));
    }
}
