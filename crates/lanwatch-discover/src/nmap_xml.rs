//! Nmap XML output deserialization.
//!
//! Nmap's `-oX -` flag outputs structured XML to stdout.
//! This module provides typed Rust structs that deserialize from that XML
//! using `quick-xml` with serde, and converts up hosts into observations.

use std::net::Ipv4Addr;

use serde::Deserialize;

use lanwatch_core::{ProbeObservation, ServiceHint};

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@scanner")]
    pub scanner: Option<String>,
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
    pub runstats: Option<RunStats>,
}

/// A single host from scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<OsMatches>,
    pub times: Option<Times>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatches {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: Option<String>,
}

/// Round-trip timing, in microseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct Times {
    #[serde(rename = "@srtt")]
    pub srtt: Option<String>,
    #[serde(rename = "@rttvar")]
    pub rttvar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStats {
    pub hosts: Option<RunStatsHosts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunStatsHosts {
    #[serde(rename = "@up")]
    pub up: Option<String>,
    #[serde(rename = "@down")]
    pub down: Option<String>,
    #[serde(rename = "@total")]
    pub total: Option<String>,
}

impl NmapHost {
    /// Extract the IPv4 address, if present and well-formed.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "ipv4")
            .and_then(|a| a.addr.parse().ok())
    }

    /// Extract the MAC address element, if present.
    fn mac_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.addr_type == "mac")
    }

    /// Extract the MAC address, if present.
    pub fn mac(&self) -> Option<&str> {
        self.mac_address().map(|a| a.addr.as_str())
    }

    /// Vendor nmap attached to the MAC address.
    pub fn mac_vendor(&self) -> Option<&str> {
        self.mac_address().and_then(|a| a.vendor.as_deref())
    }

    /// Extract the first hostname, if present.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.first())
            .map(|h| h.name.as_str())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// Get the best OS match name (highest accuracy, first in list).
    pub fn os_name(&self) -> Option<&str> {
        self.os
            .as_ref()
            .and_then(|os| os.matches.first())
            .map(|m| m.name.as_str())
    }

    /// Smoothed round-trip time in milliseconds.
    pub fn latency_ms(&self) -> Option<f64> {
        let micros: f64 = self.times.as_ref()?.srtt.as_deref()?.parse().ok()?;
        Some(micros / 1000.0)
    }

    fn open_ports(&self) -> impl Iterator<Item = &NmapPort> {
        self.ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.state.state == "open")
    }

    /// Convert an up host with an IPv4 address into an observation.
    pub fn to_observation(&self) -> Option<ProbeObservation> {
        if !self.is_up() {
            return None;
        }
        let ip = self.ipv4()?;

        let services = self
            .open_ports()
            .filter_map(|p| {
                p.service.as_ref().map(|svc| ServiceHint {
                    port: p.port_id,
                    protocol: p.protocol.clone(),
                    name: svc.name.clone(),
                    version: match (&svc.product, &svc.version) {
                        (Some(prod), Some(v)) => Some(format!("{prod} {v}")),
                        (Some(prod), None) => Some(prod.clone()),
                        (None, Some(v)) => Some(v.clone()),
                        (None, None) => None,
                    },
                })
            })
            .collect();

        Some(ProbeObservation {
            ip,
            mac: self.mac().map(|m| m.to_uppercase()),
            hostname: self.hostname().map(String::from),
            vendor: self.mac_vendor().map(String::from),
            is_online: true,
            response_time_ms: self.latency_ms(),
            open_ports: self.open_ports().map(|p| p.port_id).collect(),
            services,
            os_hint: self.os_name().map(String::from),
            device_type: None,
        })
    }
}

impl RunStatsHosts {
    fn count(value: &Option<String>) -> Option<usize> {
        value.as_deref().and_then(|v| v.parse().ok())
    }
}

impl NmapRun {
    /// `(up, total)` from `<runstats>`, or counted from the host list when
    /// the report has no summary.
    pub fn host_counts(&self) -> (usize, usize) {
        let summary = self.runstats.as_ref().and_then(|s| s.hosts.as_ref());
        let up = summary
            .and_then(|h| RunStatsHosts::count(&h.up))
            .unwrap_or_else(|| self.hosts.iter().filter(|h| h.is_up()).count());
        let total = summary
            .and_then(|h| RunStatsHosts::count(&h.total))
            .unwrap_or(self.hosts.len());
        (up, total)
    }

    /// Observations for every up host in the report.
    pub fn observations(&self) -> Vec<ProbeObservation> {
        self.hosts.iter().filter_map(NmapHost::to_observation).collect()
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
