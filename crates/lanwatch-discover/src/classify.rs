//! Device-type inference from open ports, service names and OS hints.
//!
//! Rules are evaluated top to bottom and the first match wins.

use lanwatch_core::{DeviceType, ProbeObservation};

/// The evidence a rule can look at.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint<'a> {
    pub ports: &'a [u16],
    pub services: &'a [&'a str],
    pub os_hint: Option<&'a str>,
}

impl Fingerprint<'_> {
    fn any_port(&self, candidates: &[u16]) -> bool {
        self.ports.iter().any(|p| candidates.contains(p))
    }

    fn service_like(&self, needle: &str) -> bool {
        self.services.iter().any(|s| s.contains(needle))
    }

    fn os_like(&self, needles: &[&str]) -> bool {
        self.os_hint
            .map(str::to_lowercase)
            .is_some_and(|os| needles.iter().any(|n| os.contains(n)))
    }

    fn is_computer(&self) -> bool {
        self.any_port(&[22, 3389])
    }
}

pub struct Rule {
    pub device_type: DeviceType,
    pub matches: fn(&Fingerprint<'_>) -> bool,
}

pub const RULES: &[Rule] = &[
    Rule {
        device_type: DeviceType::RouterGateway,
        matches: |f| f.any_port(&[80, 443, 8080]) && f.service_like("http") && f.any_port(&[22, 23, 53]),
    },
    Rule {
        device_type: DeviceType::NetworkPrinter,
        matches: |f| f.any_port(&[515, 631, 9100]),
    },
    Rule {
        device_type: DeviceType::NasFileServer,
        matches: |f| f.any_port(&[139, 445, 548, 2049]),
    },
    Rule {
        device_type: DeviceType::IpCamera,
        matches: |f| f.any_port(&[554, 8080, 80]) && f.service_like("rtsp"),
    },
    Rule {
        device_type: DeviceType::WindowsComputer,
        matches: |f| f.is_computer() && f.os_like(&["windows"]),
    },
    Rule {
        device_type: DeviceType::LinuxComputer,
        matches: |f| f.is_computer() && f.os_like(&["linux", "unix", "ubuntu", "centos"]),
    },
    Rule {
        device_type: DeviceType::MacComputer,
        matches: |f| f.is_computer() && f.os_like(&["mac"]),
    },
    Rule {
        device_type: DeviceType::Computer,
        matches: |f| f.is_computer(),
    },
    Rule {
        device_type: DeviceType::MobileDevice,
        matches: |f| f.ports.len() <= 2 && f.ports.iter().any(|p| *p > 1024),
    },
];

/// Evaluate [`RULES`] against a fingerprint.
pub fn classify_fingerprint(fingerprint: &Fingerprint<'_>) -> DeviceType {
    RULES
        .iter()
        .find(|rule| (rule.matches)(fingerprint))
        .map_or(DeviceType::Unknown, |rule| rule.device_type)
}

/// Infer a type for an observation. `None` when it carries no port or
/// service evidence at all.
pub fn classify(obs: &ProbeObservation) -> Option<DeviceType> {
    if obs.open_ports.is_empty() && obs.services.is_empty() {
        return None;
    }

    let names: Vec<String> = obs.services.iter().map(|s| s.name.to_lowercase()).collect();
    let services: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut ports = obs.open_ports.clone();
    ports.extend(obs.services.iter().map(|s| s.port));
    ports.sort_unstable();
    ports.dedup();

    Some(classify_fingerprint(&Fingerprint {
        ports: &ports,
        services: &services,
        os_hint: obs.os_hint.as_deref(),
    }))
}
