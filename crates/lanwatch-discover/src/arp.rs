//! Address-resolution probing: `arp-scan` and the kernel ARP cache.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use lanwatch_core::ProbeObservation;

use crate::error::{DiscoverError, Result};
use crate::process::ProcessRunner;

static ARP_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+) \((\d{1,3}(?:\.\d{1,3}){3})\) at ([0-9A-Fa-f]{1,2}(?:[:-][0-9A-Fa-f]{1,2}){5})")
        .expect("arp table pattern is valid")
});

/// One resolved IP → hardware address pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: String,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

impl ArpEntry {
    pub fn into_observation(self) -> ProbeObservation {
        let mut obs = ProbeObservation::online(self.ip);
        obs.mac = Some(self.mac);
        obs.hostname = self.hostname;
        obs.vendor = self.vendor;
        obs
    }
}

/// Canonical `AA:BB:CC:DD:EE:FF` form.
///
/// Accepts `:` or `-` separators with unpadded octets (`0:1b:21:a:b:c`),
/// or twelve bare hex digits.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let octets: Vec<String> = if raw.len() == 12 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        (0..6).map(|i| raw[i * 2..i * 2 + 2].to_string()).collect()
    } else {
        raw.split([':', '-'])
            .map(|part| match part.len() {
                1 => format!("0{part}"),
                _ => part.to_string(),
            })
            .collect()
    };

    if octets.len() != 6
        || octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_uppercase())
}

/// Parse `arp-scan` output: `ip<TAB>mac<TAB>vendor` per responding host.
/// Banner and summary lines are skipped, as is the `(DUP: n)` marker on
/// repeated replies.
pub fn parse_arp_scan(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let ip = fields.next()?.trim().parse().ok()?;
            let mac = normalize_mac(fields.next()?)?;
            let vendor = fields
                .next()
                .map(|v| strip_dup_marker(v.trim()))
                .filter(|v| !v.is_empty() && !v.starts_with("(Unknown"))
                .map(String::from);
            Some(ArpEntry {
                ip,
                mac,
                hostname: None,
                vendor,
            })
        })
        .collect()
}

fn strip_dup_marker(vendor: &str) -> &str {
    match vendor.rfind(" (DUP: ") {
        Some(at) if vendor.ends_with(')') => vendor[..at].trim_end(),
        _ => vendor,
    }
}

/// Parse `arp -a`/`arp -an` output in BSD or Linux net-tools syntax:
/// `host (ip) at mac ...`. Incomplete entries are skipped.
pub fn parse_arp_table(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .filter_map(|line| {
            let caps = ARP_TABLE_RE.captures(line.trim())?;
            let ip = caps[2].parse().ok()?;
            let mac = normalize_mac(&caps[3])?;
            if mac == "FF:FF:FF:FF:FF:FF" {
                return None;
            }
            let hostname = Some(&caps[1])
                .filter(|h| *h != "?")
                .map(String::from);
            Some(ArpEntry {
                ip,
                mac,
                hostname,
                vendor: None,
            })
        })
        .collect()
}

/// Runs the address-resolution tools.
pub struct ArpProber {
    runner: Arc<dyn ProcessRunner>,
}

impl ArpProber {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Broadcast an ARP sweep of the local segment with `arp-scan`.
    pub async fn scan_localnet(&self) -> Result<Vec<ArpEntry>> {
        let args = vec!["--localnet".to_string()];
        let output = self.runner.run("arp-scan", &args, None).await?;
        if !output.success() {
            return Err(DiscoverError::CommandFailed {
                program: "arp-scan".to_string(),
                code: output.code.unwrap_or(-1),
                stderr: output.stderr_lossy(),
            });
        }
        let entries = parse_arp_scan(&output.stdout_lossy());
        tracing::info!(hosts = entries.len(), "arp-scan complete");
        Ok(entries)
    }

    /// Read the kernel's neighbour cache.
    pub async fn read_table(&self) -> Result<Vec<ArpEntry>> {
        let output = self.runner.run("arp", &["-an".to_string()], None).await?;
        if !output.success() {
            return Err(DiscoverError::CommandFailed {
                program: "arp".to_string(),
                code: output.code.unwrap_or(-1),
                stderr: output.stderr_lossy(),
            });
        }
        Ok(parse_arp_table(&output.stdout_lossy()))
    }

    /// IP → MAC map from the neighbour cache. Empty if the table is unreadable.
    pub async fn mac_table(&self) -> HashMap<Ipv4Addr, String> {
        match self.read_table().await {
            Ok(entries) => entries.into_iter().map(|e| (e.ip, e.mac)).collect(),
            Err(e) => {
                tracing::debug!(error = %e, "ARP table unavailable");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::scripted::{Reply, ScriptedRunner};

    const ARP_SCAN_OUTPUT: &str = "Interface: eth0, type: EN10MB, MAC: 02:42:ac:11:00:09, IPv4: 192.168.1.9
Starting arp-scan 1.10.0 with 256 hosts (https://github.com/royhills/arp-scan)
192.168.1.1\taa:bb:cc:dd:ee:01\tTP-LINK TECHNOLOGIES CO.,LTD.
192.168.1.20\tb8:27:eb:12:34:56\tRaspberry Pi Foundation
192.168.1.30\t02:42:ac:11:00:02\t(Unknown: locally administered)
192.168.1.20\tb8:27:eb:12:34:56\tRaspberry Pi Foundation (DUP: 2)

4 packets received by filter, 0 packets dropped by kernel
Ending arp-scan 1.10.0: 256 hosts scanned in 1.923 seconds (133.13 hosts/sec). 3 responded
";

    const BSD_TABLE: &str = "? (192.168.1.1) at aa:bb:cc:dd:ee:1 on en0 ifscope [ethernet]
router.lan (192.168.1.2) at 0:1b:21:a:b:c on en0 ifscope [ethernet]
? (192.168.1.3) at (incomplete) on en0 ifscope [ethernet]
? (192.168.1.255) at ff:ff:ff:ff:ff:ff on en0 ifscope [ethernet]
";

    const LINUX_TABLE: &str = "? (10.0.0.1) at 52:54:00:12:35:02 [ether] on eth0
? (10.0.0.7) at <incomplete> on eth0
";

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff").as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(normalize_mac("0:1b:21:a:b:c").as_deref(), Some("00:1B:21:0A:0B:0C"));
        assert_eq!(normalize_mac("00-1B-21-0A-0B-0C").as_deref(), Some("00:1B:21:0A:0B:0C"));
        assert_eq!(normalize_mac("001b210a0b0c").as_deref(), Some("00:1B:21:0A:0B:0C"));
        assert_eq!(normalize_mac("(incomplete)"), None);
        assert_eq!(normalize_mac("aa:bb:cc"), None);
    }

    #[test]
    fn test_parse_arp_scan() {
        let entries = parse_arp_scan(ARP_SCAN_OUTPUT);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].mac, "AA:BB:CC:DD:EE:01");
        assert_eq!(entries[0].vendor.as_deref(), Some("TP-LINK TECHNOLOGIES CO.,LTD."));
        assert_eq!(entries[1].vendor.as_deref(), Some("Raspberry Pi Foundation"));
        assert_eq!(entries[2].vendor, None);
        assert_eq!(entries[3].vendor.as_deref(), Some("Raspberry Pi Foundation"));
    }

    #[test]
    fn test_parse_bsd_table() {
        let entries = parse_arp_table(BSD_TABLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hostname, None);
        assert_eq!(entries[0].mac, "AA:BB:CC:DD:EE:01");
        assert_eq!(entries[1].hostname.as_deref(), Some("router.lan"));
        assert_eq!(entries[1].mac, "00:1B:21:0A:0B:0C");
    }

    #[test]
    fn test_parse_linux_table() {
        let entries = parse_arp_table(LINUX_TABLE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ip, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[tokio::test]
    async fn test_arp_scan_failure_and_table_map() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("arp-scan", None, Reply::exit(1, "You need to be root"))
                .on("arp", None, Reply::ok(LINUX_TABLE)),
        );
        let prober = ArpProber::new(runner);

        assert!(matches!(
            prober.scan_localnet().await,
            Err(DiscoverError::CommandFailed { code: 1, .. })
        ));
        let table = prober.mac_table().await;
        assert_eq!(
            table.get(&Ipv4Addr::new(10, 0, 0, 1)).map(String::as_str),
            Some("52:54:00:12:35:02")
        );
    }

    #[tokio::test]
    async fn test_arp_scan_keeps_vendor_column() {
        let runner = Arc::new(ScriptedRunner::new().on("arp-scan", None, Reply::ok(ARP_SCAN_OUTPUT)));
        let prober = ArpProber::new(runner.clone());

        let entries = prober.scan_localnet().await.unwrap();
        assert_eq!(entries[1].vendor.as_deref(), Some("Raspberry Pi Foundation"));
        assert_eq!(runner.calls()[0].1, vec!["--localnet".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_arp_binary_yields_empty_table() {
        let prober = ArpProber::new(Arc::new(ScriptedRunner::new()));
        assert!(prober.mac_table().await.is_empty());
    }
}
