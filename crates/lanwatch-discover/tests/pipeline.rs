//! End-to-end sweeps through the orchestrator with scripted processes and
//! the in-memory store.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use lanwatch_core::{ScanConfig, ScanType};
use lanwatch_discover::config::DiscoverConfig;
use lanwatch_discover::hostname::NoHostnames;
use lanwatch_discover::scanner::NmapScanner;
use lanwatch_discover::subnet::FixedSubnet;
use lanwatch_discover::vendor::VendorResolver;
use lanwatch_discover::{
    DiscoverError, DiscoveryEngine, LifecycleManager, MonitorService, ProcessOutput,
    ProcessRunner, ScanOrchestrator, SweepStatus,
};
use lanwatch_store::{DeviceRepository, MemoryStore, StaticVendorSource};

/// Hands out queued nmap reports in order; every other program is missing.
struct QueuedNmap {
    reports: Mutex<VecDeque<String>>,
    delay: Duration,
}

impl QueuedNmap {
    fn new(reports: &[&str], delay: Duration) -> Self {
        Self {
            reports: Mutex::new(reports.iter().map(|r| r.to_string()).collect()),
            delay,
        }
    }
}

#[async_trait]
impl ProcessRunner for QueuedNmap {
    async fn run(
        &self,
        program: &str,
        _args: &[String],
        _timeout: Option<Duration>,
    ) -> lanwatch_discover::Result<ProcessOutput> {
        if program != "nmap" {
            return Err(DiscoverError::Spawn {
                program: program.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        tokio::time::sleep(self.delay).await;
        let report = self.reports.lock().unwrap().pop_front().unwrap_or_default();
        Ok(ProcessOutput {
            code: Some(0),
            stdout: report.into_bytes(),
            stderr: Vec::new(),
        })
    }
}

fn report(hosts: &[(&str, Option<&str>)]) -> String {
    let body: String = hosts
        .iter()
        .map(|(ip, mac)| {
            let mac = mac
                .map(|m| format!(r#"<address addr="{m}" addrtype="mac"/>"#))
                .unwrap_or_default();
            format!(
                r#"<host><status state="up" reason="echo-reply"/><address addr="{ip}" addrtype="ipv4"/>{mac}<times srtt="2000" rttvar="500" to="100000"/></host>"#
            )
        })
        .collect();
    format!(r#"<?xml version="1.0"?><nmaprun scanner="nmap">{body}</nmaprun>"#)
}

fn service(runner: QueuedNmap) -> (MonitorService, Arc<MemoryStore>) {
    let runner = Arc::new(runner);
    let store = Arc::new(MemoryStore::new());
    let engine = DiscoveryEngine::new(
        runner.clone(),
        NmapScanner::new("nmap", runner),
        Arc::new(VendorResolver::new(Box::new(StaticVendorSource::new([(
            "B827EB",
            "Raspberry Pi Foundation",
        )])))),
    )
    .with_hostname_resolver(Arc::new(NoHostnames))
    .with_subnet_detector(Box::new(FixedSubnet(Some("192.168.1.0/24".parse().unwrap()))));

    let settings = DiscoverConfig {
        scan: ScanConfig {
            arp_lookup_enabled: false,
            ..ScanConfig::default()
        },
        ..DiscoverConfig::default()
    };
    let orchestrator = ScanOrchestrator::new(
        engine,
        LifecycleManager::new(store.clone(), store.clone()),
        store.clone(),
        &settings,
    )
    .unwrap();
    (MonitorService::new(orchestrator, store.clone()), store)
}

#[tokio::test]
async fn test_sweeps_track_presence_and_timeline() {
    let first = report(&[
        ("192.168.1.1", Some("aa:bb:cc:00:00:01")),
        ("192.168.1.20", Some("b8:27:eb:00:00:20")),
    ]);
    let second = report(&[("192.168.1.1", Some("aa:bb:cc:00:00:01"))]);
    let (service, store) = service(QueuedNmap::new(&[&first, &second], Duration::ZERO));

    let r1 = service.sweep_and_wait(None, ScanType::Ping).await;
    assert_eq!(r1.status, SweepStatus::Success);
    assert_eq!(r1.devices_found, Some(2));

    let pi = store
        .get_by_address(Ipv4Addr::new(192, 168, 1, 20))
        .unwrap()
        .unwrap();
    assert_eq!(pi.vendor.as_deref(), Some("Raspberry Pi Foundation"));
    assert!(pi.is_online);

    let r2 = service.sweep_and_wait(None, ScanType::Ping).await;
    assert_eq!(r2.status, SweepStatus::Success);

    let pi = service.device(pi.id).unwrap();
    assert!(!pi.is_online);
    assert_eq!(service.online_devices().unwrap().len(), 1);

    let intervals = service
        .reconstruct_timeline(pi.id, Utc::now().date_naive())
        .unwrap();
    assert_eq!(intervals.len(), 1);
    assert!(intervals[0].end.is_some());

    let stats = service.network_stats().unwrap();
    assert_eq!((stats.total_devices, stats.online_devices), (2, 1));
    assert_eq!(service.recent_sessions(10).unwrap().len(), 2);

    service.update_alias(pi.id, "Pi-hole").unwrap();
    let hits = service.search_devices("pi-hole").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].display_name(), "Pi-hole");
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected_without_second_session() {
    let xml = report(&[("192.168.1.1", None)]);
    let (service, _) = service(QueuedNmap::new(&[&xml, &xml], Duration::from_millis(200)));

    let (first, second) = tokio::join!(service.sweep_and_wait(None, ScanType::Ping), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.sweep_and_wait(None, ScanType::Ping).await
    });

    assert_eq!(first.status, SweepStatus::Success);
    assert_eq!(second.status, SweepStatus::Rejected);
    assert_eq!(service.recent_sessions(10).unwrap().len(), 1);
    assert!(!service.get_scan_status().scanning);
}

#[tokio::test]
async fn test_background_sweep_and_config_updates() {
    let xml = report(&[("192.168.1.5", None)]);
    let (service, _) = service(QueuedNmap::new(&[&xml], Duration::from_millis(50)));

    assert_eq!(service.sweep_now(None, ScanType::Ping).status, SweepStatus::Started);
    assert_eq!(service.sweep_now(None, ScanType::Ping).status, SweepStatus::Rejected);
    while service.get_scan_status().scanning {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(service.devices().unwrap().len(), 1);

    let invalid = ScanConfig {
        scan_timeout: "soon".to_string(),
        ..service.get_config()
    };
    assert!(service.apply_config(invalid).is_err());
    assert!(service.set_scan_interval(30).is_err());

    let fast = service.load_preset("fast").unwrap();
    assert!(!fast.resolve_hostnames);
    assert_eq!(service.get_config().scan_rate, 300);
}

#[tokio::test]
async fn test_repeated_host_in_report_is_one_device() {
    let xml = report(&[
        ("192.168.1.7", Some("aa:bb:cc:00:00:07")),
        ("192.168.1.7", None),
    ]);
    let (service, store) = service(QueuedNmap::new(&[&xml], Duration::ZERO));

    let r = service.sweep_and_wait(None, ScanType::Ping).await;
    assert_eq!(r.devices_found, Some(1));

    let devices = service.devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].mac_address.as_deref(), Some("AA:BB:CC:00:00:07"));
    assert_eq!(service.device_history(devices[0].id, 1).unwrap().len(), 1);
    assert_eq!(store.record_count(), 1);
}

#[tokio::test]
async fn test_unreadable_report_keeps_devices_online() {
    let good = report(&[("192.168.1.1", None), ("192.168.1.2", None)]);
    let (service, _) = service(QueuedNmap::new(&[&good, "<nmaprun><host>"], Duration::ZERO));

    service.sweep_and_wait(None, ScanType::Ping).await;
    assert_eq!(service.online_devices().unwrap().len(), 2);

    service.sweep_and_wait(None, ScanType::Ping).await;
    assert_eq!(service.online_devices().unwrap().len(), 2);
}
