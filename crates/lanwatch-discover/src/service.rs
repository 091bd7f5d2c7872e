//! The operations exposed to front ends (CLI, HTTP layer).

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use lanwatch_core::config::parse_cidr;
use lanwatch_core::{
    Device, DeviceId, OnlineInterval, ProbeObservation, ScanConfig, ScanPreset, ScanRecord,
    ScanSession, ScanType,
};
use lanwatch_store::{
    ConfigRepository, DeviceRepository, NetworkStats, SessionRepository, VendorSource,
};

use crate::config::DiscoverConfig;
use crate::engine::DiscoveryEngine;
use crate::error::Result;
use crate::lifecycle::LifecycleManager;
use crate::process::ProcessRunner;
use crate::scanner::NmapScanner;
use crate::scheduler::{ScanOrchestrator, ScanStatus, SweepReport};
use crate::timeline::{DeviceTimeline, TimelineReconstructor};
use crate::vendor::VendorResolver;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PresetInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub fn available_presets() -> Vec<PresetInfo> {
    ScanPreset::ALL
        .iter()
        .map(|p| PresetInfo {
            name: p.name(),
            display_name: p.display_name(),
            description: p.description(),
        })
        .collect()
}

/// Outcome of checking a JSON scan configuration without applying it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_config(json: &str) -> ConfigValidation {
    match ScanConfig::from_json(json) {
        Ok(_) => ConfigValidation {
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidation {
            valid: false,
            errors: vec![e.to_string()],
        },
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NetworkSummary {
    pub network: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    /// Addresses minus network and broadcast; 0 for /31 and /32.
    pub num_hosts: u64,
    pub prefix_length: u8,
}

/// Describe a CIDR the way a sweep would see it. Host bits are truncated.
pub fn test_network_config(cidr: &str) -> Result<NetworkSummary> {
    let net = parse_cidr(cidr)?;
    let addresses = 1u64 << (32 - u32::from(net.prefix_len()));
    Ok(NetworkSummary {
        network: net.network(),
        broadcast: net.broadcast(),
        num_hosts: addresses.saturating_sub(2),
        prefix_length: net.prefix_len(),
    })
}

#[derive(Clone)]
pub struct MonitorService {
    orchestrator: ScanOrchestrator,
    timelines: Arc<TimelineReconstructor>,
}

impl MonitorService {
    pub fn new(orchestrator: ScanOrchestrator, devices: Arc<dyn DeviceRepository>) -> Self {
        Self {
            orchestrator,
            timelines: Arc::new(TimelineReconstructor::new(devices)),
        }
    }

    /// Wire the full pipeline over one store. A scan configuration saved in
    /// the store takes precedence over `settings.scan`. A startup preset
    /// overrides both and is saved.
    pub fn build<S>(
        settings: &DiscoverConfig,
        store: Arc<S>,
        runner: Arc<dyn ProcessRunner>,
        vendors: Box<dyn VendorSource>,
    ) -> Result<Self>
    where
        S: DeviceRepository + SessionRepository + ConfigRepository + 'static,
    {
        let engine = DiscoveryEngine::new(
            runner.clone(),
            NmapScanner::from_config(settings, runner),
            Arc::new(VendorResolver::new(vendors)),
        );
        let lifecycle = LifecycleManager::new(store.clone(), store.clone());
        let orchestrator =
            ScanOrchestrator::persistent(engine, lifecycle, store.clone(), store.clone(), settings)?;

        if let Some(preset) = &settings.preset {
            orchestrator.load_preset(preset)?;
        }
        Ok(Self::new(orchestrator, store))
    }

    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }

    /// Start a sweep in the background. Returns `started` or `rejected`.
    pub fn sweep_now(&self, target: Option<String>, scan_type: ScanType) -> SweepReport {
        self.orchestrator.start_scan(target, scan_type)
    }

    /// Run a sweep and wait for it. Returns `success`, `error` or `rejected`.
    pub async fn sweep_and_wait(&self, target: Option<String>, scan_type: ScanType) -> SweepReport {
        self.orchestrator.trigger_scan(target, scan_type).await
    }

    pub fn get_scan_status(&self) -> ScanStatus {
        self.orchestrator.status()
    }

    pub fn set_scan_interval(&self, seconds: u64) -> Result<()> {
        self.orchestrator.set_scan_interval(seconds)
    }

    pub fn apply_config(&self, config: ScanConfig) -> Result<()> {
        self.orchestrator.apply_config(config)
    }

    pub fn get_config(&self) -> ScanConfig {
        self.orchestrator.config()
    }

    pub fn load_preset(&self, name: &str) -> Result<ScanConfig> {
        self.orchestrator.load_preset(name)
    }

    pub fn available_presets(&self) -> Vec<PresetInfo> {
        available_presets()
    }

    pub fn validate_config(&self, json: &str) -> ConfigValidation {
        validate_config(json)
    }

    pub fn test_network_config(&self, cidr: &str) -> Result<NetworkSummary> {
        test_network_config(cidr)
    }

    pub fn reconstruct_timeline(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Vec<OnlineInterval>> {
        self.timelines.reconstruct_timeline(device_id, date)
    }

    pub fn day_timeline(&self, date: NaiveDate) -> Result<Vec<DeviceTimeline>> {
        self.timelines.day_timeline(date)
    }

    pub fn devices(&self) -> Result<Vec<Device>> {
        self.orchestrator.lifecycle().devices()
    }

    pub fn online_devices(&self) -> Result<Vec<Device>> {
        self.orchestrator.lifecycle().online_devices()
    }

    pub fn device(&self, id: DeviceId) -> Result<Device> {
        self.orchestrator.lifecycle().device(id)
    }

    /// Scan records for one device over the last `hours`, newest first.
    pub fn device_history(&self, id: DeviceId, hours: u32) -> Result<Vec<ScanRecord>> {
        self.orchestrator.lifecycle().device_history(id, hours)
    }

    pub fn search_devices(&self, query: &str) -> Result<Vec<Device>> {
        self.orchestrator.lifecycle().search(query)
    }

    pub fn update_alias(&self, id: DeviceId, name: &str) -> Result<Device> {
        self.orchestrator.lifecycle().update_alias(id, name)
    }

    pub fn update_alias_by_mac(&self, mac: &str, name: &str) -> Result<Device> {
        self.orchestrator.lifecycle().update_alias_by_mac(mac, name)
    }

    pub fn network_stats(&self) -> Result<NetworkStats> {
        self.orchestrator.lifecycle().network_stats()
    }

    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<ScanSession>> {
        self.orchestrator.recent_sessions(limit)
    }

    /// Probe one host with the current configuration. Nothing is persisted.
    pub async fn probe_host(&self, ip: Ipv4Addr) -> Result<Option<ProbeObservation>> {
        let config = self.orchestrator.config();
        self.orchestrator.engine().probe_host(ip, &config).await
    }

    pub fn reload_vendors(&self) -> Result<usize> {
        self.orchestrator.engine().vendors().reload()
    }

    pub async fn nmap_version(&self) -> Result<String> {
        self.orchestrator.engine().scanner().verify_installation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiscoverError;
    use crate::nmap_xml::fixtures::PING_SWEEP_XML;
    use crate::process::scripted::{Reply, ScriptedRunner};
    use lanwatch_core::ConfigError;
    use lanwatch_store::{JsonFileStore, MemoryStore, StaticVendorSource};

    fn offline_settings() -> DiscoverConfig {
        let mut settings = DiscoverConfig::default();
        settings.scan.arp_lookup_enabled = false;
        settings.scan.fallback_enabled = false;
        settings.scan.resolve_hostnames = false;
        settings.scan.auto_detect_subnet = false;
        settings.scan.subnet_cidr = Some("192.168.1.0/24".to_string());
        settings
    }

    #[test]
    fn test_available_presets() {
        let names: Vec<_> = available_presets().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["fast", "balanced", "thorough", "stealth"]);
    }

    #[tokio::test]
    async fn test_build_applies_startup_preset() {
        let settings = DiscoverConfig {
            preset: Some("thorough".to_string()),
            ..DiscoverConfig::default()
        };
        let service = MonitorService::build(
            &settings,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedRunner::new()),
            Box::new(StaticVendorSource::default()),
        )
        .unwrap();

        assert_eq!(service.get_config(), ScanPreset::Thorough.config());
        assert_eq!(service.get_scan_status().interval_seconds, 300);
        assert!(service.nmap_version().await.is_err());
    }

    #[test]
    fn test_build_rejects_short_interval() {
        let settings = DiscoverConfig {
            scan_interval_secs: 10,
            ..DiscoverConfig::default()
        };
        let built = MonitorService::build(
            &settings,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedRunner::new()),
            Box::new(StaticVendorSource::default()),
        );
        assert!(built.is_err());
    }

    #[test]
    fn test_validate_config() {
        let ok = validate_config(r#"{"max_workers": 20, "scan_timeout": "500ms"}"#);
        assert!(ok.valid);
        assert!(ok.errors.is_empty());

        let bad = validate_config(r#"{"max_workers": 0}"#);
        assert!(!bad.valid);
        assert_eq!(bad.errors.len(), 1);

        assert!(!validate_config("{not json").valid);
    }

    #[test]
    fn test_network_summary() {
        let summary = test_network_config("192.168.1.77/24").unwrap();
        assert_eq!(summary.network, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(summary.broadcast, Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(summary.num_hosts, 254);
        assert_eq!(summary.prefix_length, 24);

        assert_eq!(test_network_config("10.0.0.1/32").unwrap().num_hosts, 0);
        assert_eq!(test_network_config("10.0.0.0/8").unwrap().num_hosts, 16_777_214);
        assert!(matches!(
            test_network_config("10.0.0/33"),
            Err(DiscoverError::Config(ConfigError::InvalidCidr(_)))
        ));
    }

    #[tokio::test]
    async fn test_device_history_over_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        let service = MonitorService::build(
            &offline_settings(),
            store,
            Arc::new(ScriptedRunner::new().on("nmap", None, Reply::ok(PING_SWEEP_XML))),
            Box::new(StaticVendorSource::default()),
        )
        .unwrap();
        service.sweep_and_wait(None, ScanType::Ping).await;
        service.sweep_and_wait(None, ScanType::Ping).await;

        let gateway = service
            .devices()
            .unwrap()
            .into_iter()
            .find(|d| d.ip_address == Ipv4Addr::new(192, 168, 1, 1))
            .unwrap();
        let history = service.device_history(gateway.id, 24).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].scan_time >= history[1].scan_time);
        assert!(history.iter().all(|r| r.device_id == gateway.id && r.is_online));

        assert!(matches!(
            service.device_history(DeviceId::new(), 24),
            Err(DiscoverError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_config_changes_survive_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let build = || {
            MonitorService::build(
                &offline_settings(),
                Arc::new(JsonFileStore::open(dir.path()).unwrap()),
                Arc::new(ScriptedRunner::new()),
                Box::new(StaticVendorSource::default()),
            )
            .unwrap()
        };

        let stealth = build().load_preset("stealth").unwrap();
        assert_eq!(build().get_config(), stealth);
    }
}
