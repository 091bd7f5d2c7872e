//! One sweep of a subnet: strategy selection, fallback and enrichment.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use ipnet::Ipv4Net;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use lanwatch_core::{ProbeObservation, ScanConfig, ScanType};

use crate::arp::{ArpEntry, ArpProber};
use crate::classify;
use crate::error::{DiscoverError, Result};
use crate::hostname::{DnsHostnameResolver, HostnameResolver};
use crate::lifecycle::fold_by_ip;
use crate::ping::PingProber;
use crate::process::ProcessRunner;
use crate::scanner::{NmapScanner, DETAIL_PORTS};
use crate::subnet::{default_subnet, RouteSubnetDetector, SubnetDetector};
use crate::vendor::VendorResolver;

/// Hosts per detail-pass invocation.
pub const DETAIL_CHUNK_SIZE: usize = 10;

/// A named way of finding live hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// nmap host discovery with the configured probe methods.
    NmapDiscovery,
    /// One ICMP echo per host.
    IcmpSweep,
    /// `arp-scan` of the local segment.
    ArpScan,
    /// The kernel ARP cache.
    ArpTable,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NmapDiscovery => "nmap",
            Self::IcmpSweep => "icmp",
            Self::ArpScan => "arp-scan",
            Self::ArpTable => "arp-table",
        }
    }

    /// Strategies for `scan_type` in preference order. Everything after the
    /// first entry only runs when fallback is enabled.
    pub fn chain(scan_type: ScanType) -> &'static [Strategy] {
        match scan_type {
            ScanType::Ping | ScanType::Comprehensive => &[Self::NmapDiscovery, Self::IcmpSweep],
            ScanType::Arp => &[Self::ArpScan, Self::ArpTable],
        }
    }
}

/// Result of a completed sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub subnet: Ipv4Net,
    pub scan_type: ScanType,
    pub strategy: Strategy,
    /// False when the probe produced no usable report, so absence from
    /// `observations` says nothing about a host.
    pub complete: bool,
    pub observations: Vec<ProbeObservation>,
}

pub struct DiscoveryEngine {
    nmap: NmapScanner,
    ping: PingProber,
    arp: ArpProber,
    vendors: Arc<VendorResolver>,
    hostnames: Arc<dyn HostnameResolver>,
    subnets: Box<dyn SubnetDetector>,
}

impl DiscoveryEngine {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        nmap: NmapScanner,
        vendors: Arc<VendorResolver>,
    ) -> Self {
        Self {
            nmap,
            ping: PingProber::new(runner.clone()),
            arp: ArpProber::new(runner),
            vendors,
            hostnames: Arc::new(DnsHostnameResolver),
            subnets: Box::new(RouteSubnetDetector),
        }
    }

    pub fn with_hostname_resolver(mut self, resolver: Arc<dyn HostnameResolver>) -> Self {
        self.hostnames = resolver;
        self
    }

    pub fn with_subnet_detector(mut self, detector: Box<dyn SubnetDetector>) -> Self {
        self.subnets = detector;
        self
    }

    pub fn vendors(&self) -> &VendorResolver {
        &self.vendors
    }

    pub fn scanner(&self) -> &NmapScanner {
        &self.nmap
    }

    /// Explicit target, then the manual subnet when auto-detection is off,
    /// then the detected local subnet, then [`default_subnet`].
    ///
    /// A bare address target is treated as a /32.
    pub fn resolve_subnet(&self, target: Option<&str>, config: &ScanConfig) -> Result<Ipv4Net> {
        if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
            if let Ok(ip) = target.parse::<Ipv4Addr>() {
                return Ok(Ipv4Net::from(ip));
            }
            return lanwatch_core::config::parse_cidr(target)
                .map_err(|_| DiscoverError::SubnetResolution(target.to_string()));
        }

        if !config.auto_detect_subnet {
            if let Some(manual) = config.manual_subnet() {
                return Ok(manual);
            }
        }

        Ok(self.subnets.detect().unwrap_or_else(|| {
            tracing::warn!(subnet = %default_subnet(), "Subnet detection failed, using default");
            default_subnet()
        }))
    }

    /// Resolve the target and sweep it.
    pub async fn sweep(
        &self,
        target: Option<&str>,
        scan_type: ScanType,
        config: &ScanConfig,
    ) -> Result<SweepOutcome> {
        let subnet = self.resolve_subnet(target, config)?;
        self.sweep_subnet(subnet, scan_type, config).await
    }

    /// Sweep an already resolved subnet.
    ///
    /// Configuration is validated before anything is spawned. When every
    /// permitted strategy fails the sweep fails with `AllStrategiesFailed`.
    pub async fn sweep_subnet(
        &self,
        subnet: Ipv4Net,
        scan_type: ScanType,
        config: &ScanConfig,
    ) -> Result<SweepOutcome> {
        config.validate()?;
        let exclusions = config.excluded_addrs();
        let start = Instant::now();

        tracing::info!(subnet = %subnet, scan_type = %scan_type, "Starting sweep");

        let (strategy, complete, discovered) = self
            .discover(subnet, scan_type, config, &exclusions)
            .await?;
        let mut observations = fold_by_ip(
            discovered
                .into_iter()
                .filter(|o| subnet.contains(&o.ip) && !exclusions.contains(&o.ip)),
        );

        if scan_type == ScanType::Comprehensive {
            self.detail_pass(&mut observations, config).await;
        }

        self.enrich(&mut observations, config).await;

        if scan_type == ScanType::Comprehensive {
            for obs in &mut observations {
                obs.device_type = classify::classify(obs);
            }
        }

        tracing::info!(
            subnet = %subnet,
            strategy = strategy.name(),
            devices = observations.len(),
            complete,
            duration_ms = start.elapsed().as_millis(),
            "Sweep complete"
        );

        Ok(SweepOutcome {
            subnet,
            scan_type,
            strategy,
            complete,
            observations,
        })
    }

    async fn discover(
        &self,
        subnet: Ipv4Net,
        scan_type: ScanType,
        config: &ScanConfig,
        exclusions: &HashSet<Ipv4Addr>,
    ) -> Result<(Strategy, bool, Vec<ProbeObservation>)> {
        let chain = Strategy::chain(scan_type);
        let permitted = if config.fallback_enabled { chain } else { &chain[..1] };
        let mut last_failure = None;

        for strategy in permitted {
            match self.run_strategy(*strategy, subnet, config, exclusions).await {
                Ok(observations) => return Ok((*strategy, true, observations)),
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        subnet = %subnet,
                        error = %e,
                        "Probe strategy failed"
                    );
                    last_failure = Some((*strategy, e));
                }
            }
        }

        match last_failure {
            // an unreadable report means nothing was learned, not that the
            // backend is gone; the result must not demote anyone
            Some((strategy, DiscoverError::XmlParse(_))) => Ok((strategy, false, Vec::new())),
            _ => Err(DiscoverError::AllStrategiesFailed {
                subnet: subnet.to_string(),
            }),
        }
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        subnet: Ipv4Net,
        config: &ScanConfig,
        exclusions: &HashSet<Ipv4Addr>,
    ) -> Result<Vec<ProbeObservation>> {
        match strategy {
            Strategy::NmapDiscovery => {
                let mut excluded: Vec<Ipv4Addr> = exclusions.iter().copied().collect();
                excluded.sort();
                let run = self
                    .nmap
                    .ping_sweep(&subnet.to_string(), config, &excluded)
                    .await?;
                Ok(run.observations())
            }
            Strategy::IcmpSweep => {
                let hosts = subnet.hosts().filter(|ip| !exclusions.contains(ip)).collect();
                self.ping
                    .sweep(hosts, config.max_workers, config.host_timeout())
                    .await
            }
            Strategy::ArpScan => Ok(arp_observations(self.arp.scan_localnet().await?)),
            Strategy::ArpTable => Ok(arp_observations(self.arp.read_table().await?)),
        }
    }

    /// Port/service/OS detection over the live hosts, in fixed-size chunks.
    /// A failed chunk keeps its discovery observations unchanged.
    async fn detail_pass(&self, observations: &mut [ProbeObservation], config: &ScanConfig) {
        let ports = if config.enable_port_scan {
            config.port_range.as_str()
        } else {
            DETAIL_PORTS
        };
        let index: HashMap<Ipv4Addr, usize> = observations
            .iter()
            .enumerate()
            .map(|(i, o)| (o.ip, i))
            .collect();
        let live: Vec<Ipv4Addr> = observations.iter().map(|o| o.ip).collect();

        for (n, chunk) in live.chunks(DETAIL_CHUNK_SIZE).enumerate() {
            let run = match self.nmap.port_scan(chunk, ports, config).await {
                Ok(run) => run,
                Err(e) => {
                    tracing::warn!(chunk = n, hosts = chunk.len(), error = %e, "Detail chunk failed");
                    continue;
                }
            };

            for detailed in run.observations() {
                if let Some(&i) = index.get(&detailed.ip) {
                    let discovered = std::mem::replace(&mut observations[i], detailed);
                    observations[i].absorb(discovered);
                }
            }
        }
    }

    /// Fill hardware address, hostname and vendor. Never touches liveness.
    async fn enrich(&self, observations: &mut [ProbeObservation], config: &ScanConfig) {
        if config.arp_lookup_enabled && observations.iter().any(|o| o.mac.is_none()) {
            let table = self.arp.mac_table().await;
            for obs in observations.iter_mut().filter(|o| o.mac.is_none()) {
                obs.mac = table.get(&obs.ip).cloned();
            }
        }

        if config.resolve_hostnames {
            self.resolve_hostnames(observations, config.max_workers).await;
        }

        if config.fetch_vendor_info {
            for obs in observations.iter_mut().filter(|o| o.vendor.is_none()) {
                obs.vendor = obs.mac.as_deref().and_then(|mac| self.vendors.resolve(mac));
            }
        }
    }

    async fn resolve_hostnames(&self, observations: &mut [ProbeObservation], workers: usize) {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for (i, obs) in observations.iter().enumerate().filter(|(_, o)| o.hostname.is_none()) {
            let resolver = self.hostnames.clone();
            let semaphore = semaphore.clone();
            let ip = obs.ip;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                resolver.reverse(ip).await.map(|name| (i, name))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some((i, name))) = joined {
                observations[i].hostname = Some(name);
            }
        }
    }

    /// Probe a single host: nmap detail scan first, one ping as fallback.
    pub async fn probe_host(
        &self,
        ip: Ipv4Addr,
        config: &ScanConfig,
    ) -> Result<Option<ProbeObservation>> {
        config.validate()?;

        let detailed = match self.nmap.port_scan(&[ip], DETAIL_PORTS, config).await {
            Ok(run) => Ok(run.observations().into_iter().find(|o| o.ip == ip)),
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "Detail probe failed");
                Err(e)
            }
        };

        let found = match detailed {
            Ok(Some(obs)) => Some(obs),
            Ok(None) if !config.fallback_enabled => None,
            Err(e) if !config.fallback_enabled => return Err(e),
            _ => self.ping.probe_host(ip, config.host_timeout()).await?,
        };

        let Some(obs) = found else {
            return Ok(None);
        };
        let mut batch = [obs];
        self.enrich(&mut batch, config).await;
        let [mut obs] = batch;
        obs.device_type = classify::classify(&obs);
        Ok(Some(obs))
    }
}

fn arp_observations(entries: Vec<ArpEntry>) -> Vec<ProbeObservation> {
    entries.into_iter().map(ArpEntry::into_observation).collect()
}
