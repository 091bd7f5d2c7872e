//! Folds sweep observations into persistent device state.
//!
//! Positives are applied first; only then are devices missing from the
//! batch demoted, so a partial result inside a sweep never flaps a device.
//! Batches that are not authoritative never demote.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use ipnet::Ipv4Net;
use serde::Serialize;

use lanwatch_core::{Device, DeviceId, ProbeObservation, ScanRecord};
use lanwatch_store::{DeviceRepository, NetworkStats, SessionRepository};

use crate::arp::normalize_mac;
use crate::error::{DiscoverError, Result};

/// One sweep's worth of observations.
#[derive(Debug, Clone)]
pub struct ObservationBatch {
    pub scan_time: DateTime<Utc>,
    /// Devices outside this network are never demoted by the batch.
    /// `None` means the batch covers every known device.
    pub subnet: Option<Ipv4Net>,
    /// Whether absence from `observations` means the host is gone.
    pub complete: bool,
    pub observations: Vec<ProbeObservation>,
}

/// Merge observations sharing an address, keeping first-seen order.
///
/// A host is live if any of its observations is; other fields are
/// back-filled from later duplicates.
pub fn fold_by_ip(observations: impl IntoIterator<Item = ProbeObservation>) -> Vec<ProbeObservation> {
    let mut folded: Vec<ProbeObservation> = Vec::new();
    let mut index: HashMap<Ipv4Addr, usize> = HashMap::new();

    for obs in observations {
        match index.get(&obs.ip) {
            Some(&i) => {
                let merged = &mut folded[i];
                merged.is_online |= obs.is_online;
                merged.absorb(obs);
            }
            None => {
                index.insert(obs.ip, folded.len());
                folded.push(obs);
            }
        }
    }
    folded
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub marked_offline: usize,
}

/// Sole writer of `Device` and `ScanRecord`.
pub struct LifecycleManager {
    devices: Arc<dyn DeviceRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl LifecycleManager {
    pub fn new(devices: Arc<dyn DeviceRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { devices, sessions }
    }

    /// Fold a sweep into device state and history with one store write.
    pub fn apply_observations(&self, batch: &ObservationBatch) -> Result<ApplySummary> {
        let observations = fold_by_ip(batch.observations.iter().cloned());
        let mut summary = ApplySummary::default();
        let mut observed: HashSet<Ipv4Addr> = HashSet::new();
        let mut devices = Vec::with_capacity(observations.len());
        let mut records = Vec::with_capacity(observations.len());

        for obs in &observations {
            let device = match self.devices.get_by_address(obs.ip)? {
                Some(mut existing) => {
                    existing.merge_observation(obs, batch.scan_time);
                    summary.updated += 1;
                    existing
                }
                None => {
                    summary.created += 1;
                    Device::from_observation(obs, batch.scan_time)
                }
            };
            records.push(ScanRecord::new(
                device.id,
                batch.scan_time,
                obs.is_online,
                obs.response_time_ms,
            ));
            devices.push(device);
            observed.insert(obs.ip);
        }

        if batch.complete {
            for mut device in self.devices.list_online()? {
                let in_scope = batch
                    .subnet
                    .map_or(true, |net| net.contains(&device.ip_address));
                if !in_scope || observed.contains(&device.ip_address) {
                    continue;
                }

                device.is_online = false;
                device.last_seen = batch.scan_time;
                records.push(ScanRecord::new(device.id, batch.scan_time, false, None));
                summary.marked_offline += 1;
                tracing::info!(device_id = %device.id, ip = %device.ip_address, "Device went offline");
                devices.push(device);
            }
        } else {
            tracing::warn!(
                observations = observations.len(),
                "Incomplete observation batch, no devices demoted"
            );
        }

        self.devices.record_sweep(&devices, &records)?;

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            marked_offline = summary.marked_offline,
            "Applied observation batch"
        );
        Ok(summary)
    }

    /// Set or clear (empty/whitespace name) the alias of a device.
    pub fn update_alias(&self, id: DeviceId, name: &str) -> Result<Device> {
        let device = self
            .devices
            .get_by_id(id)?
            .ok_or_else(|| DiscoverError::device_not_found(id))?;
        self.store_alias(device, name)
    }

    pub fn update_alias_by_mac(&self, mac: &str, name: &str) -> Result<Device> {
        let key = normalize_mac(mac).unwrap_or_else(|| mac.trim().to_string());
        let device = self
            .devices
            .get_by_mac(&key)?
            .ok_or_else(|| DiscoverError::DeviceNotFound(mac.to_string()))?;
        self.store_alias(device, name)
    }

    fn store_alias(&self, mut device: Device, name: &str) -> Result<Device> {
        let name = name.trim();
        device.custom_name = (!name.is_empty()).then(|| name.to_string());
        self.devices.upsert(&device)?;
        Ok(device)
    }

    pub fn device(&self, id: DeviceId) -> Result<Device> {
        self.devices
            .get_by_id(id)?
            .ok_or_else(|| DiscoverError::device_not_found(id))
    }

    pub fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.list_all()?)
    }

    pub fn online_devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.list_online()?)
    }

    /// Records for one device over the last `hours`, newest first.
    pub fn device_history(&self, id: DeviceId, hours: u32) -> Result<Vec<ScanRecord>> {
        self.device(id)?;
        let to = Utc::now();
        let from = to - TimeDelta::hours(i64::from(hours));
        let mut records = self.devices.history(id, from, to)?;
        records.sort_by(|a, b| b.scan_time.cmp(&a.scan_time));
        Ok(records)
    }

    /// Retention: drop history older than `cutoff`.
    pub fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(self.devices.prune_history(cutoff)?)
    }

    /// Case-insensitive match on address, hardware address, hostname,
    /// alias or vendor.
    pub fn search(&self, query: &str) -> Result<Vec<Device>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.devices();
        }

        Ok(self
            .devices
            .list_all()?
            .into_iter()
            .filter(|d| {
                d.ip_address.to_string().contains(&needle)
                    || [&d.mac_address, &d.hostname, &d.custom_name, &d.vendor]
                        .into_iter()
                        .flatten()
                        .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect())
    }

    /// Device counters plus sessions started in the last 24 hours.
    pub fn network_stats(&self) -> Result<NetworkStats> {
        let devices = self.devices.list_all()?;
        let online = devices.iter().filter(|d| d.is_online).count();
        let since = Utc::now() - TimeDelta::hours(24);
        let recent_scans = self
            .sessions
            .recent_sessions(usize::MAX)?
            .iter()
            .take_while(|s| s.start_time >= since)
            .count();

        Ok(NetworkStats {
            total_devices: devices.len(),
            online_devices: online,
            offline_devices: devices.len() - online,
            recent_scans,
        })
    }
}
