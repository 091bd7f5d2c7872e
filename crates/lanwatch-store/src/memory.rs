//! In-memory repository backend.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use lanwatch_core::{Device, DeviceId, ScanConfig, ScanRecord, ScanSession};

use crate::repository::{ConfigRepository, DeviceRepository, SessionRepository, StoreError};

#[derive(Debug, Default)]
struct DeviceTable {
    by_id: HashMap<DeviceId, Device>,
    by_ip: HashMap<Ipv4Addr, DeviceId>,
}

/// Thread-safe store holding everything in process memory.
///
/// Readers never block each other; a write holds the lock for a single
/// collection only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<DeviceTable>,
    records: RwLock<Vec<ScanRecord>>,
    sessions: RwLock<Vec<ScanSession>>,
    scan_config: RwLock<Option<ScanConfig>>,
}

impl DeviceTable {
    fn insert(&mut self, device: &Device) {
        let moved_from = self
            .by_id
            .get(&device.id)
            .map(|d| d.ip_address)
            .filter(|ip| *ip != device.ip_address);
        if let Some(old_ip) = moved_from {
            self.by_ip.remove(&old_ip);
        }
        self.by_ip.insert(device.ip_address, device.id);
        self.by_id.insert(device.id, device.clone());
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted collections.
    pub fn from_parts(
        devices: Vec<Device>,
        records: Vec<ScanRecord>,
        sessions: Vec<ScanSession>,
    ) -> Self {
        let mut table = DeviceTable::default();
        for device in devices {
            table.by_ip.insert(device.ip_address, device.id);
            table.by_id.insert(device.id, device);
        }
        Self {
            devices: RwLock::new(table),
            records: RwLock::new(records),
            sessions: RwLock::new(sessions),
            scan_config: RwLock::new(None),
        }
    }

    pub fn with_scan_config(self, config: Option<ScanConfig>) -> Self {
        *self.scan_config.write() = config;
        self
    }

    pub fn devices_snapshot(&self) -> Vec<Device> {
        self.devices.read().by_id.values().cloned().collect()
    }

    pub fn records_snapshot(&self) -> Vec<ScanRecord> {
        self.records.read().clone()
    }

    pub fn sessions_snapshot(&self) -> Vec<ScanSession> {
        self.sessions.read().clone()
    }

    /// Number of history records across all devices.
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }
}

impl DeviceRepository for MemoryStore {
    fn get_by_address(&self, ip: Ipv4Addr) -> Result<Option<Device>, StoreError> {
        let table = self.devices.read();
        Ok(table
            .by_ip
            .get(&ip)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.read().by_id.get(&id).cloned())
    }

    fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .by_id
            .values()
            .find(|d| {
                d.mac_address
                    .as_deref()
                    .is_some_and(|m| m.eq_ignore_ascii_case(mac))
            })
            .cloned())
    }

    fn upsert(&self, device: &Device) -> Result<(), StoreError> {
        self.devices.write().insert(device);
        Ok(())
    }

    fn list_online(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .by_id
            .values()
            .filter(|d| d.is_online)
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Device>, StoreError> {
        let mut devices = self.devices_snapshot();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(devices)
    }

    fn append_history(&self, record: &ScanRecord) -> Result<(), StoreError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    fn record_sweep(&self, devices: &[Device], records: &[ScanRecord]) -> Result<(), StoreError> {
        let mut table = self.devices.write();
        for device in devices {
            table.insert(device);
        }
        drop(table);
        self.records.write().extend_from_slice(records);
        Ok(())
    }

    fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.scan_time >= cutoff);
        Ok(before - records.len())
    }

    fn history(
        &self,
        device_id: DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.device_id == device_id && r.scan_time >= from && r.scan_time <= to)
            .cloned()
            .collect())
    }
}

impl SessionRepository for MemoryStore {
    fn create_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        self.sessions.write().push(session.clone());
        Ok(())
    }

    fn update_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(StoreError::SessionNotFound(session.id)),
        }
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<ScanSession>, StoreError> {
        let mut sessions = self.sessions_snapshot();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|s| s.start_time >= cutoff);
        Ok(before - sessions.len())
    }
}

impl ConfigRepository for MemoryStore {
    fn load_scan_config(&self) -> Result<Option<ScanConfig>, StoreError> {
        Ok(self.scan_config.read().clone())
    }

    fn save_scan_config(&self, config: &ScanConfig) -> Result<(), StoreError> {
        *self.scan_config.write() = Some(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use lanwatch_core::{ProbeObservation, ScanType};

    fn device(ip: [u8; 4], at: DateTime<Utc>) -> Device {
        Device::from_observation(&ProbeObservation::online(Ipv4Addr::from(ip)), at)
    }

    #[test]
    fn test_upsert_and_lookup_by_address() {
        let store = MemoryStore::new();
        let d = device([192, 168, 1, 5], Utc::now());
        store.upsert(&d).unwrap();

        let found = store.get_by_address(Ipv4Addr::new(192, 168, 1, 5)).unwrap();
        assert_eq!(found.map(|f| f.id), Some(d.id));
        assert!(store
            .get_by_address(Ipv4Addr::new(192, 168, 1, 6))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upsert_moves_ip_index() {
        let store = MemoryStore::new();
        let mut d = device([10, 0, 0, 1], Utc::now());
        store.upsert(&d).unwrap();
        d.ip_address = Ipv4Addr::new(10, 0, 0, 2);
        store.upsert(&d).unwrap();

        assert!(store.get_by_address(Ipv4Addr::new(10, 0, 0, 1)).unwrap().is_none());
        assert!(store.get_by_address(Ipv4Addr::new(10, 0, 0, 2)).unwrap().is_some());
    }

    #[test]
    fn test_mac_lookup_ignores_case() {
        let store = MemoryStore::new();
        let mut d = device([10, 0, 0, 3], Utc::now());
        d.mac_address = Some("AA:BB:CC:00:11:22".to_string());
        store.upsert(&d).unwrap();

        assert!(store.get_by_mac("aa:bb:cc:00:11:22").unwrap().is_some());
        assert!(store.get_by_mac("aa:bb:cc:00:11:23").unwrap().is_none());
    }

    #[test]
    fn test_list_online_and_all() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = device([10, 0, 0, 1], now - TimeDelta::minutes(10));
        let mut b = device([10, 0, 0, 2], now);
        b.is_online = false;
        store.upsert(&a).unwrap();
        store.upsert(&b).unwrap();

        let online = store.list_online().unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, a.id);

        let all = store.list_all().unwrap();
        assert_eq!(all[0].id, b.id, "newest last_seen first");
    }

    #[test]
    fn test_history_filters_by_device_and_range() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = DeviceId::new();
        let b = DeviceId::new();
        store.append_history(&ScanRecord::new(a, now - TimeDelta::hours(2), true, None)).unwrap();
        store.append_history(&ScanRecord::new(a, now, false, None)).unwrap();
        store.append_history(&ScanRecord::new(b, now, true, Some(1.2))).unwrap();

        let recent = store.history(a, now - TimeDelta::hours(1), now).unwrap();
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].is_online);
    }

    #[test]
    fn test_session_update_requires_existing() {
        let store = MemoryStore::new();
        let mut session = ScanSession::open("10.0.0.0/24", ScanType::Ping, Utc::now());
        assert!(matches!(
            store.update_session(&session),
            Err(StoreError::SessionNotFound(_))
        ));

        store.create_session(&session).unwrap();
        session.devices_found = 4;
        session.end_time = Some(Utc::now());
        store.update_session(&session).unwrap();

        let recent = store.recent_sessions(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].is_sealed());
        assert_eq!(recent[0].devices_found, 4);
    }

    #[test]
    fn test_prune_drops_old_rows() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = DeviceId::new();
        store.append_history(&ScanRecord::new(id, now - TimeDelta::days(40), true, None)).unwrap();
        store.append_history(&ScanRecord::new(id, now, true, None)).unwrap();
        store
            .create_session(&ScanSession::open("x", ScanType::Ping, now - TimeDelta::days(40)))
            .unwrap();

        let cutoff = now - TimeDelta::days(30);
        assert_eq!(store.prune_history(cutoff).unwrap(), 1);
        assert_eq!(store.prune_sessions(cutoff).unwrap(), 1);
        assert_eq!(store.record_count(), 1);
        assert!(store.recent_sessions(10).unwrap().is_empty());
    }

    #[test]
    fn test_record_sweep_applies_devices_and_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = device([10, 0, 0, 1], now);
        let b = device([10, 0, 0, 2], now);
        let records = [
            ScanRecord::new(a.id, now, true, None),
            ScanRecord::new(b.id, now, true, Some(0.8)),
        ];
        store.record_sweep(&[a.clone(), b], &records).unwrap();

        assert_eq!(store.list_all().unwrap().len(), 2);
        assert_eq!(store.record_count(), 2);
        assert_eq!(
            store.get_by_address(Ipv4Addr::new(10, 0, 0, 1)).unwrap().map(|d| d.id),
            Some(a.id)
        );
    }

    #[test]
    fn test_scan_config_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load_scan_config().unwrap().is_none());
        let config = ScanConfig {
            scan_rate: 42,
            ..ScanConfig::default()
        };
        store.save_scan_config(&config).unwrap();
        assert_eq!(store.load_scan_config().unwrap(), Some(config));
    }
}
