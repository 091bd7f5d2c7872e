//! Storage contracts consumed by the discovery core.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lanwatch_core::{Device, DeviceId, ScanConfig, ScanRecord, ScanSession, SessionId};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("Scan session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value style device repository, keyed by id with a unique IP index.
///
/// Implementations must tolerate concurrent reads during a write.
pub trait DeviceRepository: Send + Sync {
    fn get_by_address(&self, ip: Ipv4Addr) -> Result<Option<Device>, StoreError>;

    fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, StoreError>;

    /// Case-insensitive hardware address lookup.
    fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, StoreError>;

    /// Insert or replace the device with `device.id`.
    fn upsert(&self, device: &Device) -> Result<(), StoreError>;

    fn list_online(&self) -> Result<Vec<Device>, StoreError>;

    /// All devices, most recently seen first.
    fn list_all(&self) -> Result<Vec<Device>, StoreError>;

    fn append_history(&self, record: &ScanRecord) -> Result<(), StoreError>;

    /// Apply one sweep's device updates and history records together.
    ///
    /// Backends that persist should override this to write once per sweep.
    fn record_sweep(&self, devices: &[Device], records: &[ScanRecord]) -> Result<(), StoreError> {
        for device in devices {
            self.upsert(device)?;
        }
        for record in records {
            self.append_history(record)?;
        }
        Ok(())
    }

    /// Drop records with `scan_time < cutoff`. Returns how many were removed.
    fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Records for one device with `from <= scan_time <= to`.
    ///
    /// No ordering is guaranteed.
    fn history(
        &self,
        device_id: DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, StoreError>;
}

/// Storage for per-sweep audit sessions.
pub trait SessionRepository: Send + Sync {
    fn create_session(&self, session: &ScanSession) -> Result<(), StoreError>;

    /// Replace an existing session. Fails with `SessionNotFound` if absent.
    fn update_session(&self, session: &ScanSession) -> Result<(), StoreError>;

    /// Sessions ordered by start time, newest first.
    fn recent_sessions(&self, limit: usize) -> Result<Vec<ScanSession>, StoreError>;

    /// Drop sessions started before `cutoff`. Returns how many were removed.
    fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// The operator's last applied scan configuration.
pub trait ConfigRepository: Send + Sync {
    fn load_scan_config(&self) -> Result<Option<ScanConfig>, StoreError>;

    fn save_scan_config(&self, config: &ScanConfig) -> Result<(), StoreError>;
}

/// Supplies the hardware-address prefix → vendor name table.
///
/// Keys are six uppercase hex digits (e.g. `"001B21"`).
pub trait VendorSource: Send + Sync {
    fn load(&self) -> Result<HashMap<String, String>, StoreError>;
}

/// Aggregate counters over the device table.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct NetworkStats {
    pub total_devices: usize,
    pub online_devices: usize,
    pub offline_devices: usize,
    pub recent_scans: usize,
}
