//! JSON-file backed store.
//!
//! ```text
//! {root}/
//!   devices.json          pretty-printed, rewritten on device changes
//!   scan_records.jsonl    one record per line, append-only
//!   scan_sessions.json    pretty-printed, rewritten on session changes
//!   scan_config.json      last applied scan configuration
//! ```
//! Reads are served from an in-memory mirror. Whole-document rewrites go
//! through a temp file and rename; history only grows by appending lines
//! until a retention prune compacts it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use lanwatch_core::{Device, DeviceId, ScanConfig, ScanRecord, ScanSession};

use crate::memory::MemoryStore;
use crate::repository::{ConfigRepository, DeviceRepository, SessionRepository, StoreError};

const DEVICES_FILE: &str = "devices.json";
const RECORDS_FILE: &str = "scan_records.jsonl";
const SESSIONS_FILE: &str = "scan_sessions.json";
const CONFIG_FILE: &str = "scan_config.json";

pub struct JsonFileStore {
    root: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open (or create) a store rooted at the given directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let devices: Vec<Device> = load_or_default(&root.join(DEVICES_FILE))?;
        let (records, skipped) = load_lines(&root.join(RECORDS_FILE))?;
        let sessions: Vec<ScanSession> = load_or_default(&root.join(SESSIONS_FILE))?;
        let scan_config: Option<ScanConfig> = load_or_default(&root.join(CONFIG_FILE))?;

        tracing::debug!(
            root = %root.display(),
            devices = devices.len(),
            records = records.len(),
            sessions = sessions.len(),
            saved_config = scan_config.is_some(),
            "Opened JSON store"
        );

        let store = Self {
            root,
            inner: MemoryStore::from_parts(devices, records, sessions).with_scan_config(scan_config),
        };
        // later appends must not land on the tail of a bad line
        if skipped > 0 {
            store.compact_records()?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn flush_devices(&self) -> Result<(), StoreError> {
        write_atomic(&self.root.join(DEVICES_FILE), &self.inner.devices_snapshot())
    }

    fn flush_sessions(&self) -> Result<(), StoreError> {
        write_atomic(&self.root.join(SESSIONS_FILE), &self.inner.sessions_snapshot())
    }

    fn append_lines(&self, records: &[ScanRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(RECORDS_FILE))?;
        file.write_all(&buf)?;
        Ok(())
    }

    fn compact_records(&self) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        for record in self.inner.records_snapshot() {
            serde_json::to_writer(&mut buf, &record)?;
            buf.push(b'\n');
        }
        write_bytes_atomic(&self.root.join(RECORDS_FILE), &buf)
    }
}

impl DeviceRepository for JsonFileStore {
    fn get_by_address(&self, ip: Ipv4Addr) -> Result<Option<Device>, StoreError> {
        self.inner.get_by_address(ip)
    }

    fn get_by_id(&self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        self.inner.get_by_id(id)
    }

    fn get_by_mac(&self, mac: &str) -> Result<Option<Device>, StoreError> {
        self.inner.get_by_mac(mac)
    }

    fn upsert(&self, device: &Device) -> Result<(), StoreError> {
        self.inner.upsert(device)?;
        self.flush_devices()
    }

    fn list_online(&self) -> Result<Vec<Device>, StoreError> {
        self.inner.list_online()
    }

    fn list_all(&self) -> Result<Vec<Device>, StoreError> {
        self.inner.list_all()
    }

    fn append_history(&self, record: &ScanRecord) -> Result<(), StoreError> {
        self.inner.append_history(record)?;
        self.append_lines(std::slice::from_ref(record))
    }

    fn record_sweep(&self, devices: &[Device], records: &[ScanRecord]) -> Result<(), StoreError> {
        self.inner.record_sweep(devices, records)?;
        if !devices.is_empty() {
            self.flush_devices()?;
        }
        self.append_lines(records)
    }

    fn prune_history(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.inner.prune_history(cutoff)?;
        if removed > 0 {
            self.compact_records()?;
            tracing::info!(records = removed, "Pruned expired history");
        }
        Ok(removed)
    }

    fn history(
        &self,
        device_id: DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScanRecord>, StoreError> {
        self.inner.history(device_id, from, to)
    }
}

impl SessionRepository for JsonFileStore {
    fn create_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        self.inner.create_session(session)?;
        self.flush_sessions()
    }

    fn update_session(&self, session: &ScanSession) -> Result<(), StoreError> {
        self.inner.update_session(session)?;
        self.flush_sessions()
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<ScanSession>, StoreError> {
        self.inner.recent_sessions(limit)
    }

    fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.inner.prune_sessions(cutoff)?;
        if removed > 0 {
            self.flush_sessions()?;
            tracing::info!(sessions = removed, "Pruned expired scan sessions");
        }
        Ok(removed)
    }
}

impl ConfigRepository for JsonFileStore {
    fn load_scan_config(&self) -> Result<Option<ScanConfig>, StoreError> {
        self.inner.load_scan_config()
    }

    fn save_scan_config(&self, config: &ScanConfig) -> Result<(), StoreError> {
        write_atomic(&self.root.join(CONFIG_FILE), config)?;
        self.inner.save_scan_config(config)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let json = fs::read_to_string(path)?;
    if json.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(&json)?)
}

/// Unreadable lines (a torn final append) are skipped with a warning.
/// Returns the records and the number of lines skipped.
fn load_lines(path: &Path) -> Result<(Vec<ScanRecord>, usize), StoreError> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }
    let text = fs::read_to_string(path)?;
    let mut records = Vec::new();
    let mut skipped = 0;
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(line = n + 1, error = %e, "Skipping unreadable history line");
            }
        }
    }
    Ok((records, skipped))
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    write_bytes_atomic(path, serde_json::to_string_pretty(value)?.as_bytes())
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
