//! Online-interval reconstruction from scan history.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use lanwatch_core::{DeviceId, OnlineInterval, ScanRecord};
use lanwatch_store::DeviceRepository;

use crate::error::{DiscoverError, Result};

/// Derive contiguous online intervals from liveness samples.
///
/// Records are sorted here; callers may pass them in any order. An interval
/// opens on a not-live → live transition and closes on the next live →
/// not-live one. A trailing open interval has `end: None`.
pub fn reconstruct(records: &[ScanRecord]) -> Vec<OnlineInterval> {
    let mut ordered: Vec<&ScanRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.scan_time);

    let mut intervals = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;

    for record in ordered {
        match (record.is_online, open) {
            (true, None) => open = Some(record.scan_time),
            (false, Some(start)) => {
                intervals.push(OnlineInterval {
                    start,
                    end: Some(record.scan_time),
                });
                open = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        intervals.push(OnlineInterval { start, end: None });
    }
    intervals
}

/// Bounds of a UTC calendar day, inclusive of midnight at both ends.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (start, start + TimeDelta::days(1) - TimeDelta::microseconds(1))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceTimeline {
    pub device_id: DeviceId,
    pub device_name: String,
    pub ip_address: Ipv4Addr,
    pub online_periods: Vec<OnlineInterval>,
}

/// Read-path service over device history.
pub struct TimelineReconstructor {
    devices: Arc<dyn DeviceRepository>,
}

impl TimelineReconstructor {
    pub fn new(devices: Arc<dyn DeviceRepository>) -> Self {
        Self { devices }
    }

    pub fn reconstruct_range(
        &self,
        device_id: DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<OnlineInterval>> {
        Ok(reconstruct(&self.devices.history(device_id, from, to)?))
    }

    /// Intervals for one device over one UTC day.
    pub fn reconstruct_timeline(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Vec<OnlineInterval>> {
        if self.devices.get_by_id(device_id)?.is_none() {
            return Err(DiscoverError::device_not_found(device_id));
        }
        let (from, to) = day_bounds(date);
        self.reconstruct_range(device_id, from, to)
    }

    /// Every known device's intervals for one UTC day.
    pub fn day_timeline(&self, date: NaiveDate) -> Result<Vec<DeviceTimeline>> {
        let (from, to) = day_bounds(date);
        self.devices
            .list_all()?
            .into_iter()
            .map(|device| {
                Ok(DeviceTimeline {
                    online_periods: self.reconstruct_range(device.id, from, to)?,
                    device_name: device.display_name(),
                    device_id: device.id,
                    ip_address: device.ip_address,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanwatch_core::{Device, ProbeObservation};
    use lanwatch_store::MemoryStore;

    fn at(minute: i64) -> DateTime<Utc> {
        day_bounds(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()).0 + TimeDelta::minutes(minute)
    }

    fn samples(id: DeviceId, points: &[(i64, bool)]) -> Vec<ScanRecord> {
        points
            .iter()
            .map(|(m, online)| ScanRecord::new(id, at(*m), *online, None))
            .collect()
    }

    #[test]
    fn test_reconstruct_transitions() {
        let id = DeviceId::new();
        let records = samples(id, &[(1, false), (2, true), (3, true), (4, false), (5, true)]);
        assert_eq!(
            reconstruct(&records),
            vec![
                OnlineInterval {
                    start: at(2),
                    end: Some(at(4))
                },
                OnlineInterval {
                    start: at(5),
                    end: None
                },
            ]
        );
    }

    #[test]
    fn test_reconstruct_empty() {
        assert!(reconstruct(&[]).is_empty());
    }

    #[test]
    fn test_reconstruct_order_independent() {
        let id = DeviceId::new();
        let sorted = samples(id, &[(1, false), (2, true), (3, true), (4, false), (5, true)]);
        let mut shuffled = sorted.clone();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);
        assert_eq!(reconstruct(&shuffled), reconstruct(&sorted));
    }

    #[test]
    fn test_reconstruct_all_offline_and_all_online() {
        let id = DeviceId::new();
        assert!(reconstruct(&samples(id, &[(1, false), (2, false)])).is_empty());
        assert_eq!(
            reconstruct(&samples(id, &[(1, true), (2, true)])),
            vec![OnlineInterval {
                start: at(1),
                end: None
            }]
        );
    }

    #[test]
    fn test_day_timeline_from_store() {
        let store = Arc::new(MemoryStore::new());
        let mut obs = ProbeObservation::online("192.168.1.7".parse().unwrap());
        obs.hostname = Some("printer.lan".to_string());
        let device = Device::from_observation(&obs, at(0));
        store.upsert(&device).unwrap();
        for record in samples(device.id, &[(10, true), (20, false)]) {
            store.append_history(&record).unwrap();
        }
        // a sample from the next day is outside the window
        store
            .append_history(&ScanRecord::new(device.id, at(60 * 25), true, None))
            .unwrap();

        let timelines = TimelineReconstructor::new(store.clone());
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let intervals = timelines.reconstruct_timeline(device.id, day).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].end, Some(at(20)));

        let all = timelines.day_timeline(day).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].device_name, "printer.lan");

        assert!(matches!(
            timelines.reconstruct_timeline(DeviceId::new(), day),
            Err(DiscoverError::DeviceNotFound(_))
        ));
    }
}
