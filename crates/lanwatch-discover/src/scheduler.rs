//! Scan orchestration.
//!
//! At most one sweep runs at a time, whether it was triggered manually or by
//! the periodic loop. The guard is a compare-and-set flag released on drop.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use ipnet::Ipv4Net;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use lanwatch_core::{ConfigError, ScanConfig, ScanPreset, ScanSession, ScanType, SessionId};
use lanwatch_store::{ConfigRepository, SessionRepository};

use crate::config::{DiscoverConfig, MIN_SCAN_INTERVAL_SECS};
use crate::engine::DiscoveryEngine;
use crate::error::{DiscoverError, Result};
use crate::lifecycle::{LifecycleManager, ObservationBatch};

/// Holds a flag set for as long as it lives.
struct FlagGuard {
    flag: Arc<AtomicBool>,
}

impl FlagGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepStatus {
    Started,
    Rejected,
    Success,
    Error,
}

/// Outcome of a sweep request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub status: SweepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices_found: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SweepReport {
    fn bare(status: SweepStatus, message: Option<&str>) -> Self {
        Self {
            status,
            session_id: None,
            devices_found: None,
            duration_seconds: None,
            message: message.map(String::from),
        }
    }

    fn started() -> Self {
        Self::bare(SweepStatus::Started, None)
    }

    fn rejected() -> Self {
        Self::bare(SweepStatus::Rejected, Some("A scan is already in progress"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatus {
    pub scanning: bool,
    pub periodic_running: bool,
    pub interval_seconds: u64,
    pub last_scan: Option<DateTime<Utc>>,
}

struct Inner {
    engine: DiscoveryEngine,
    lifecycle: LifecycleManager,
    sessions: Arc<dyn SessionRepository>,
    scanning: Arc<AtomicBool>,
    periodic: Arc<AtomicBool>,
    interval_secs: AtomicU64,
    cooldown: Duration,
    periodic_scan_type: ScanType,
    config: RwLock<ScanConfig>,
    config_store: Option<Arc<dyn ConfigRepository>>,
    retention: Option<TimeDelta>,
    last_scan: RwLock<Option<DateTime<Utc>>>,
}

/// Sole writer of `ScanSession` and of the scanning flag. Cheap to clone.
#[derive(Clone)]
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
}

impl ScanOrchestrator {
    pub fn new(
        engine: DiscoveryEngine,
        lifecycle: LifecycleManager,
        sessions: Arc<dyn SessionRepository>,
        settings: &DiscoverConfig,
    ) -> Result<Self> {
        Self::assemble(engine, lifecycle, sessions, None, settings)
    }

    /// Like [`ScanOrchestrator::new`], but configuration changes are saved
    /// to `configs` and a previously saved configuration replaces
    /// `settings.scan` on startup.
    pub fn persistent(
        engine: DiscoveryEngine,
        lifecycle: LifecycleManager,
        sessions: Arc<dyn SessionRepository>,
        configs: Arc<dyn ConfigRepository>,
        settings: &DiscoverConfig,
    ) -> Result<Self> {
        Self::assemble(engine, lifecycle, sessions, Some(configs), settings)
    }

    fn assemble(
        engine: DiscoveryEngine,
        lifecycle: LifecycleManager,
        sessions: Arc<dyn SessionRepository>,
        config_store: Option<Arc<dyn ConfigRepository>>,
        settings: &DiscoverConfig,
    ) -> Result<Self> {
        check_interval(settings.scan_interval_secs)?;
        let mut config = settings.scan.clone().validated()?;
        if let Some(saved) = config_store.as_deref().and_then(restore_config) {
            config = saved;
        }
        let retention =
            (settings.retention_days > 0).then(|| TimeDelta::days(i64::from(settings.retention_days)));

        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                lifecycle,
                sessions,
                scanning: Arc::new(AtomicBool::new(false)),
                periodic: Arc::new(AtomicBool::new(false)),
                interval_secs: AtomicU64::new(settings.scan_interval_secs),
                cooldown: Duration::from_secs(settings.error_cooldown_secs),
                periodic_scan_type: settings.default_scan_type,
                config: RwLock::new(config),
                config_store,
                retention,
                last_scan: RwLock::new(None),
            }),
        })
    }

    pub fn engine(&self) -> &DiscoveryEngine {
        &self.inner.engine
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.inner.lifecycle
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::Acquire)
    }

    /// Run a sweep to completion. Rejected immediately if one is running.
    pub async fn trigger_scan(&self, target: Option<String>, scan_type: ScanType) -> SweepReport {
        let Some(guard) = FlagGuard::acquire(&self.inner.scanning) else {
            tracing::info!("Scan request rejected, sweep already in progress");
            return SweepReport::rejected();
        };
        self.inner.run_sweep(guard, target, scan_type).await
    }

    /// Claim the scan slot and run the sweep in the background.
    pub fn start_scan(&self, target: Option<String>, scan_type: ScanType) -> SweepReport {
        let Some(guard) = FlagGuard::acquire(&self.inner.scanning) else {
            tracing::info!("Scan request rejected, sweep already in progress");
            return SweepReport::rejected();
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_sweep(guard, target, scan_type).await;
        });
        SweepReport::started()
    }

    /// Sweep on a fixed interval until `cancel` fires.
    ///
    /// Failed sweeps are retried after the error cooldown. Cancellation is
    /// observed between sweeps; a sweep in flight runs to completion.
    pub async fn run_periodic(&self, cancel: CancellationToken) -> Result<()> {
        let Some(_running) = FlagGuard::acquire(&self.inner.periodic) else {
            return Err(DiscoverError::PeriodicLoopActive);
        };
        tracing::info!(
            interval_secs = self.scan_interval(),
            scan_type = %self.inner.periodic_scan_type,
            "Periodic scanning started"
        );

        while !cancel.is_cancelled() {
            let report = self
                .trigger_scan(None, self.inner.periodic_scan_type)
                .await;

            if let Err(e) = self.prune_expired() {
                tracing::warn!(error = %e, "Retention prune failed");
            }

            let wait = match report.status {
                SweepStatus::Error => {
                    tracing::error!(
                        message = report.message.as_deref().unwrap_or_default(),
                        cooldown_secs = self.inner.cooldown.as_secs(),
                        "Scheduled scan failed"
                    );
                    self.inner.cooldown
                }
                _ => Duration::from_secs(self.scan_interval()),
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        tracing::info!("Periodic scanning stopped");
        Ok(())
    }

    pub fn scan_interval(&self) -> u64 {
        self.inner.interval_secs.load(Ordering::Relaxed)
    }

    /// Takes effect from the next sleep of the periodic loop.
    pub fn set_scan_interval(&self, seconds: u64) -> Result<()> {
        check_interval(seconds)?;
        self.inner.interval_secs.store(seconds, Ordering::Relaxed);
        tracing::info!(interval_secs = seconds, "Scan interval updated");
        Ok(())
    }

    pub fn status(&self) -> ScanStatus {
        ScanStatus {
            scanning: self.is_scanning(),
            periodic_running: self.inner.periodic.load(Ordering::Acquire),
            interval_seconds: self.scan_interval(),
            last_scan: *self.inner.last_scan.read(),
        }
    }

    pub fn config(&self) -> ScanConfig {
        self.inner.config.read().clone()
    }

    /// Replace the sweep configuration. Invalid configurations are rejected
    /// and the current one is kept. With a config store the new value is
    /// saved before it takes effect.
    pub fn apply_config(&self, config: ScanConfig) -> Result<()> {
        let config = config.validated()?;
        if let Some(store) = &self.inner.config_store {
            store.save_scan_config(&config)?;
        }
        *self.inner.config.write() = config;
        tracing::info!("Scan configuration updated");
        Ok(())
    }

    /// Drop history and sessions older than the retention window.
    /// Returns `(records, sessions)` removed; `(0, 0)` when retention is off.
    pub fn prune_expired(&self) -> Result<(usize, usize)> {
        let Some(window) = self.inner.retention else {
            return Ok((0, 0));
        };
        let cutoff = Utc::now() - window;
        let records = self.inner.lifecycle.prune_history(cutoff)?;
        let sessions = self.inner.sessions.prune_sessions(cutoff)?;
        if records + sessions > 0 {
            tracing::info!(records, sessions, "Pruned history past retention");
        }
        Ok((records, sessions))
    }

    pub fn load_preset(&self, name: &str) -> Result<ScanConfig> {
        let preset = ScanPreset::from_str(name)?;
        let config = preset.config();
        self.apply_config(config.clone())?;
        tracing::info!(preset = preset.name(), "Preset applied");
        Ok(config)
    }

    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<ScanSession>> {
        Ok(self.inner.sessions.recent_sessions(limit)?)
    }
}

fn restore_config(store: &dyn ConfigRepository) -> Option<ScanConfig> {
    match store.load_scan_config() {
        Ok(Some(saved)) => match saved.validated() {
            Ok(config) => {
                tracing::info!("Restored saved scan configuration");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Saved scan configuration is invalid, ignoring it");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read saved scan configuration");
            None
        }
    }
}

fn check_interval(seconds: u64) -> Result<()> {
    if seconds < MIN_SCAN_INTERVAL_SECS {
        return Err(ConfigError::IntervalTooShort {
            got: seconds,
            min: MIN_SCAN_INTERVAL_SECS,
        }
        .into());
    }
    Ok(())
}

impl Inner {
    async fn run_sweep(
        &self,
        _guard: FlagGuard,
        target: Option<String>,
        scan_type: ScanType,
    ) -> SweepReport {
        let config = self.config.read().clone();
        let started_at = Utc::now();
        let clock = Instant::now();

        let resolved = self.engine.resolve_subnet(target.as_deref(), &config);
        let label = match &resolved {
            Ok(net) => net.to_string(),
            Err(_) => target.clone().unwrap_or_default(),
        };
        let mut session = ScanSession::open(&label, scan_type, started_at);
        if let Err(e) = self.sessions.create_session(&session) {
            tracing::error!(session_id = %session.id, error = %e, "Failed to record scan session");
        }

        let result = match resolved {
            Ok(subnet) => self.sweep_and_apply(subnet, scan_type, &config, started_at).await,
            Err(e) => Err(e),
        };
        let duration = clock.elapsed().as_secs_f64();
        session.end_time = Some(Utc::now());

        let report = match result {
            Ok((strategy, devices_found)) => {
                session.strategy = Some(strategy.to_string());
                session.devices_found = devices_found;
                *self.last_scan.write() = Some(started_at);
                SweepReport {
                    status: SweepStatus::Success,
                    session_id: Some(session.id),
                    devices_found: Some(devices_found),
                    duration_seconds: Some(duration),
                    message: None,
                }
            }
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Sweep failed");
                session.error = Some(e.to_string());
                SweepReport {
                    status: SweepStatus::Error,
                    session_id: Some(session.id),
                    devices_found: Some(0),
                    duration_seconds: Some(duration),
                    message: Some(e.to_string()),
                }
            }
        };

        if let Err(e) = self.sessions.update_session(&session) {
            tracing::error!(session_id = %session.id, error = %e, "Failed to seal scan session");
        }
        report
    }

    async fn sweep_and_apply(
        &self,
        subnet: Ipv4Net,
        scan_type: ScanType,
        config: &ScanConfig,
        scan_time: DateTime<Utc>,
    ) -> Result<(&'static str, u32)> {
        let outcome = self.engine.sweep_subnet(subnet, scan_type, config).await?;
        let batch = ObservationBatch {
            scan_time,
            subnet: Some(outcome.subnet),
            complete: outcome.complete,
            observations: outcome.observations,
        };
        let summary = self.lifecycle.apply_observations(&batch)?;
        let found = u32::try_from(summary.created + summary.updated).unwrap_or(u32::MAX);
        Ok((outcome.strategy.name(), found))
    }
}
