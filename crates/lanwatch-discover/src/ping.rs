//! ICMP echo fallback.
//!
//! One `ping -c 1` per host, fanned out over a bounded worker pool.

use std::net::Ipv4Addr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use lanwatch_core::ProbeObservation;

use crate::error::{DiscoverError, Result};
use crate::process::ProcessRunner;

static LATENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<](\d+(?:\.\d+)?) ?ms").expect("latency pattern is valid"));

/// Extract the round-trip time from `ping` output.
pub fn parse_latency(output: &str) -> Option<f64> {
    LATENCY_RE
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

#[derive(Clone)]
pub struct PingProber {
    program: String,
    runner: Arc<dyn ProcessRunner>,
}

impl PingProber {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            program: "ping".to_string(),
            runner,
        }
    }

    /// Send one echo request to `ip`.
    ///
    /// `Ok(None)` means no reply within `timeout`. An error means the
    /// ping binary itself could not be run.
    pub async fn probe_host(&self, ip: Ipv4Addr, timeout: Duration) -> Result<Option<ProbeObservation>> {
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let args = vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait_secs.to_string(),
            ip.to_string(),
        ];

        let deadline = Duration::from_secs(wait_secs + 1);
        let output = match self.runner.run(&self.program, &args, Some(deadline)).await {
            Ok(output) => output,
            Err(DiscoverError::Timeout { .. }) => {
                tracing::debug!(ip = %ip, "Ping timed out");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !output.success() {
            return Ok(None);
        }

        let mut obs = ProbeObservation::online(ip);
        obs.response_time_ms = parse_latency(&output.stdout_lossy());
        Ok(Some(obs))
    }

    /// Ping every host in `hosts` with at most `workers` probes in flight.
    ///
    /// Fails only when no probe could be launched at all.
    pub async fn sweep(
        &self,
        hosts: Vec<Ipv4Addr>,
        workers: usize,
        timeout: Duration,
    ) -> Result<Vec<ProbeObservation>> {
        let total = hosts.len();
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for ip in hosts {
            let prober = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(prober.probe_host(ip, timeout).await)
            });
        }

        let mut observations = Vec::new();
        let mut launch_failures = 0usize;
        let mut last_error = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(Ok(Some(obs)))) => observations.push(obs),
                Ok(Some(Ok(None))) | Ok(None) => {}
                Ok(Some(Err(e))) => {
                    launch_failures += 1;
                    last_error = Some(e);
                }
                Err(e) => tracing::error!(error = %e, "Ping task panicked"),
            }
        }

        if total > 0 && launch_failures == total {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        observations.sort_by_key(|o| o.ip);
        tracing::info!(
            hosts = total,
            alive = observations.len(),
            "Ping sweep complete"
        );
        Ok(observations)
    }
}
