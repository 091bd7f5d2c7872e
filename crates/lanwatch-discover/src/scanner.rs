//! Nmap process wrapper.
//!
//! Executes nmap through a [`ProcessRunner`], either as a local binary or
//! inside a host-networked docker container, and parses the XML report.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

use lanwatch_core::config::parse_port_ranges;
use lanwatch_core::{ProbeMethod, ScanConfig};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapRun};
use crate::process::{ProcessOutput, ProcessRunner};

/// Ports probed by the comprehensive detail pass unless a range is configured.
pub const DETAIL_PORTS: &str = "1-1000,8080,8443,9000";

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    docker_image: Option<String>,
    runner: Arc<dyn ProcessRunner>,
}

impl NmapScanner {
    pub fn new(nmap_path: &str, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            docker_image: None,
            runner,
        }
    }

    /// Run nmap from `image` via `docker run --rm --network=host`.
    pub fn with_docker(image: &str, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            nmap_path: "docker".to_string(),
            docker_image: Some(image.to_string()),
            runner,
        }
    }

    pub fn from_config(config: &DiscoverConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        if config.use_docker {
            Self::with_docker(&config.docker_image, runner)
        } else {
            Self::new(&config.nmap_path, runner)
        }
    }

    fn command_line(&self, nmap_args: Vec<String>) -> Vec<String> {
        match &self.docker_image {
            Some(image) => {
                let mut args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "--network=host".to_string(),
                    image.clone(),
                ];
                args.extend(nmap_args);
                args
            }
            None => nmap_args,
        }
    }

    async fn invoke(&self, nmap_args: Vec<String>) -> Result<ProcessOutput> {
        let args = self.command_line(nmap_args);
        self.runner
            .run(&self.nmap_path, &args, None)
            .await
            .map_err(|e| match e {
                DiscoverError::Spawn { .. } => DiscoverError::NmapNotFound {
                    path: self.nmap_path.clone(),
                },
                other => other,
            })
    }

    /// Verify nmap is installed and accessible. Returns the version banner.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = self.invoke(vec!["--version".to_string()]).await?;
        if !output.success() {
            return Err(DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            });
        }
        Ok(output.stdout_lossy().trim().to_string())
    }

    /// Host discovery over `target` with the configured probe methods.
    pub async fn ping_sweep(
        &self,
        target: &str,
        config: &ScanConfig,
        exclusions: &[Ipv4Addr],
    ) -> Result<NmapRun> {
        self.execute("discovery", target, discovery_args(config, target, exclusions))
            .await
    }

    /// Port, service and OS detection over an explicit host list.
    pub async fn port_scan(
        &self,
        targets: &[Ipv4Addr],
        ports: &str,
        config: &ScanConfig,
    ) -> Result<NmapRun> {
        let label = match targets {
            [single] => single.to_string(),
            _ => format!("{} hosts", targets.len()),
        };
        let ports = normalize_ports(ports)?;
        self.execute("detail", &label, detail_args(targets, &ports, config.max_retries))
            .await
    }

    async fn execute(&self, pass: &str, target: &str, args: Vec<String>) -> Result<NmapRun> {
        let start = Instant::now();
        tracing::info!(pass, target = %target, "Starting nmap scan");

        let output = self.invoke(args).await?;
        let duration = start.elapsed();

        if !output.success() {
            return Err(DiscoverError::NmapFailed {
                code: output.code.unwrap_or(-1),
                stderr: output.stderr_lossy(),
            });
        }

        let nmap_run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        let (hosts_up, hosts_total) = nmap_run.host_counts();

        tracing::info!(
            pass,
            target = %target,
            hosts_up,
            hosts_total,
            duration_ms = duration.as_millis(),
            "Nmap scan complete"
        );

        Ok(nmap_run)
    }
}

/// Canonical `-p` value: validated, whitespace removed, `22,80,8000-8100`.
pub fn normalize_ports(list: &str) -> Result<String> {
    let ranges = parse_port_ranges(list)?;
    Ok(ranges
        .iter()
        .map(|(lo, hi)| {
            if lo == hi {
                lo.to_string()
            } else {
                format!("{lo}-{hi}")
            }
        })
        .collect::<Vec<_>>()
        .join(","))
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Arguments for a host-discovery run.
pub fn discovery_args(config: &ScanConfig, target: &str, exclusions: &[Ipv4Addr]) -> Vec<String> {
    let mut args = vec!["-sn".to_string()];

    for method in &config.ping_methods {
        match method {
            ProbeMethod::Icmp => args.push("-PE".to_string()),
            ProbeMethod::TcpSyn => args.push(format!("-PS{}", join_ports(&config.tcp_ping_ports))),
            ProbeMethod::TcpAck => args.push(format!("-PA{}", join_ports(&config.ack_ping_ports))),
            ProbeMethod::Udp => args.push("-PU".to_string()),
        }
    }

    if !config.resolve_hostnames {
        args.push("-n".to_string());
    }

    args.push("--max-retries".to_string());
    args.push(config.max_retries.to_string());
    args.push("--min-rate".to_string());
    args.push(config.scan_rate.to_string());
    args.push("--host-timeout".to_string());
    args.push(format!("{}ms", config.host_timeout().as_millis()));

    if !exclusions.is_empty() {
        args.push("--exclude".to_string());
        args.push(
            exclusions
                .iter()
                .map(Ipv4Addr::to_string)
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    args.push("-oX".to_string());
    args.push("-".to_string());
    args.push(target.to_string());
    args
}

/// Arguments for a port/service/OS detail run.
pub fn detail_args(targets: &[Ipv4Addr], ports: &str, max_retries: u32) -> Vec<String> {
    let mut args: Vec<String> = [
        "-sS",
        "-sV",
        "-O",
        "--version-intensity",
        "5",
        "-p",
        ports,
        "--min-rate",
        "500",
        "--max-retries",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(max_retries.to_string());
    args.push("-oX".to_string());
    args.push("-".to_string());
    args.extend(targets.iter().map(Ipv4Addr::to_string));
    args
}
