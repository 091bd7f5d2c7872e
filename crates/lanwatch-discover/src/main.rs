//! CLI entry point for the lanwatch network monitor.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use lanwatch_core::{DeviceId, ScanType};
use lanwatch_store::{JsonFileStore, OuiFileSource, StaticVendorSource, VendorSource};

use lanwatch_discover::config::DiscoverConfig;
use lanwatch_discover::{MonitorService, SweepStatus, TokioProcessRunner};

#[derive(Parser)]
#[command(name = "lanwatch")]
#[command(about = "LAN device discovery and presence tracking")]
struct Cli {
    /// Target to scan (CIDR or single address). Defaults to the local subnet.
    #[arg(short, long)]
    target: Option<String>,

    /// Scan type: ping, arp, comprehensive.
    #[arg(short, long, default_value = "ping")]
    scan_type: String,

    /// Scan preset: fast, balanced, thorough, stealth.
    #[arg(short, long)]
    preset: Option<String>,

    /// Run a single sweep and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with periodic sweeps.
    #[arg(long)]
    daemon: bool,

    /// Print the online periods of a device as JSON.
    #[arg(long, value_name = "DEVICE_ID")]
    timeline: Option<String>,

    /// Day for --timeline (YYYY-MM-DD, UTC). Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Print the recent scan records of a device as JSON.
    #[arg(long, value_name = "DEVICE_ID")]
    history: Option<String>,

    /// Window for --history, in hours.
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Print all known devices as JSON.
    #[arg(long)]
    devices: bool,

    /// Config file prefix (default: lanwatch).
    #[arg(short, long, default_value = "lanwatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut settings = load_discover_config(&cli.config)?;
    if cli.preset.is_some() {
        settings.preset = cli.preset.clone();
    }

    let store = Arc::new(JsonFileStore::open(&settings.data_dir)?);
    tracing::info!(data_dir = %settings.data_dir, "Opened device store");

    let vendors: Box<dyn VendorSource> = match &settings.oui_file {
        Some(path) => Box::new(OuiFileSource::new(path)),
        None => Box::new(StaticVendorSource::default()),
    };
    let service = MonitorService::build(
        &settings,
        store,
        Arc::new(TokioProcessRunner),
        vendors,
    )?;

    if let Some(raw) = &cli.history {
        let records = service.device_history(parse_device_id(raw)?, cli.hours)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if let Some(raw) = &cli.timeline {
        let device_id = parse_device_id(raw)?;
        let date = cli.date.unwrap_or_else(|| Utc::now().date_naive());
        let intervals = service.reconstruct_timeline(device_id, date)?;
        println!("{}", serde_json::to_string_pretty(&intervals)?);
        return Ok(());
    }

    if cli.devices {
        println!("{}", serde_json::to_string_pretty(&service.devices()?)?);
        return Ok(());
    }

    match service.nmap_version().await {
        Ok(version) => tracing::info!(nmap_version = %version, "Nmap verified"),
        Err(e) => tracing::warn!(error = %e, "Nmap unavailable, fallback probes only"),
    }

    if cli.once {
        let scan_type: ScanType = cli.scan_type.parse()?;
        let report = service.sweep_and_wait(cli.target.clone(), scan_type).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if report.status == SweepStatus::Error {
            anyhow::bail!(
                "Sweep failed: {}",
                report.message.unwrap_or_default()
            );
        }
    } else if cli.daemon {
        service.orchestrator().prune_expired()?;

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested");
                }
                cancel.cancel();
            }
        });

        service.orchestrator().run_periodic(cancel).await?;
    } else {
        anyhow::bail!("Specify --once, --daemon, --devices, --history <DEVICE_ID> or --timeline <DEVICE_ID>");
    }

    Ok(())
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn parse_device_id(raw: &str) -> anyhow::Result<DeviceId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid device id {raw}: {e}"))
}
