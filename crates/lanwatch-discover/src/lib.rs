//! lanwatch-discover: LAN device discovery and presence tracking.
//!
//! Sweeps a subnet with nmap (falling back to ICMP and the ARP cache),
//! folds the results into persistent device records, and reconstructs
//! per-device online timelines from the scan history.

pub mod arp;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod hostname;
pub mod lifecycle;
pub mod nmap_xml;
pub mod ping;
pub mod process;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod subnet;
pub mod timeline;
pub mod vendor;

pub use engine::{DiscoveryEngine, Strategy, SweepOutcome};
pub use error::{DiscoverError, Result};
pub use lifecycle::{ApplySummary, LifecycleManager, ObservationBatch};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use scheduler::{ScanOrchestrator, ScanStatus, SweepReport, SweepStatus};
pub use service::MonitorService;
