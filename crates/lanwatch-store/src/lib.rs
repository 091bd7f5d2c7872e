//! lanwatch-store: repository contracts and storage backends.
//!
//! The discovery core only depends on the traits in [`repository`]. Two
//! backends are provided: an in-memory store and a JSON-file store that
//! keeps its collections under a data directory.

pub mod file;
pub mod memory;
pub mod oui;
pub mod repository;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use oui::{OuiFileSource, StaticVendorSource};
pub use repository::{
    ConfigRepository, DeviceRepository, NetworkStats, SessionRepository, StoreError, VendorSource,
};

pub type Result<T> = std::result::Result<T, StoreError>;
