//! Vendor-prefix sources.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::repository::{StoreError, VendorSource};

/// Reads an IEEE `oui.txt` registry file.
///
/// Both record styles are accepted:
/// ```text
/// 00-1B-21   (hex)        Intel Corporate
/// 001B21     (base 16)    Intel Corporate
/// ```
pub struct OuiFileSource {
    path: PathBuf,
}

impl OuiFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VendorSource for OuiFileSource {
    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        let text = fs::read_to_string(&self.path)?;
        let table = parse_oui_registry(&text);
        tracing::debug!(
            path = %self.path.display(),
            prefixes = table.len(),
            "Loaded OUI registry"
        );
        Ok(table)
    }
}

/// A fixed table, useful for tests and for seeding well-known prefixes.
#[derive(Debug, Clone, Default)]
pub struct StaticVendorSource {
    table: HashMap<String, String>,
}

impl StaticVendorSource {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.into().to_uppercase(), v.into()))
                .collect(),
        }
    }
}

impl VendorSource for StaticVendorSource {
    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.table.clone())
    }
}

/// Parse registry text into a prefix → vendor map.
pub fn parse_oui_registry(text: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        let Some((prefix, rest)) = line.split_once('(') else {
            continue;
        };
        let Some((kind, vendor)) = rest.split_once(')') else {
            continue;
        };
        if kind != "hex" && kind != "base 16" {
            continue;
        }

        let prefix: String = prefix.trim().chars().filter(|c| *c != '-').collect();
        let vendor = vendor.trim();
        if prefix.len() != 6 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) || vendor.is_empty()
        {
            continue;
        }

        table
            .entry(prefix.to_uppercase())
            .or_insert_with(|| vendor.to_string());
    }

    table
}
