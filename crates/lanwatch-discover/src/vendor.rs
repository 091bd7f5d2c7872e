//! Hardware-address prefix → vendor lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use lanwatch_store::VendorSource;

use crate::error::Result;

/// Answers when the loaded registry has no entry for a prefix.
const BUILTIN_VENDORS: &[(&str, &str)] = &[
    ("005056", "VMware"),
    ("000C29", "VMware"),
    ("000569", "VMware"),
    ("080027", "VirtualBox"),
    ("525400", "QEMU"),
    ("001B21", "Intel"),
    ("B827EB", "Raspberry Pi Foundation"),
    ("DCA632", "Raspberry Pi Trading"),
    ("E45F01", "Raspberry Pi Trading"),
    ("002324", "Apple"),
    ("D89EF3", "Apple"),
    ("ACDE48", "Apple"),
];

/// The six-hex-digit OUI of a hardware address, uppercased.
pub fn normalize_oui(mac: &str) -> Option<String> {
    let hex: String = mac
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.' | ' '))
        .take(6)
        .collect();
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(hex.to_uppercase())
    } else {
        None
    }
}

/// Lazily loaded, process-lifetime vendor table.
pub struct VendorResolver {
    source: Box<dyn VendorSource>,
    table: RwLock<Option<Arc<HashMap<String, String>>>>,
}

impl VendorResolver {
    pub fn new(source: Box<dyn VendorSource>) -> Self {
        Self {
            source,
            table: RwLock::new(None),
        }
    }

    fn table(&self) -> Arc<HashMap<String, String>> {
        if let Some(table) = self.table.read().as_ref() {
            return table.clone();
        }

        let mut slot = self.table.write();
        if let Some(table) = slot.as_ref() {
            return table.clone();
        }
        let loaded = match self.source.load() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "Vendor table unavailable, using built-in prefixes");
                HashMap::new()
            }
        };
        let table = Arc::new(loaded);
        *slot = Some(table.clone());
        table
    }

    /// Vendor name for `mac`, matched on its first three octets.
    pub fn resolve(&self, mac: &str) -> Option<String> {
        let oui = normalize_oui(mac)?;
        self.table().get(&oui).cloned().or_else(|| {
            BUILTIN_VENDORS
                .iter()
                .find(|(prefix, _)| *prefix == oui)
                .map(|(_, name)| name.to_string())
        })
    }

    /// Replace the cached table from the source. Returns the prefix count.
    pub fn reload(&self) -> Result<usize> {
        let loaded = self.source.load()?;
        let count = loaded.len();
        *self.table.write() = Some(Arc::new(loaded));
        tracing::info!(prefixes = count, "Vendor table reloaded");
        Ok(count)
    }

    /// Prefixes in the loaded table, loading it if needed.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lanwatch_store::{StaticVendorSource, StoreError};

    struct CountingSource {
        loads: Arc<AtomicUsize>,
    }

    impl VendorSource for CountingSource {
        fn load(&self) -> std::result::Result<HashMap<String, String>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(HashMap::from([("AABBCC".to_string(), "Acme".to_string())]))
        }
    }

    #[test]
    fn test_normalize_oui() {
        assert_eq!(normalize_oui("aa:bb:cc:11:22:33").as_deref(), Some("AABBCC"));
        assert_eq!(normalize_oui("AA-BB-CC-11-22-33").as_deref(), Some("AABBCC"));
        assert_eq!(normalize_oui("aabb.cc11.2233").as_deref(), Some("AABBCC"));
        assert_eq!(normalize_oui("zz:bb:cc:11:22:33"), None);
        assert_eq!(normalize_oui("aa:bb"), None);
    }

    #[test]
    fn test_resolve_uses_first_three_octets() {
        let resolver = VendorResolver::new(Box::new(StaticVendorSource::new([("AABBCC", "Acme")])));
        assert_eq!(resolver.resolve("AA:BB:CC:11:22:33").as_deref(), Some("Acme"));
        assert_eq!(resolver.resolve("aa:bb:cc:ff:ff:ff").as_deref(), Some("Acme"));
        assert_eq!(resolver.resolve("12:34:56:11:22:33"), None);
    }

    #[test]
    fn test_builtin_fallback() {
        let resolver = VendorResolver::new(Box::new(StaticVendorSource::default()));
        assert_eq!(resolver.resolve("08:00:27:01:02:03").as_deref(), Some("VirtualBox"));
        assert_eq!(resolver.resolve("52:54:00:12:35:02").as_deref(), Some("QEMU"));
    }

    #[test]
    fn test_table_loaded_once_until_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let resolver = VendorResolver::new(Box::new(CountingSource {
            loads: loads.clone(),
        }));

        resolver.resolve("AA:BB:CC:00:00:01");
        resolver.resolve("AA:BB:CC:00:00:02");
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        assert_eq!(resolver.reload().unwrap(), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_load_falls_back_to_builtin() {
        let resolver = VendorResolver::new(Box::new(lanwatch_store::OuiFileSource::new(
            "/nonexistent/oui.txt",
        )));
        assert!(resolver.is_empty());
        assert_eq!(resolver.resolve("00:50:56:00:00:01").as_deref(), Some("VMware"));
        assert!(resolver.reload().is_err());
    }
}
