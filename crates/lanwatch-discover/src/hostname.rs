//! Reverse name lookup for discovered addresses.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;

/// Resolves an address to a hostname. Misses are `None`, never errors.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String>;
}

/// PTR lookup through the system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsHostnameResolver;

#[async_trait]
impl HostnameResolver for DnsHostnameResolver {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        let addr = IpAddr::V4(ip);
        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .ok()?;

        match name {
            // getnameinfo echoes the numeric address when no PTR exists
            Ok(name) if name != ip.to_string() => Some(name),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
        }
    }
}

/// Resolver that never answers, for sweeps with name resolution off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostnames;

#[async_trait]
impl HostnameResolver for NoHostnames {
    async fn reverse(&self, _ip: Ipv4Addr) -> Option<String> {
        None
    }
}

#[cfg(test)]
pub(crate) mod fixed {
    use std::collections::HashMap;

    use super::*;

    /// Answers from a fixed map.
    #[derive(Default)]
    pub struct FixedHostnames(pub HashMap<Ipv4Addr, String>);

    #[async_trait]
    impl HostnameResolver for FixedHostnames {
        async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
            self.0.get(&ip).cloned()
        }
    }
}
