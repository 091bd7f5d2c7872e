//! Local subnet auto-detection.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use ipnet::Ipv4Net;

/// Used when nothing else yields a subnet.
pub const DEFAULT_SUBNET: &str = "192.168.1.0/24";

pub fn default_subnet() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(192, 168, 1, 0), 24).unwrap_or_default()
}

/// Best-guess local network.
pub trait SubnetDetector: Send + Sync {
    fn detect(&self) -> Option<Ipv4Net>;
}

/// Takes the /24 around the address the OS would use to reach the internet.
///
/// The UDP socket is connected but never sends, so no packets leave the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteSubnetDetector;

impl SubnetDetector for RouteSubnetDetector {
    fn detect(&self) -> Option<Ipv4Net> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let IpAddr::V4(ip) = socket.local_addr().ok()?.ip() else {
            return None;
        };
        if ip.is_loopback() || ip.is_unspecified() {
            return None;
        }
        let net = Ipv4Net::new(ip, 24).ok()?.trunc();
        tracing::debug!(local_ip = %ip, subnet = %net, "Detected local subnet");
        Some(net)
    }
}

/// Always returns the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedSubnet(pub Option<Ipv4Net>);

impl SubnetDetector for FixedSubnet {
    fn detect(&self) -> Option<Ipv4Net> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subnet() {
        assert_eq!(default_subnet().to_string(), DEFAULT_SUBNET);
    }

    #[test]
    fn test_route_detector_yields_a_24() {
        if let Some(net) = RouteSubnetDetector.detect() {
            assert_eq!(net.prefix_len(), 24);
            assert_eq!(net.network(), net.addr());
        }
    }
}
