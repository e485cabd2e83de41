use std::net::IpAddr;

use pnet::datalink::{self, NetworkInterface};

/// A network interface available for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    /// Human readable description. Often empty outside Windows.
    pub description: String,
    /// Addresses assigned to the interface.
    pub addresses: Vec<IpAddr>,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl From<NetworkInterface> for InterfaceInfo {
    fn from(iface: NetworkInterface) -> Self {
        Self {
            addresses: iface.ips.iter().map(|net| net.ip()).collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            name: iface.name,
            description: iface.description,
        }
    }
}

/// Lists the network interfaces available on this host.
pub fn interfaces() -> Vec<InterfaceInfo> {
    datalink::interfaces().into_iter().map(InterfaceInfo::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interfaces_are_named() {
        for iface in interfaces() {
            assert!(!iface.name.is_empty());
        }
    }
}
