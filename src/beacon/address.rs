//! Host Address Discovery
//!
//! Finds the IPv4 address the beacon advertises and derives the subnet
//! broadcast address from the interface netmask.

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// An IPv4 address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    /// Interface name (e.g. `eth0`)
    pub interface: String,
    pub ip: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
}

impl HostAddress {
    /// Subnet broadcast address for this host address
    pub fn broadcast(&self) -> Result<Ipv4Addr> {
        match self.netmask {
            Some(mask) if !mask.is_unspecified() => Ok(broadcast_address(self.ip, mask)),
            _ => Err(Error::MissingNetmask { ip: self.ip }),
        }
    }
}

/// Set every host bit: `octet | !mask_octet`
pub fn broadcast_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = mask.octets();
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = ip[i] | !mask[i];
    }
    Ipv4Addr::from(out)
}

/// Unicast address routable beyond the link (private ranges included)
pub fn is_global_unicast(ip: &Ipv4Addr) -> bool {
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_link_local())
}

/// Pick the first usable candidate, optionally restricted to one interface
pub fn select_host_address(
    candidates: &[HostAddress],
    interface: Option<&str>,
) -> Result<HostAddress> {
    candidates
        .iter()
        .filter(|c| interface.map_or(true, |name| c.interface == name))
        .find(|c| is_global_unicast(&c.ip))
        .cloned()
        .ok_or_else(|| Error::NoUsableAddress {
            interfaces: candidates
                .iter()
                .map(|c| format!("{}={}", c.interface, c.ip))
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Enumerate local interfaces and select the address to advertise
pub fn discover_host_address(interface: Option<&str>) -> Result<HostAddress> {
    let ifaces =
        if_addrs::get_if_addrs().map_err(|e| Error::InterfaceEnumeration(e.to_string()))?;

    let mut candidates = Vec::new();
    for iface in ifaces {
        debug!(interface = %iface.name, addr = %iface.ip(), "Inspecting address");
        if iface.is_loopback() {
            continue;
        }
        if let if_addrs::IfAddr::V4(v4) = &iface.addr {
            candidates.push(HostAddress {
                interface: iface.name.clone(),
                ip: v4.ip,
                netmask: Some(v4.netmask),
            });
        }
    }

    let selected = select_host_address(&candidates, interface)?;
    info!(
        interface = %selected.interface,
        ip = %selected.ip,
        "Selected host address for discovery"
    );
    Ok(selected)
}
