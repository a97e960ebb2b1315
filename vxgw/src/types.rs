// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! State objects shared across the gateway synchronization machinery.

use id::Id;
use net::{Mac, Vni};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// Marker for Neutron network ids.
pub struct Network;
pub type NetworkId = Id<Network>;

/// Marker for ports of the synchronized virtual bridge.
pub struct BridgePort;
pub type BridgePortId = Id<BridgePort>;

/// A virtual bridge, reduced to what the gateway manager tracks: the set of
/// VxLAN ports currently bound to hardware VTEPs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    pub id: Id<Bridge>,
    pub vxlan_port_ids: Vec<BridgePortId>,
}

/// A VxLAN port binding a bridge to one hardware VTEP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxLanPort {
    pub id: BridgePortId,
    /// Management address of the VTEP.
    pub mgmt_ip: Ipv4Addr,
    pub mgmt_port: u16,
    pub vni: Vni,
    /// Tunnel endpoint the VTEP terminates VxLAN on.
    pub tunnel_ip: Ipv4Addr,
}

/// The per-network gateway identity: one logical switch shared by the
/// bridge and every participating VTEP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VxGateway {
    pub network_id: NetworkId,
    /// Logical switch name, `mn-<network id>`.
    pub name: String,
    /// Adopted from the first bound port; monotonic once set.
    pub vni: Option<Vni>,
}

impl VxGateway {
    #[must_use]
    pub fn new(network_id: NetworkId) -> Self {
        Self {
            network_id,
            name: logical_switch_name(network_id),
            vni: None,
        }
    }
}

/// The canonical logical-switch name for a network.
#[must_use]
pub fn logical_switch_name(network_id: NetworkId) -> String {
    format!("mn-{network_id}")
}

/// "MAC `mac` (optionally with IP `ip`) is reachable at VxLAN tunnel IP
/// `vxlan_tunnel_ip` on logical switch `logical_switch`"; a `None` tunnel
/// IP withdraws the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacLocation {
    pub mac: Mac,
    pub ip: Option<Ipv4Addr>,
    pub logical_switch: String,
    pub vxlan_tunnel_ip: Option<Ipv4Addr>,
}

impl MacLocation {
    #[must_use]
    pub fn new(
        mac: Mac,
        ip: Option<Ipv4Addr>,
        logical_switch: &str,
        vxlan_tunnel_ip: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            mac,
            ip,
            logical_switch: logical_switch.to_owned(),
            vxlan_tunnel_ip,
        }
    }

    /// A withdrawal of whatever binding `mac` (and optionally `ip`) had.
    #[must_use]
    pub fn withdrawal(mac: Mac, ip: Option<Ipv4Addr>, logical_switch: &str) -> Self {
        Self::new(mac, ip, logical_switch, None)
    }

    #[must_use]
    pub fn is_withdrawal(&self) -> bool {
        self.vxlan_tunnel_ip.is_none()
    }
}

impl Display for MacLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mac)?;
        if let Some(ip) = self.ip {
            write!(f, "/{ip}")?;
        }
        match self.vxlan_tunnel_ip {
            Some(tunnel) => write!(f, "@{}:{tunnel}", self.logical_switch),
            None => write!(f, "@{}:withdrawn", self.logical_switch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_name_carries_the_network_id() {
        let network = NetworkId::random();
        let gw = VxGateway::new(network);
        assert_eq!(gw.name, format!("mn-{network}"));
        assert!(gw.vni.is_none());
    }

    #[test]
    fn withdrawal_has_no_tunnel_ip() {
        let mac = Mac([0xaa, 0, 0, 0, 0, 1]);
        let loc = MacLocation::withdrawal(mac, None, "mn-x");
        assert!(loc.is_withdrawal());
        let loc = MacLocation::new(mac, None, "mn-x", Some(Ipv4Addr::new(10, 9, 9, 9)));
        assert!(!loc.is_withdrawal());
    }
}
