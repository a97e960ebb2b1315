// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router port model and the port-lookup seam.

use ahash::RandomState;
use id::Id;
use ipnet::Ipv4Net;
use net::Mac;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

pub type PortId = Id<RouterPort>;

/// Whether a port faces the outside world or another virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Exterior,
    /// Interior ports are wired to a peer port on another device.
    Interior { peer: PortId },
}

/// A port of a simulated router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterPort {
    pub id: PortId,
    pub mac: Mac,
    pub ip: Ipv4Addr,
    /// The network directly attached to this port.
    pub network: Ipv4Net,
    pub kind: PortKind,
}

impl RouterPort {
    #[must_use]
    pub fn is_exterior(&self) -> bool {
        matches!(self.kind, PortKind::Exterior)
    }

    /// True iff `ip` is on this port's local segment. A /0 network matches
    /// every address.
    #[must_use]
    pub fn is_link_local(&self, ip: Ipv4Addr) -> bool {
        self.network.prefix_len() == 0 || self.network.contains(&ip)
    }

    /// The directed broadcast address of the attached network.
    #[must_use]
    pub fn subnet_broadcast(&self) -> Ipv4Addr {
        self.network.broadcast()
    }
}

/// Resolves port ids to port state.
///
/// The topology cache implements this; the router never reaches back into a
/// process-wide registry.
pub trait PortResolver: Send + Sync {
    fn port(&self, id: PortId) -> Option<RouterPort>;
}

/// A [`PortResolver`] over a plain map. Used by the standalone agent wiring
/// and throughout the test suites.
#[derive(Default)]
pub struct StaticPorts(RwLock<HashMap<PortId, RouterPort, RandomState>>);

impl StaticPorts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, port: RouterPort) {
        self.0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(port.id, port);
    }

    pub fn remove(&self, id: PortId) {
        self.0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
    }
}

impl PortResolver for StaticPorts {
    fn port(&self, id: PortId) -> Option<RouterPort> {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(net: &str) -> RouterPort {
        RouterPort {
            id: PortId::random(),
            mac: Mac([0xaa, 0, 0, 0, 0, 1]),
            ip: Ipv4Addr::new(10, 0, 0, 1),
            network: net.parse().unwrap(),
            kind: PortKind::Exterior,
        }
    }

    #[test]
    fn link_local_check() {
        let p = port("10.0.0.0/24");
        assert!(p.is_link_local(Ipv4Addr::new(10, 0, 0, 200)));
        assert!(!p.is_link_local(Ipv4Addr::new(10, 0, 1, 1)));
        assert_eq!(p.subnet_broadcast(), Ipv4Addr::new(10, 0, 0, 255));
    }

    #[test]
    fn zero_length_network_matches_everything() {
        let p = port("0.0.0.0/0");
        assert!(p.is_link_local(Ipv4Addr::new(192, 168, 90, 1)));
    }

    #[test]
    fn static_ports_resolve() {
        let ports = StaticPorts::new();
        let p = port("10.0.0.0/24");
        let id = p.id;
        ports.add(p.clone());
        assert_eq!(PortResolver::port(&ports, id), Some(p));
        ports.remove(id);
        assert!(PortResolver::port(&ports, id).is_none());
    }
}
