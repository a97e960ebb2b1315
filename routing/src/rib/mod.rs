// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing table with longest-prefix match.

pub mod rtablerw;

use crate::errors::RouterError;
use crate::ports::PortId;
use ipnet::Ipv4Net;
use iptrie::map::RTrieMap;
use iptrie::{IpPrefix, Ipv4Prefix};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// What to do with packets matching a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    /// Forward out of `next_hop_port`.
    Port,
    /// Silently discard.
    Blackhole,
    /// Discard and tell the sender.
    Reject,
    /// Deliver to the router itself.
    Local,
}

/// One routing table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dst: Ipv4Net,
    pub src: Ipv4Net,
    pub next_hop: NextHop,
    pub next_hop_port: Option<PortId>,
    pub next_hop_gateway: Ipv4Addr,
    /// Administrative weight; lower wins among same-prefix candidates.
    pub weight: u32,
}

impl Route {
    /// A `Port` route towards `gateway` out of `port`.
    #[must_use]
    pub fn to_port(dst: Ipv4Net, port: PortId, gateway: Ipv4Addr) -> Self {
        Self {
            dst,
            src: default_net(),
            next_hop: NextHop::Port,
            next_hop_port: Some(port),
            next_hop_gateway: gateway,
            weight: 100,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_src(mut self, src: Ipv4Net) -> Self {
        self.src = src;
        self
    }

    /// The gateway values that mean "use the packet's own destination".
    #[must_use]
    pub fn gateway_is_unset(&self) -> bool {
        self.next_hop_gateway == Ipv4Addr::UNSPECIFIED
            || self.next_hop_gateway == Ipv4Addr::BROADCAST
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} via {} {:?} [{}]",
            self.dst, self.next_hop_gateway, self.next_hop, self.weight
        )
    }
}

#[must_use]
fn default_net() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).unwrap_or_else(|_| unreachable!())
}

/// The routes of one router, stored under a destination-prefix trie.
pub struct RoutingTable {
    routes: RTrieMap<Ipv4Prefix, Vec<Route>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RoutingTable {
    fn clone(&self) -> Self {
        let mut fresh = Self::new();
        for (prefix, routes) in self.routes.iter() {
            for route in routes {
                fresh.insert_at(*prefix, route.clone());
            }
        }
        fresh
    }
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RTrieMap::with_capacity(0),
        }
    }

    /// Add a route.
    ///
    /// # Errors
    ///
    /// Rejects `Port` routes that carry no port id.
    pub fn add(&mut self, route: Route) -> Result<(), RouterError> {
        if route.next_hop == NextHop::Port && route.next_hop_port.is_none() {
            return Err(RouterError::RouteWithoutPort);
        }
        let prefix = as_prefix(route.dst);
        self.insert_at(prefix, route);
        Ok(())
    }

    /// Remove a route previously added, comparing all fields.
    pub fn del(&mut self, route: &Route) {
        let prefix = as_prefix(route.dst);
        if let Some(existing) = self.routes.get_mut(&prefix) {
            existing.retain(|r| r != route);
        }
    }

    fn insert_at(&mut self, prefix: Ipv4Prefix, route: Route) {
        if let Some(existing) = self.routes.get_mut(&prefix) {
            if !existing.contains(&route) {
                existing.push(route);
            }
        } else {
            self.routes.insert(prefix, vec![route]);
        }
    }

    /// Longest-prefix match on `dst`, filtered by each candidate's source
    /// CIDR and tie-broken by lowest weight. Falls back to shorter
    /// prefixes when every candidate at the best match is filtered out.
    #[must_use]
    pub fn lookup(&self, dst: Ipv4Addr, src: Ipv4Addr) -> Option<Route> {
        let mut target = Ipv4Prefix::from(dst);
        loop {
            let (prefix, routes) = self.routes.lookup(&target);
            let best = routes
                .iter()
                .filter(|r| r.src.contains(&src))
                .min_by_key(|r| r.weight);
            if let Some(route) = best {
                return Some(route.clone());
            }
            let len = prefix.len();
            if len == 0 {
                return None;
            }
            target = Ipv4Prefix::new(dst, len - 1).ok()?;
        }
    }

    /// Iterate every route in the table.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().flat_map(|(_, routes)| routes.iter())
    }
}

#[must_use]
fn as_prefix(net: Ipv4Net) -> Ipv4Prefix {
    Ipv4Prefix::new(net.network(), net.prefix_len())
        .unwrap_or_else(|_| Ipv4Prefix::from(net.network()))
}
