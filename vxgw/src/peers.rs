// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Seams towards the VTEP pool and the virtual topology.

use crate::bus::BusChannel;
use crate::errors::VxgwError;
use crate::types::{BridgePortId, MacLocation, VxGateway, VxLanPort};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// One hardware VTEP participating in a logical switch.
///
/// `join` hands the peer the current state of the switch plus its own bus
/// endpoint; the peer applies the snapshot, consumes further updates from
/// the channel, and writes what it learns from the hardware back into the
/// shared MAC map (never through the manager).
pub trait VtepPeer: Send + Sync {
    fn join(&self, gateway: &VxGateway, snapshot: Vec<MacLocation>, channel: BusChannel);
    fn abandon(&self, gateway: &VxGateway);
}

/// Hands out [`VtepPeer`] handles keyed by management endpoint.
pub trait VtepPool: Send + Sync {
    /// Resolve (or establish) the peer for the VTEP managed at
    /// `mgmt_ip:mgmt_port`.
    ///
    /// # Errors
    ///
    /// [`VxgwError::PeerUnavailable`] when the VTEP cannot be reached.
    fn peer(&self, mgmt_ip: Ipv4Addr, mgmt_port: u16) -> Result<Arc<dyn VtepPeer>, VxgwError>;
}

/// The slice of the virtual topology the gateway manager reads.
pub trait VxgwTopology: Send + Sync {
    /// Fetch the VxLAN port state for a bridge port.
    fn vxlan_port(&self, id: BridgePortId) -> Option<VxLanPort>;

    /// The VxLAN tunnel endpoint of the agent currently hosting `port`,
    /// when the port is bound somewhere.
    fn tunnel_endpoint_of(&self, port: BridgePortId) -> Option<Ipv4Addr>;
}
