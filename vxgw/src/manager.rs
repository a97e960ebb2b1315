// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control loop that keeps one bridge's MAC/ARP state mirrored across the
//! VTEPs participating in its logical switch.
//!
//! The manager is the single writer of its port and peer maps; store
//! watchers only enqueue messages into the loop. Bridge-origin updates are
//! republished on the bus; peer-origin updates never pass through here
//! (peers write the shared MAC map directly).

use ahash::RandomState;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::bus::{BusChannel, VxGatewayBus};
use crate::errors::VxgwError;
use crate::map::{MapUpdate, ReplicatedMap};
use crate::peers::{VtepPeer, VtepPool, VxgwTopology};
use crate::types::{Bridge, BridgePortId, MacLocation, NetworkId, VxGateway, VxLanPort};
use net::Mac;

/// Why a manager stopped; both reasons are clean terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayShutdown {
    BridgeDeleted,
    NoVtepsBound,
}

/// Everything a gateway manager needs; all collaborators are injected.
pub struct VxGatewayConfig {
    pub network_id: NetworkId,
    /// Current bridge state; `None` means the bridge was deleted.
    pub bridge: watch::Receiver<Option<Bridge>>,
    pub mac_ports: Arc<dyn ReplicatedMap<Mac, BridgePortId>>,
    pub arp_table: Arc<dyn ReplicatedMap<Ipv4Addr, Mac>>,
    pub topology: Arc<dyn VxgwTopology>,
    pub pool: Arc<dyn VtepPool>,
    /// Tunnel endpoint for BUM traffic when a MAC lands somewhere without
    /// one of its own.
    pub flooding_proxy: Option<Ipv4Addr>,
    pub on_close: Option<Box<dyn FnOnce() + Send>>,
}

/// The per-bridge synchronization loop. Create with [`VxGatewayManager::new`],
/// then drive it to completion with [`VxGatewayManager::run`].
pub struct VxGatewayManager {
    gateway: VxGateway,
    bridge: watch::Receiver<Option<Bridge>>,
    mac_ports: Arc<dyn ReplicatedMap<Mac, BridgePortId>>,
    arp_table: Arc<dyn ReplicatedMap<Ipv4Addr, Mac>>,
    topology: Arc<dyn VxgwTopology>,
    pool: Arc<dyn VtepPool>,
    flooding_proxy: Option<Ipv4Addr>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
    bus: VxGatewayBus,
    publisher: BusChannel,
    vxlan_ports: HashMap<BridgePortId, VxLanPort, RandomState>,
    peers: HashMap<BridgePortId, Arc<dyn VtepPeer>, RandomState>,
}

impl VxGatewayManager {
    #[must_use]
    pub fn new(config: VxGatewayConfig) -> Self {
        let gateway = VxGateway::new(config.network_id);
        let bus = VxGatewayBus::new(&gateway.name);
        let publisher = bus.connect();
        Self {
            gateway,
            bridge: config.bridge,
            mac_ports: config.mac_ports,
            arp_table: config.arp_table,
            topology: config.topology,
            pool: config.pool,
            flooding_proxy: config.flooding_proxy,
            on_close: config.on_close,
            bus,
            publisher,
            vxlan_ports: HashMap::with_hasher(RandomState::new()),
            peers: HashMap::with_hasher(RandomState::new()),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &VxGateway {
        &self.gateway
    }

    /// Run until the bridge is deleted or leaves the gateway.
    ///
    /// # Errors
    ///
    /// [`VxgwError::State`] when a store watch stream dies under the
    /// manager.
    pub async fn run(mut self) -> Result<GatewayShutdown, VxgwError> {
        let mut bridge_rx = self.bridge.clone();
        let mut mac_rx = self.mac_ports.watch();
        let mut arp_rx = self.arp_table.watch();

        info!("gateway {}: starting", self.gateway.name);
        let initial = bridge_rx.borrow_and_update().clone();
        let early = match initial {
            None => Some(GatewayShutdown::BridgeDeleted),
            Some(bridge) => self.reconcile(&bridge),
        };
        if let Some(shutdown) = early {
            return Ok(self.terminate(shutdown));
        }

        let shutdown = loop {
            tokio::select! {
                changed = bridge_rx.changed() => {
                    if changed.is_err() {
                        break GatewayShutdown::BridgeDeleted;
                    }
                    let bridge = bridge_rx.borrow_and_update().clone();
                    match bridge {
                        None => break GatewayShutdown::BridgeDeleted,
                        Some(bridge) => {
                            if let Some(shutdown) = self.reconcile(&bridge) {
                                break shutdown;
                            }
                        }
                    }
                }
                update = mac_rx.recv() => match update {
                    Ok(update) => self.on_mac_port_update(&update),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("gateway {}: mac watcher lagged by {n}", self.gateway.name);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(VxgwError::State("mac-port watch closed".to_owned()));
                    }
                },
                update = arp_rx.recv() => match update {
                    Ok(update) => self.on_arp_update(&update),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("gateway {}: arp watcher lagged by {n}", self.gateway.name);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(VxgwError::State("arp watch closed".to_owned()));
                    }
                },
            }
        };
        Ok(self.terminate(shutdown))
    }

    /// Bring the tracked port set in line with the bridge: abandon peers of
    /// unbound ports, attach peers for new ones.
    fn reconcile(&mut self, bridge: &Bridge) -> Option<GatewayShutdown> {
        let bound: HashSet<BridgePortId> = bridge.vxlan_port_ids.iter().copied().collect();

        let removed: Vec<BridgePortId> = self
            .vxlan_ports
            .keys()
            .filter(|id| !bound.contains(id))
            .copied()
            .collect();
        for id in removed {
            self.vxlan_ports.remove(&id);
            if let Some(peer) = self.peers.remove(&id) {
                info!("gateway {}: port {id} unbound, abandoning vtep", self.gateway.name);
                peer.abandon(&self.gateway);
            }
        }

        for id in &bridge.vxlan_port_ids {
            if self.vxlan_ports.contains_key(id) {
                continue;
            }
            let Some(vport) = self.topology.vxlan_port(*id) else {
                warn!("gateway {}: vxlan port {id} not found", self.gateway.name);
                continue;
            };
            match self.gateway.vni {
                None => self.gateway.vni = Some(vport.vni),
                Some(vni) if vni != vport.vni => {
                    warn!(
                        "gateway {}: port {id} carries vni {} but the gateway uses {vni}, ignoring",
                        self.gateway.name, vport.vni
                    );
                    continue;
                }
                Some(_) => {}
            }
            let mgmt_ip = vport.mgmt_ip;
            let mgmt_port = vport.mgmt_port;
            // track the port before snapshotting so its own MACs translate
            // as VTEP-side entries
            self.vxlan_ports.insert(*id, vport);
            let peer = match self.pool.peer(mgmt_ip, mgmt_port) {
                Ok(peer) => peer,
                Err(e) => {
                    warn!("gateway {}: cannot attach vtep for port {id}: {e}", self.gateway.name);
                    // untrack so the next bridge update retries the attach
                    self.vxlan_ports.remove(id);
                    continue;
                }
            };
            let snapshot = self.snapshot();
            debug!(
                "gateway {}: vtep at {mgmt_ip} joining with {} snapshot entries",
                self.gateway.name,
                snapshot.len()
            );
            peer.join(&self.gateway, snapshot, self.bus.connect());
            self.peers.insert(*id, peer);
        }

        if self.vxlan_ports.is_empty() {
            Some(GatewayShutdown::NoVtepsBound)
        } else {
            None
        }
    }

    /// A port is bridge-local when it is not one of the tracked VxLAN
    /// ports.
    fn is_bridge_port(&self, port: Option<BridgePortId>) -> bool {
        port.is_some_and(|port| !self.vxlan_ports.contains_key(&port))
    }

    fn on_mac_port_update(&self, update: &MapUpdate<Mac, BridgePortId>) {
        if !self.is_bridge_port(update.old) && !self.is_bridge_port(update.new) {
            // moves strictly between VTEPs are carried by the peers
            return;
        }
        for location in self.to_mac_locations(update.key, update.new, update.old, true) {
            self.publisher.publish(location);
        }
    }

    fn on_arp_update(&self, update: &MapUpdate<Ipv4Addr, Mac>) {
        let ip = update.key;
        if let Some(old_mac) = update.old {
            if let Some(port) = self.mac_ports.get(&old_mac) {
                if self.is_bridge_port(Some(port)) {
                    self.publisher
                        .publish(MacLocation::withdrawal(old_mac, Some(ip), &self.gateway.name));
                }
            }
        }
        if let Some(new_mac) = update.new {
            if let Some(port) = self.mac_ports.get(&new_mac) {
                if self.is_bridge_port(Some(port)) {
                    self.advertise_mac_and_ip_at(new_mac, ip, port);
                }
            }
        }
    }

    /// Publish an (ip, mac) binding, re-checking that the MAC still lives
    /// at the port the update was computed against.
    fn advertise_mac_and_ip_at(&self, mac: Mac, ip: Ipv4Addr, port: BridgePortId) {
        if self.mac_ports.get(&mac) != Some(port) {
            debug!("gateway {}: {mac} moved, skipping advertisement", self.gateway.name);
            return;
        }
        let Some(tunnel) = self.topology.tunnel_endpoint_of(port) else {
            warn!("gateway {}: no tunnel endpoint for port {port}", self.gateway.name);
            return;
        };
        self.publisher.publish(MacLocation::new(
            mac,
            Some(ip),
            &self.gateway.name,
            Some(tunnel),
        ));
    }

    /// Translate one MAC-port binding into the updates the peers should
    /// see.
    fn to_mac_locations(
        &self,
        mac: Mac,
        new_port: Option<BridgePortId>,
        old_port: Option<BridgePortId>,
        only_bridge: bool,
    ) -> Vec<MacLocation> {
        let involves_bridge = self.is_bridge_port(new_port) || self.is_bridge_port(old_port);
        if only_bridge && !involves_bridge {
            return vec![];
        }
        let ls = self.gateway.name.clone();
        let tunnel_dst = new_port.and_then(|port| {
            if involves_bridge {
                self.topology.tunnel_endpoint_of(port)
            } else {
                self.vxlan_ports.get(&port).map(|v| v.tunnel_ip)
            }
        });
        let known_ips = || {
            self.arp_table
                .snapshot()
                .into_iter()
                .filter(|(_, m)| *m == mac)
                .map(|(ip, _)| ip)
        };

        match (tunnel_dst, new_port) {
            (Some(tunnel), _) => {
                let mut out = vec![MacLocation::new(mac, None, &ls, Some(tunnel))];
                out.extend(known_ips().map(|ip| MacLocation::new(mac, Some(ip), &ls, Some(tunnel))));
                out
            }
            (None, Some(_)) => {
                // bound somewhere without a tunnel endpoint: withdraw, and
                // point the known IPs at the flooding proxy if one is
                // configured
                let mut out = vec![MacLocation::withdrawal(mac, None, &ls)];
                match self.flooding_proxy {
                    Some(proxy) => out.extend(
                        known_ips().map(|ip| MacLocation::new(mac, Some(ip), &ls, Some(proxy))),
                    ),
                    None => warn!(
                        "gateway {ls}: no flooding proxy configured, {mac} reachable nowhere"
                    ),
                }
                out
            }
            (None, None) => vec![MacLocation::withdrawal(mac, None, &ls)],
        }
    }

    /// Full translation of the MAC-port map, handed to a VTEP on join.
    fn snapshot(&self) -> Vec<MacLocation> {
        self.mac_ports
            .snapshot()
            .into_iter()
            .flat_map(|(mac, port)| self.to_mac_locations(mac, Some(port), None, false))
            .collect()
    }

    fn terminate(mut self, shutdown: GatewayShutdown) -> GatewayShutdown {
        info!("gateway {}: terminating ({shutdown:?})", self.gateway.name);
        self.bus.complete();
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
        shutdown
    }
}
