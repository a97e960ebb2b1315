// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end scenarios for the VxLAN gateway manager.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use net::{Mac, Vni};
use vxgw::bus::BusChannel;
use vxgw::{
    Bridge, BridgePortId, GatewayShutdown, MacLocation, MemMap, NetworkId, ReplicatedMap,
    VtepPeer, VtepPool, VxGateway, VxGatewayConfig, VxGatewayManager, VxLanPort, VxgwError,
    VxgwTopology,
};

const MAC_ON_BRIDGE: Mac = Mac([0xaa, 0, 0, 0, 0, 0x01]);
const MAC_ON_VTEP: Mac = Mac([0xaa, 0, 0, 0, 0, 0x02]);
const AGENT_TUNNEL: Ipv4Addr = Ipv4Addr::new(10, 20, 0, 1);
const VTEP_TUNNEL: Ipv4Addr = Ipv4Addr::new(10, 30, 0, 1);
const VTEP_MGMT: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 10);

#[derive(Default)]
struct FakeTopology {
    vxlan_ports: Mutex<HashMap<BridgePortId, VxLanPort>>,
    endpoints: Mutex<HashMap<BridgePortId, Ipv4Addr>>,
}

impl FakeTopology {
    fn add_vxlan_port(&self, port: VxLanPort) {
        self.vxlan_ports.lock().unwrap().insert(port.id, port);
    }
    fn bind(&self, port: BridgePortId, tunnel: Ipv4Addr) {
        self.endpoints.lock().unwrap().insert(port, tunnel);
    }
}

impl VxgwTopology for FakeTopology {
    fn vxlan_port(&self, id: BridgePortId) -> Option<VxLanPort> {
        self.vxlan_ports.lock().unwrap().get(&id).cloned()
    }
    fn tunnel_endpoint_of(&self, port: BridgePortId) -> Option<Ipv4Addr> {
        self.endpoints.lock().unwrap().get(&port).copied()
    }
}

struct Join {
    gateway: VxGateway,
    snapshot: Vec<MacLocation>,
    channel: BusChannel,
}

#[derive(Default)]
struct RecordingPeer {
    joins: Mutex<Vec<Join>>,
    abandons: Mutex<Vec<String>>,
}

impl RecordingPeer {
    fn take_join(&self) -> Join {
        self.joins.lock().unwrap().pop().expect("no join recorded")
    }
}

impl VtepPeer for RecordingPeer {
    fn join(&self, gateway: &VxGateway, snapshot: Vec<MacLocation>, channel: BusChannel) {
        self.joins.lock().unwrap().push(Join {
            gateway: gateway.clone(),
            snapshot,
            channel,
        });
    }
    fn abandon(&self, gateway: &VxGateway) {
        self.abandons.lock().unwrap().push(gateway.name.clone());
    }
}

#[derive(Default)]
struct FakePool {
    peers: Mutex<HashMap<(Ipv4Addr, u16), Arc<RecordingPeer>>>,
}

impl FakePool {
    fn peer_at(&self, mgmt_ip: Ipv4Addr, mgmt_port: u16) -> Arc<RecordingPeer> {
        self.peers
            .lock()
            .unwrap()
            .entry((mgmt_ip, mgmt_port))
            .or_default()
            .clone()
    }
}

impl VtepPool for FakePool {
    fn peer(&self, mgmt_ip: Ipv4Addr, mgmt_port: u16) -> Result<Arc<dyn VtepPeer>, VxgwError> {
        Ok(self.peer_at(mgmt_ip, mgmt_port))
    }
}

struct Rig {
    network: NetworkId,
    bridge_tx: watch::Sender<Option<Bridge>>,
    mac_ports: Arc<MemMap<Mac, BridgePortId>>,
    arp: Arc<MemMap<Ipv4Addr, Mac>>,
    topology: Arc<FakeTopology>,
    pool: Arc<FakePool>,
    bridge_port: BridgePortId,
    vxlan_port: VxLanPort,
}

/// One bridge with a local port carrying `MAC_ON_BRIDGE` and one VxLAN
/// port (towards a VTEP) carrying `MAC_ON_VTEP`; one IP per MAC in the ARP
/// table.
fn rig() -> Rig {
    let bridge_port = BridgePortId::random();
    let vxlan_port = VxLanPort {
        id: BridgePortId::random(),
        mgmt_ip: VTEP_MGMT,
        mgmt_port: 6632,
        vni: Vni::new_checked(5008).unwrap(),
        tunnel_ip: VTEP_TUNNEL,
    };

    let topology = Arc::new(FakeTopology::default());
    topology.add_vxlan_port(vxlan_port.clone());
    topology.bind(bridge_port, AGENT_TUNNEL);

    let mac_ports = Arc::new(MemMap::<Mac, BridgePortId>::new());
    mac_ports.put(MAC_ON_BRIDGE, bridge_port);
    mac_ports.put(MAC_ON_VTEP, vxlan_port.id);

    let arp = Arc::new(MemMap::<Ipv4Addr, Mac>::new());
    arp.put(Ipv4Addr::new(10, 0, 0, 1), MAC_ON_BRIDGE);
    arp.put(Ipv4Addr::new(10, 0, 0, 2), MAC_ON_VTEP);

    let (bridge_tx, _) = watch::channel(Some(Bridge {
        id: id::Id::random(),
        vxlan_port_ids: vec![vxlan_port.id],
    }));

    Rig {
        network: NetworkId::random(),
        bridge_tx,
        mac_ports,
        arp,
        topology,
        pool: Arc::new(FakePool::default()),
        bridge_port,
        vxlan_port,
    }
}

fn config(rig: &Rig) -> VxGatewayConfig {
    VxGatewayConfig {
        network_id: rig.network,
        bridge: rig.bridge_tx.subscribe(),
        mac_ports: rig.mac_ports.clone(),
        arp_table: rig.arp.clone(),
        topology: rig.topology.clone(),
        pool: rig.pool.clone(),
        flooding_proxy: None,
        on_close: None,
    }
}

fn find<'a>(locs: &'a [MacLocation], mac: Mac, ip: Option<Ipv4Addr>) -> &'a MacLocation {
    locs.iter()
        .find(|l| l.mac == mac && l.ip == ip)
        .unwrap_or_else(|| panic!("no location for {mac} / {ip:?} in {locs:?}"))
}

/// On join, the snapshot carries both MACs with tunnel IPs derived
/// from their respective sides.
#[tokio::test]
async fn join_snapshot_translates_both_sides() {
    let rig = rig();
    let manager = VxGatewayManager::new(config(&rig));
    let handle = tokio::spawn(manager.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peer = rig.pool.peer_at(VTEP_MGMT, 6632);
    let join = peer.take_join();
    assert_eq!(join.gateway.name, format!("mn-{}", rig.network));
    assert_eq!(join.gateway.vni, Some(Vni::new_checked(5008).unwrap()));

    // bridge-side MAC advertises the agent's tunnel endpoint
    let ls = join.gateway.name.clone();
    let loc = find(&join.snapshot, MAC_ON_BRIDGE, None);
    assert_eq!(loc.vxlan_tunnel_ip, Some(AGENT_TUNNEL));
    assert_eq!(loc.logical_switch, ls);
    let loc = find(&join.snapshot, MAC_ON_BRIDGE, Some(Ipv4Addr::new(10, 0, 0, 1)));
    assert_eq!(loc.vxlan_tunnel_ip, Some(AGENT_TUNNEL));

    // VTEP-side MAC advertises the VTEP's own tunnel IP
    let loc = find(&join.snapshot, MAC_ON_VTEP, None);
    assert_eq!(loc.vxlan_tunnel_ip, Some(VTEP_TUNNEL));
    let loc = find(&join.snapshot, MAC_ON_VTEP, Some(Ipv4Addr::new(10, 0, 0, 2)));
    assert_eq!(loc.vxlan_tunnel_ip, Some(VTEP_TUNNEL));

    handle.abort();
}

/// A MAC learned on a bridge port is republished; a MAC moving between
/// VTEP ports is not.
#[tokio::test]
async fn bridge_macs_republish_vtep_moves_do_not() {
    let rig = rig();
    let manager = VxGatewayManager::new(config(&rig));
    let handle = tokio::spawn(manager.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peer = rig.pool.peer_at(VTEP_MGMT, 6632);
    let mut join = peer.take_join();

    // a new MAC shows up on the bridge port
    let roamer = Mac([0xaa, 0, 0, 0, 0, 0x99]);
    rig.mac_ports.put(roamer, rig.bridge_port);
    let update = tokio::time::timeout(Duration::from_secs(1), join.channel.recv())
        .await
        .expect("peer should observe the bridge-side update")
        .unwrap();
    assert_eq!(update.mac, roamer);
    assert_eq!(update.vxlan_tunnel_ip, Some(AGENT_TUNNEL));

    // a binding refresh that stays on the VTEP side is the peers' business
    rig.mac_ports.put(MAC_ON_VTEP, rig.vxlan_port.id);
    let quiet = tokio::time::timeout(Duration::from_millis(100), join.channel.recv()).await;
    assert!(quiet.is_err(), "vtep-side updates must not be republished");

    handle.abort();
}

/// ARP changes for bridge-side MACs withdraw the old binding and advertise
/// the new one.
#[tokio::test]
async fn arp_updates_withdraw_and_advertise() {
    let rig = rig();
    let manager = VxGatewayManager::new(config(&rig));
    let handle = tokio::spawn(manager.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peer = rig.pool.peer_at(VTEP_MGMT, 6632);
    let mut join = peer.take_join();

    let ip = Ipv4Addr::new(10, 0, 0, 1);
    let new_mac = Mac([0xaa, 0, 0, 0, 0, 0x77]);
    rig.mac_ports.put(new_mac, rig.bridge_port);
    // drain the publication for the new MAC's port binding
    let _ = tokio::time::timeout(Duration::from_secs(1), join.channel.recv()).await;

    rig.arp.put(ip, new_mac);
    let withdrawal = tokio::time::timeout(Duration::from_secs(1), join.channel.recv())
        .await
        .expect("withdrawal expected")
        .unwrap();
    assert_eq!(withdrawal.mac, MAC_ON_BRIDGE);
    assert_eq!(withdrawal.ip, Some(ip));
    assert!(withdrawal.is_withdrawal());

    let advert = tokio::time::timeout(Duration::from_secs(1), join.channel.recv())
        .await
        .expect("advertisement expected")
        .unwrap();
    assert_eq!(advert.mac, new_mac);
    assert_eq!(advert.ip, Some(ip));
    assert_eq!(advert.vxlan_tunnel_ip, Some(AGENT_TUNNEL));

    handle.abort();
}

/// Unbinding the last VxLAN port terminates the manager cleanly and
/// abandons the peer; the bus disconnects its subscribers.
#[tokio::test]
async fn unbinding_terminates_and_abandons() {
    let rig = rig();
    let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut cfg = config(&rig);
    let flag = closed.clone();
    cfg.on_close = Some(Box::new(move || {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    }));
    let manager = VxGatewayManager::new(cfg);
    let handle = tokio::spawn(manager.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let peer = rig.pool.peer_at(VTEP_MGMT, 6632);
    let mut join = peer.take_join();

    rig.bridge_tx
        .send(Some(Bridge {
            id: id::Id::random(),
            vxlan_port_ids: vec![],
        }))
        .unwrap();

    let shutdown = handle.await.unwrap().unwrap();
    assert_eq!(shutdown, GatewayShutdown::NoVtepsBound);
    assert_eq!(peer.abandons.lock().unwrap().len(), 1);
    assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(join.channel.recv().await, None, "bus completed");
}

/// A second port with a different VNI is ignored; the gateway VNI is
/// monotonic.
#[tokio::test]
async fn mismatched_vni_port_is_ignored() {
    let rig = rig();
    let rogue = VxLanPort {
        id: BridgePortId::random(),
        mgmt_ip: Ipv4Addr::new(192, 168, 0, 20),
        mgmt_port: 6632,
        vni: Vni::new_checked(9999).unwrap(),
        tunnel_ip: Ipv4Addr::new(10, 30, 0, 2),
    };
    rig.topology.add_vxlan_port(rogue.clone());

    let manager = VxGatewayManager::new(config(&rig));
    let handle = tokio::spawn(manager.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    rig.bridge_tx
        .send(Some(Bridge {
            id: id::Id::random(),
            vxlan_port_ids: vec![rig.vxlan_port.id, rogue.id],
        }))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rogue_peer = rig.pool.peer_at(Ipv4Addr::new(192, 168, 0, 20), 6632);
    assert!(rogue_peer.joins.lock().unwrap().is_empty());
    // the original peer is unaffected
    let peer = rig.pool.peer_at(VTEP_MGMT, 6632);
    assert!(peer.abandons.lock().unwrap().is_empty());

    handle.abort();
}
