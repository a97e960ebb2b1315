// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet-processing pipeline of a single simulated L3 router.
//!
//! `process` runs pre-routing checks, a routing table lookup and
//! post-routing next-hop resolution, and returns the [`Action`] the
//! datapath should install. ICMP errors follow the RFC 1812 suppression
//! rules before anything is emitted.

use derive_builder::Builder;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::actions::{Action, FrameEmitter};
use crate::arp_table::ArpTable;
use crate::errors::RouterError;
use crate::ports::{PortId, PortKind, PortResolver, RouterPort};
use crate::rib::rtablerw::RtableReader;
use crate::rib::{NextHop, Route};
use net::arp::{Arp, ArpOp};
use net::eth::{EthPayload, Ethernet};
use net::icmp4::Icmp4;
use net::ipv4::{IpPayload, Ipv4Packet};
use net::Mac;

/// The ICMP errors the pipeline can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcmpError {
    TimeExceeded,
    NetUnreachable,
    HostUnreachable,
    AdminProhibited,
}

/// A simulated router. All collaborators are injected; the pipeline never
/// reaches into a process-wide registry.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Router {
    #[builder(setter(into), default = "router".to_string())]
    name: String,
    rtable: RtableReader,
    arp_table: Arc<ArpTable>,
    ports: Arc<dyn PortResolver>,
    emitter: Arc<dyn FrameEmitter>,
}

impl Router {
    /// Process one frame received on `ingress`.
    ///
    /// Every step that may wait (ARP resolution) is bounded by `deadline`.
    ///
    /// # Errors
    ///
    /// [`RouterError::Timeout`] when next-hop resolution misses the
    /// deadline; the caller drops the packet.
    pub async fn process(
        &self,
        ingress: PortId,
        frame: &Ethernet,
        deadline: Instant,
    ) -> Result<Action, RouterError> {
        if matches!(frame.payload, EthPayload::Raw(..)) {
            return Ok(Action::NotIpv4);
        }
        let Some(in_port) = self.ports.port(ingress) else {
            debug!("{}: unknown ingress port {ingress}", self.name);
            return Ok(Action::Drop);
        };

        // pre-routing
        if frame.dst.is_broadcast() {
            if let Some(arp) = frame.arp() {
                if arp.op == ArpOp::Request {
                    return Ok(self.reply_to_arp_request(&in_port, arp));
                }
            }
            return Ok(Action::Drop);
        }
        if frame.dst != in_port.mac {
            warn!(
                "{}: unicast frame for {} on port with mac {}",
                self.name, frame.dst, in_port.mac
            );
            return Ok(Action::Drop);
        }
        if let Some(arp) = frame.arp() {
            return Ok(match arp.op {
                ArpOp::Reply => {
                    self.process_arp_reply(&in_port, arp);
                    Action::Consumed
                }
                _ => Action::Drop,
            });
        }
        let Some(ip) = frame.ip() else {
            return Ok(Action::Drop);
        };
        if ip.dst == in_port.ip {
            return Ok(self.reply_to_echo(&in_port, frame, ip));
        }
        if ip.ttl <= 1 {
            self.send_icmp_error(IcmpError::TimeExceeded, &in_port, frame, ip, None);
            return Ok(Action::Drop);
        }
        let mut fwd = ip.clone();
        fwd.ttl -= 1;

        // routing
        let Some(route) = self.rtable.lookup(fwd.dst, fwd.src) else {
            self.send_icmp_error(IcmpError::NetUnreachable, &in_port, frame, ip, None);
            return Ok(Action::Drop);
        };
        match route.next_hop {
            NextHop::Blackhole => return Ok(Action::Drop),
            NextHop::Reject => {
                self.send_icmp_error(IcmpError::AdminProhibited, &in_port, frame, ip, None);
                return Ok(Action::Drop);
            }
            NextHop::Local => return Ok(self.reply_to_echo(&in_port, frame, ip)),
            NextHop::Port => {}
        }
        let Some(out_id) = route.next_hop_port else {
            return Ok(Action::Drop);
        };
        let Some(out_port) = self.ports.port(out_id) else {
            debug!("{}: route {route} names an unknown port", self.name);
            return Ok(Action::Drop);
        };

        // post-routing
        if fwd.dst == out_port.ip {
            return Ok(self.reply_to_echo(&in_port, frame, ip));
        }
        let next_hop = self
            .next_hop_mac(&route, &out_port, fwd.dst, deadline)
            .await?;
        let Some(mac) = next_hop else {
            let kind = if route.gateway_is_unset() {
                IcmpError::HostUnreachable
            } else {
                IcmpError::NetUnreachable
            };
            self.send_icmp_error(kind, &in_port, frame, ip, Some(&out_port));
            return Ok(Action::Drop);
        };
        Ok(Action::ToPort {
            port: out_port.id,
            frame: Ethernet::new(out_port.mac, mac, EthPayload::Ip(fwd)),
        })
    }

    /// Route and emit a packet generated by the router itself. Skips
    /// ingress checks and pre-routing; drops silently on any failure.
    pub async fn send_ip_packet(&self, packet: Ipv4Packet, deadline: Instant) {
        let Some(route) = self.rtable.lookup(packet.dst, packet.src) else {
            debug!("{}: no route for locally generated packet", self.name);
            return;
        };
        if route.next_hop != NextHop::Port {
            return;
        }
        let Some(out_id) = route.next_hop_port else {
            return;
        };
        let Some(out_port) = self.ports.port(out_id) else {
            return;
        };
        if packet.dst == out_port.ip {
            return;
        }
        let Ok(Some(mac)) = self
            .next_hop_mac(&route, &out_port, packet.dst, deadline)
            .await
        else {
            return;
        };
        self.emitter.emit(
            out_port.id,
            Ethernet::new(out_port.mac, mac, EthPayload::Ip(packet)),
        );
    }

    /// Answer an ARP request addressed to this port's IP.
    fn reply_to_arp_request(&self, port: &RouterPort, arp: &Arp) -> Action {
        if !arp.is_ethernet_ipv4() || arp.tpa != port.ip {
            return Action::Drop;
        }
        let reply = Arp::reply(port.mac, port.ip, arp.sha, arp.spa);
        self.emitter
            .emit(port.id, Ethernet::new(port.mac, arp.sha, EthPayload::Arp(reply)));
        Action::Consumed
    }

    /// Learn from an ARP reply addressed to this port.
    fn process_arp_reply(&self, port: &RouterPort, arp: &Arp) {
        if !arp.is_ethernet_ipv4() || arp.tpa != port.ip || arp.tha != port.mac {
            debug!("{}: ignoring mis-addressed arp reply", self.name);
            return;
        }
        self.arp_table.set(arp.spa, arp.sha);
    }

    /// Locally addressed traffic: echo requests get a reply, everything
    /// else is dropped.
    fn reply_to_echo(&self, in_port: &RouterPort, frame: &Ethernet, ip: &Ipv4Packet) -> Action {
        let Some(icmp) = ip.icmp_payload() else {
            return Action::Drop;
        };
        if !icmp.is_echo_request() {
            return Action::Drop;
        }
        let Some(echo) = icmp.echo() else {
            return Action::Drop;
        };
        let reply = Icmp4::echo_reply(echo.id, echo.seq, &icmp.payload);
        let reply_ip = Ipv4Packet::icmp(ip.dst, ip.src, reply);
        self.emitter.emit(
            in_port.id,
            Ethernet::new(in_port.mac, frame.src, EthPayload::Ip(reply_ip)),
        );
        Action::Consumed
    }

    /// Resolve the next-hop MAC for a `Port` route.
    async fn next_hop_mac(
        &self,
        route: &Route,
        out_port: &RouterPort,
        pkt_dst: Ipv4Addr,
        deadline: Instant,
    ) -> Result<Option<Mac>, RouterError> {
        if let PortKind::Interior { peer } = out_port.kind {
            return Ok(self.ports.port(peer).map(|p| p.mac));
        }
        let nh_ip = if route.gateway_is_unset() {
            pkt_dst
        } else {
            route.next_hop_gateway
        };
        self.arp_table.get(nh_ip, out_port, deadline).await
    }

    /// Emit an ICMP error towards the trigger's source, unless RFC 1812
    /// forbids it.
    fn send_icmp_error(
        &self,
        kind: IcmpError,
        in_port: &RouterPort,
        frame: &Ethernet,
        trigger: &Ipv4Packet,
        out_port: Option<&RouterPort>,
    ) {
        if !can_send_icmp_error(frame, trigger, out_port) {
            debug!("{}: icmp error suppressed for {} -> {}", self.name, trigger.src, trigger.dst);
            return;
        }
        let icmp = match kind {
            IcmpError::TimeExceeded => Icmp4::time_exceeded(trigger),
            IcmpError::NetUnreachable => Icmp4::net_unreachable(trigger),
            IcmpError::HostUnreachable => Icmp4::host_unreachable(trigger),
            IcmpError::AdminProhibited => Icmp4::admin_prohibited(trigger),
        };
        let error_ip = Ipv4Packet::icmp(in_port.ip, trigger.src, icmp);
        self.emitter.emit(
            in_port.id,
            Ethernet::new(in_port.mac, frame.src, EthPayload::Ip(error_ip)),
        );
    }
}

/// RFC 1812 section 4.3.2.7: when not to generate an ICMP error.
fn can_send_icmp_error(
    frame: &Ethernet,
    trigger: &Ipv4Packet,
    out_port: Option<&RouterPort>,
) -> bool {
    // never answer an ICMP error with another
    if let IpPayload::Icmp(icmp) = &trigger.payload {
        if icmp.is_error_message() {
            return false;
        }
    }
    if trigger.dst.is_multicast() {
        return false;
    }
    // directed broadcast, judged against the egress network when known
    if let Some(out_port) = out_port {
        if trigger.dst == out_port.subnet_broadcast() {
            return false;
        }
    }
    // covers link-layer broadcast too
    if frame.dst.is_multicast() {
        return false;
    }
    if trigger.src == Ipv4Addr::BROADCAST || trigger.dst == Ipv4Addr::BROADCAST {
        return false;
    }
    // only the first fragment may trigger errors
    if trigger.frag_offset != 0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::ipv4::IpProto;

    fn frame(dst: Mac, trigger: Ipv4Packet) -> Ethernet {
        Ethernet::new(Mac([2, 0, 0, 0, 0, 1]), dst, EthPayload::Ip(trigger))
    }

    fn udp(src: &str, dst: &str) -> Ipv4Packet {
        Ipv4Packet {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            ttl: 64,
            proto: IpProto::UDP,
            frag_offset: 0,
            payload: IpPayload::Unknown(vec![0; 16]),
        }
    }

    fn egress_port() -> RouterPort {
        RouterPort {
            id: PortId::random(),
            mac: Mac([0xaa, 0, 0, 0, 0, 2]),
            ip: "10.0.1.1".parse().unwrap(),
            network: "10.0.1.0/24".parse().unwrap(),
            kind: PortKind::Exterior,
        }
    }

    #[test]
    fn suppresses_error_about_icmp_error() {
        let trigger = Ipv4Packet::icmp(
            "10.0.0.2".parse().unwrap(),
            "10.0.1.2".parse().unwrap(),
            Icmp4::net_unreachable(&udp("1.1.1.1", "2.2.2.2")),
        );
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), trigger.clone());
        assert!(!can_send_icmp_error(&eth, &trigger, None));
    }

    #[test]
    fn allows_error_about_echo_request() {
        let trigger = Ipv4Packet::icmp(
            "10.0.0.2".parse().unwrap(),
            "10.0.1.2".parse().unwrap(),
            Icmp4::echo_request(1, 1, b"x"),
        );
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), trigger.clone());
        assert!(can_send_icmp_error(&eth, &trigger, None));
    }

    #[test]
    fn suppresses_error_for_multicast_and_broadcast_destinations() {
        let multicast = udp("10.0.0.2", "224.0.0.9");
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), multicast.clone());
        assert!(!can_send_icmp_error(&eth, &multicast, None));

        let directed = udp("10.0.0.2", "10.0.1.255");
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), directed.clone());
        let out = egress_port();
        assert!(!can_send_icmp_error(&eth, &directed, Some(&out)));
        // without the egress context the directed broadcast is not knowable
        assert!(can_send_icmp_error(&eth, &directed, None));
    }

    #[test]
    fn suppresses_error_for_l2_multicast_and_all_ones() {
        let trigger = udp("10.0.0.2", "10.0.1.2");
        let eth = frame(Mac::BROADCAST, trigger.clone());
        assert!(!can_send_icmp_error(&eth, &trigger, None));

        let all_ones = udp("255.255.255.255", "10.0.1.2");
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), all_ones.clone());
        assert!(!can_send_icmp_error(&eth, &all_ones, None));
    }

    #[test]
    fn suppresses_error_for_later_fragments() {
        let mut trigger = udp("10.0.0.2", "10.0.1.2");
        trigger.frag_offset = 185;
        let eth = frame(Mac([0xaa, 0, 0, 0, 0, 1]), trigger.clone());
        assert!(!can_send_icmp_error(&eth, &trigger, None));
    }
}
