// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed model of the VPN service and its rendering into the `ipsec.conf`
//! and `ipsec.secrets` files.
//!
//! The renders are deterministic functions of the service and its admin-up
//! connections, in list order; the file contents are fixed down to the
//! byte.

use ipnet::Ipv4Net;
use net::Mac;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// The service half of the container model: addressing for the namespace
/// the VPN runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecServiceDef {
    pub name: String,
    /// Working directory owned by the container for the service lifetime.
    pub filepath: PathBuf,
    pub local_endpoint_ip: Ipv4Addr,
    pub local_endpoint_mac: Mac,
    /// Address (with subnet) of the namespace-side interface.
    pub namespace_interface_ip: Ipv4Net,
    pub namespace_gateway_ip: Ipv4Addr,
    pub namespace_gateway_mac: Mac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DpdAction {
    Hold,
    Clear,
    Restart,
    RestartByPeer,
    Disabled,
}

impl DpdAction {
    #[must_use]
    pub fn rendered(self) -> &'static str {
        match self {
            DpdAction::Hold => "hold",
            DpdAction::Clear => "clear",
            DpdAction::Restart => "restart",
            DpdAction::RestartByPeer => "restart-by-peer",
            DpdAction::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Initiator {
    BiDirectional,
    ResponseOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IkeVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncapsulationMode {
    Tunnel,
    Transport,
}

impl EncapsulationMode {
    #[must_use]
    pub fn rendered(self) -> &'static str {
        match self {
            EncapsulationMode::Tunnel => "tunnel",
            EncapsulationMode::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformProtocol {
    Esp,
    AhEsp,
}

impl TransformProtocol {
    #[must_use]
    pub fn rendered(self) -> &'static str {
        match self {
            TransformProtocol::Esp => "esp",
            TransformProtocol::AhEsp => "ah-esp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkePolicy {
    pub version: IkeVersion,
    pub lifetime_s: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecPolicy {
    pub encapsulation_mode: EncapsulationMode,
    pub transform_protocol: TransformProtocol,
    pub lifetime_s: u32,
}

/// One site-to-site connection of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecSiteConnection {
    pub name: String,
    pub admin_state_up: bool,
    pub peer_address: Ipv4Addr,
    pub psk: String,
    pub local_cidr: Ipv4Net,
    pub peer_cidrs: Vec<Ipv4Net>,
    pub mtu: u16,
    pub dpd_action: DpdAction,
    pub dpd_interval: u32,
    pub dpd_timeout: u32,
    pub initiator: Initiator,
    pub ike_policy: IkePolicy,
    pub ipsec_policy: IpsecPolicy,
}

/// The resolved container configuration: service plus ordered connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecConfig {
    pub service: IpsecServiceDef,
    pub connections: Vec<IpsecSiteConnection>,
}

/// Connection names keep only `[A-Za-z0-9_]`; everything else is dropped.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

impl IpsecConfig {
    /// The connections that participate in the render.
    pub fn admin_up(&self) -> impl Iterator<Item = &IpsecSiteConnection> {
        self.connections.iter().filter(|c| c.admin_state_up)
    }

    /// True when nothing would be rendered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admin_up().next().is_none()
    }

    /// Render `ipsec.secrets`: one PSK line per admin-up connection.
    #[must_use]
    pub fn render_secrets(&self) -> String {
        let mut out = String::new();
        for conn in self.admin_up() {
            let _ = writeln!(
                out,
                "{} {} : PSK \"{}\"",
                self.service.local_endpoint_ip, conn.peer_address, conn.psk
            );
        }
        out
    }

    /// Render `ipsec.conf`: the fixed preamble plus one block per admin-up
    /// connection.
    #[must_use]
    pub fn render_conf(&self) -> String {
        let mut out = String::from(
            "config setup\n\
             \x20   nat_traversal=yes\n\
             conn %default\n\
             \x20   ikelifetime=480m\n\
             \x20   keylife=60m\n\
             \x20   keyingtries=%forever\n",
        );
        for conn in self.admin_up() {
            self.render_conn(&mut out, conn);
        }
        out
    }

    fn render_conn(&self, out: &mut String, conn: &IpsecSiteConnection) {
        let auto = match conn.initiator {
            Initiator::BiDirectional => "start",
            Initiator::ResponseOnly => "add",
        };
        let ikev2 = match conn.ike_policy.version {
            IkeVersion::V1 => "never",
            IkeVersion::V2 => "insist",
        };
        let peer_subnets = conn
            .peer_cidrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        let _ = writeln!(out, "conn {}", sanitize_name(&conn.name));
        let _ = writeln!(out, "    leftnexthop=%defaultroute");
        let _ = writeln!(out, "    rightnexthop=%defaultroute");
        let _ = writeln!(out, "    left={}", self.service.local_endpoint_ip);
        let _ = writeln!(out, "    leftid={}", self.service.local_endpoint_ip);
        let _ = writeln!(out, "    auto={auto}");
        let _ = writeln!(out, "    leftsubnets={{ {} }}", conn.local_cidr);
        let _ = writeln!(out, "    leftupdown=\"ipsec _updown --route yes\"");
        let _ = writeln!(out, "    right={}", conn.peer_address);
        let _ = writeln!(out, "    rightid={}", conn.peer_address);
        let _ = writeln!(out, "    rightsubnets={{ {peer_subnets} }}");
        let _ = writeln!(out, "    mtu={}", conn.mtu);
        let _ = writeln!(out, "    dpdaction={}", conn.dpd_action.rendered());
        let _ = writeln!(out, "    dpddelay={}", conn.dpd_interval);
        let _ = writeln!(out, "    dpdtimeout={}", conn.dpd_timeout);
        let _ = writeln!(out, "    authby=secret");
        let _ = writeln!(out, "    ikev2={ikev2}");
        let _ = writeln!(out, "    ike=aes128-sha1;modp1536");
        let _ = writeln!(out, "    ikelifetime={}s", conn.ike_policy.lifetime_s);
        let _ = writeln!(out, "    auth={}", conn.ipsec_policy.transform_protocol.rendered());
        let _ = writeln!(out, "    phase2alg=aes128-sha1;modp1536");
        let _ = writeln!(out, "    type={}", conn.ipsec_policy.encapsulation_mode.rendered());
        let _ = writeln!(out, "    lifetime={}s", conn.ipsec_policy.lifetime_s);
    }
}
