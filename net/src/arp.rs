// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ARP packet type (Ethernet/IPv4 only).

use crate::eth::mac::Mac;
use std::net::Ipv4Addr;

/// Hardware type for Ethernet.
pub const HW_TYPE_ETHERNET: u16 = 1;
/// Protocol type for IPv4.
pub const PROTO_TYPE_IPV4: u16 = 0x0800;

/// ARP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    /// Any opcode other than request/reply, kept for completeness.
    Other(u16),
}

impl ArpOp {
    #[must_use]
    pub fn raw(self) -> u16 {
        match self {
            ArpOp::Request => 1,
            ArpOp::Reply => 2,
            ArpOp::Other(code) => code,
        }
    }
}

/// An ARP packet over Ethernet/IPv4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arp {
    pub hw_type: u16,
    pub proto_type: u16,
    pub op: ArpOp,
    /// Sender hardware address.
    pub sha: Mac,
    /// Sender protocol address.
    pub spa: Ipv4Addr,
    /// Target hardware address.
    pub tha: Mac,
    /// Target protocol address.
    pub tpa: Ipv4Addr,
}

impl Arp {
    /// Build an ARP request asking who has `tpa`.
    #[must_use]
    pub fn request(sha: Mac, spa: Ipv4Addr, tpa: Ipv4Addr) -> Self {
        Self {
            hw_type: HW_TYPE_ETHERNET,
            proto_type: PROTO_TYPE_IPV4,
            op: ArpOp::Request,
            sha,
            spa,
            tha: Mac::ZERO,
            tpa,
        }
    }

    /// Build an ARP reply telling `tha`/`tpa` that `spa` is at `sha`.
    #[must_use]
    pub fn reply(sha: Mac, spa: Ipv4Addr, tha: Mac, tpa: Ipv4Addr) -> Self {
        Self {
            hw_type: HW_TYPE_ETHERNET,
            proto_type: PROTO_TYPE_IPV4,
            op: ArpOp::Reply,
            sha,
            spa,
            tha,
            tpa,
        }
    }

    /// True iff the hardware and protocol types are Ethernet/IPv4.
    #[must_use]
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hw_type == HW_TYPE_ETHERNET && self.proto_type == PROTO_TYPE_IPV4
    }
}
