// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 packet model.

use crate::icmp4::Icmp4;
use etherparse::{IpNumber, Ipv4Header};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// The IP protocol number field.
///
/// Transparent wrapper around the type provided by etherparse.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpProto(pub(crate) IpNumber);

impl IpProto {
    pub const ICMP: IpProto = IpProto(IpNumber::ICMP);
    pub const TCP: IpProto = IpProto(IpNumber::TCP);
    pub const UDP: IpProto = IpProto(IpNumber::UDP);

    /// Map a raw protocol number into an [`IpProto`]
    #[must_use]
    pub const fn new(raw: u8) -> IpProto {
        IpProto(IpNumber(raw))
    }

    /// get the raw `u8` value
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0 .0
    }
}

impl Display for IpProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Payload of an [`Ipv4Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPayload {
    /// An ICMPv4 message.
    Icmp(Icmp4),
    /// Anything else, kept opaque.
    Unknown(Vec<u8>),
}

/// A structural IPv4 packet.
///
/// Only the fields the routing pipeline inspects are modeled; everything
/// else assumes its wire default when the packet is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub proto: IpProto,
    /// Fragment offset in 8-byte units; non-zero marks a non-first fragment.
    pub frag_offset: u16,
    pub payload: IpPayload,
}

impl Ipv4Packet {
    /// Build an ICMP-bearing packet with a default TTL.
    #[must_use]
    pub fn icmp(src: Ipv4Addr, dst: Ipv4Addr, icmp: Icmp4) -> Self {
        Self {
            src,
            dst,
            ttl: 64,
            proto: IpProto::ICMP,
            frag_offset: 0,
            payload: IpPayload::Icmp(icmp),
        }
    }

    /// Get the ICMP payload, if the packet carries one.
    #[must_use]
    pub fn icmp_payload(&self) -> Option<&Icmp4> {
        match &self.payload {
            IpPayload::Icmp(icmp) => Some(icmp),
            _ => None,
        }
    }

    /// Serialized payload bytes, used when embedding this packet into an
    /// ICMP error message.
    #[must_use]
    pub fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            IpPayload::Icmp(icmp) => icmp.to_bytes(),
            IpPayload::Unknown(bytes) => bytes.clone(),
        }
    }

    /// Render the 20-byte wire header (no options) for this packet.
    #[must_use]
    pub fn header_bytes(&self) -> Vec<u8> {
        let payload_len = u16::try_from(self.payload_bytes().len()).unwrap_or(u16::MAX);
        let mut header = Ipv4Header::new(
            payload_len,
            self.ttl,
            self.proto.0,
            self.src.octets(),
            self.dst.octets(),
        )
        .unwrap_or_else(|_| Ipv4Header {
            time_to_live: self.ttl,
            protocol: self.proto.0,
            source: self.src.octets(),
            destination: self.dst.octets(),
            ..Default::default()
        });
        header.header_checksum = header.calc_header_checksum();
        header.to_bytes().to_vec()
    }
}
