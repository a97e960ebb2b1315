// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet frame model.

pub mod ethtype;
pub mod mac;

pub use ethtype::EthType;
pub use mac::Mac;

use crate::arp::Arp;
use crate::ipv4::Ipv4Packet;

/// Payload of an [`Ethernet`] frame, discriminated by ethertype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthPayload {
    /// An ARP packet.
    Arp(Arp),
    /// An IPv4 packet.
    Ip(Ipv4Packet),
    /// Anything else, kept opaque with its ethertype.
    Raw(EthType, Vec<u8>),
}

/// A structural Ethernet frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ethernet {
    pub src: Mac,
    pub dst: Mac,
    pub payload: EthPayload,
}

impl Ethernet {
    #[must_use]
    pub fn new(src: Mac, dst: Mac, payload: EthPayload) -> Self {
        Self { src, dst, payload }
    }

    /// The ethertype implied by the payload.
    #[must_use]
    pub fn ethertype(&self) -> EthType {
        match &self.payload {
            EthPayload::Arp(_) => EthType::ARP,
            EthPayload::Ip(_) => EthType::IPV4,
            EthPayload::Raw(ethtype, _) => *ethtype,
        }
    }

    /// Get the ARP payload, if the frame carries one.
    #[must_use]
    pub fn arp(&self) -> Option<&Arp> {
        match &self.payload {
            EthPayload::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    /// Get the IPv4 payload, if the frame carries one.
    #[must_use]
    pub fn ip(&self) -> Option<&Ipv4Packet> {
        match &self.payload {
            EthPayload::Ip(ip) => Some(ip),
            _ => None,
        }
    }
}
