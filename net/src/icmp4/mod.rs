// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! `ICMPv4` message type and construction.

use crate::ipv4::Ipv4Packet;
use etherparse::icmpv4::{DestUnreachableHeader, TimeExceededCode};
use etherparse::{IcmpEchoHeader, Icmpv4Header, Icmpv4Type};

/// Number of bytes of the triggering datagram an ICMP error carries after
/// the embedded IP header (RFC 792).
const ERROR_QUOTE_LEN: usize = 8;

/// An `ICMPv4` message: typed header plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icmp4 {
    pub icmp_type: Icmpv4Type,
    pub payload: Vec<u8>,
}

impl Icmp4 {
    /// Build an echo request.
    #[must_use]
    pub fn echo_request(id: u16, seq: u16, data: &[u8]) -> Self {
        Self {
            icmp_type: Icmpv4Type::EchoRequest(IcmpEchoHeader { id, seq }),
            payload: data.to_vec(),
        }
    }

    /// Build an echo reply.
    #[must_use]
    pub fn echo_reply(id: u16, seq: u16, data: &[u8]) -> Self {
        Self {
            icmp_type: Icmpv4Type::EchoReply(IcmpEchoHeader { id, seq }),
            payload: data.to_vec(),
        }
    }

    /// Build a time-exceeded error quoting the triggering packet.
    #[must_use]
    pub fn time_exceeded(trigger: &Ipv4Packet) -> Self {
        Self {
            icmp_type: Icmpv4Type::TimeExceeded(TimeExceededCode::TtlExceededInTransit),
            payload: error_quote(trigger),
        }
    }

    /// Build a destination-unreachable error quoting the triggering packet.
    #[must_use]
    pub fn destination_unreachable(code: DestUnreachableHeader, trigger: &Ipv4Packet) -> Self {
        Self {
            icmp_type: Icmpv4Type::DestinationUnreachable(code),
            payload: error_quote(trigger),
        }
    }

    /// Network-unreachable error.
    #[must_use]
    pub fn net_unreachable(trigger: &Ipv4Packet) -> Self {
        Self::destination_unreachable(DestUnreachableHeader::Network, trigger)
    }

    /// Host-unreachable error.
    #[must_use]
    pub fn host_unreachable(trigger: &Ipv4Packet) -> Self {
        Self::destination_unreachable(DestUnreachableHeader::Host, trigger)
    }

    /// Communication-administratively-prohibited error.
    #[must_use]
    pub fn admin_prohibited(trigger: &Ipv4Packet) -> Self {
        Self::destination_unreachable(DestUnreachableHeader::FilterProhibited, trigger)
    }

    /// Returns true if this message is an ICMP error (as opposed to a query).
    #[must_use]
    pub fn is_error_message(&self) -> bool {
        matches!(
            self.icmp_type,
            Icmpv4Type::DestinationUnreachable(_)
                | Icmpv4Type::Redirect(_)
                | Icmpv4Type::TimeExceeded(_)
                | Icmpv4Type::ParameterProblem(_)
        )
    }

    /// Returns true if this message is an echo request.
    #[must_use]
    pub fn is_echo_request(&self) -> bool {
        matches!(self.icmp_type, Icmpv4Type::EchoRequest(_))
    }

    /// Get the echo header if this is an echo request or reply.
    #[must_use]
    pub fn echo(&self) -> Option<IcmpEchoHeader> {
        match self.icmp_type {
            Icmpv4Type::EchoRequest(echo) | Icmpv4Type::EchoReply(echo) => Some(echo),
            _ => None,
        }
    }

    /// Serialize header (with checksum) and payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = Icmpv4Header::with_checksum(self.icmp_type.clone(), &self.payload);
        let mut out = Vec::with_capacity(header.header_len() + self.payload.len());
        // writing to a Vec cannot fail
        let _ = header.write(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// IP header plus the first 8 payload bytes of the triggering packet.
fn error_quote(trigger: &Ipv4Packet) -> Vec<u8> {
    let mut quote = trigger.header_bytes();
    let body = trigger.payload_bytes();
    quote.extend_from_slice(&body[..body.len().min(ERROR_QUOTE_LEN)]);
    quote
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv4::{IpPayload, IpProto};
    use std::net::Ipv4Addr;

    fn udp_packet() -> Ipv4Packet {
        Ipv4Packet {
            src: Ipv4Addr::new(10, 0, 0, 2),
            dst: Ipv4Addr::new(10, 0, 1, 2),
            ttl: 1,
            proto: IpProto::UDP,
            frag_offset: 0,
            payload: IpPayload::Unknown(vec![0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4, 5, 6]),
        }
    }

    #[test]
    fn error_quotes_header_and_eight_bytes() {
        let err = Icmp4::time_exceeded(&udp_packet());
        assert!(err.is_error_message());
        assert_eq!(err.payload.len(), 20 + 8);
        assert_eq!(&err.payload[20..24], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn echo_classification() {
        let req = Icmp4::echo_request(7, 1, b"ping");
        assert!(req.is_echo_request());
        assert!(!req.is_error_message());
        let rep = Icmp4::echo_reply(7, 1, b"ping");
        assert!(!rep.is_echo_request());
        assert_eq!(rep.echo().unwrap().id, 7);
    }

    #[test]
    fn to_bytes_includes_payload() {
        let req = Icmp4::echo_request(7, 1, b"ping");
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), 8 + 4);
        assert_eq!(bytes[0], 8); // echo request type
        assert_eq!(&bytes[8..], b"ping");
    }
}
