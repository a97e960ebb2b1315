// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed packet model for the agent's simulated datapath.
//!
//! Frames are represented structurally (headers plus typed payloads), not as
//! byte buffers; the simulation pipeline only ever manipulates the typed
//! form. Wire-level header types from `etherparse` are wrapped where they
//! exist, and defined here where they do not (ARP).

#![deny(clippy::all)]
#![allow(clippy::similar_names)]

pub mod arp;
pub mod eth;
pub mod icmp4;
pub mod ipv4;
pub mod vxlan;

pub use eth::mac::Mac;
pub use vxlan::Vni;
