// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Router simulation core: the packet-processing pipeline for a single L3
//! router, its routing table and its asynchronous ARP resolver.

#![deny(clippy::all)]
#![allow(clippy::similar_names)]
#![allow(clippy::collapsible_if)]

pub mod actions;
pub mod arp_cache;
pub mod arp_table;
mod errors;
pub mod ports;
pub mod rib;
mod router;

// re-exports
pub use actions::{Action, FrameEmitter, RecordingEmitter};
pub use arp_cache::{ArpCache, ArpCacheEntry, ArpCacheUpdate, MemArpCache};
pub use arp_table::ArpTable;
pub use errors::RouterError;
pub use ports::{PortId, PortKind, PortResolver, RouterPort, StaticPorts};
pub use rib::rtablerw::{RtableReader, RtableWriter};
pub use rib::{NextHop, Route, RoutingTable};
pub use router::{Router, RouterBuilder};
