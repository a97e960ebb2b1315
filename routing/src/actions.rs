// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Simulation results handed back to the datapath, and the frame-emission
//! seam towards the simulation controller.

use crate::ports::PortId;
use net::eth::Ethernet;

/// Outcome of processing one frame through a router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ethertype the router does not handle.
    NotIpv4,
    /// The frame was dropped, with or without an ICMP error emitted aside.
    Drop,
    /// The frame was consumed by the router itself (ARP, echo).
    Consumed,
    /// Forward the rewritten frame out of `port`.
    ToPort { port: PortId, frame: Ethernet },
}

/// Fire-and-forget frame emission (ARP requests and replies, ICMP errors,
/// locally generated packets). Implemented by the simulation controller.
pub trait FrameEmitter: Send + Sync {
    fn emit(&self, port: PortId, frame: Ethernet);
}

/// A [`FrameEmitter`] that records every emission. Test suites assert on
/// the recorded trace.
#[derive(Default)]
pub struct RecordingEmitter(std::sync::Mutex<Vec<(PortId, Ethernet)>>);

impl RecordingEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything emitted so far.
    #[must_use]
    pub fn take(&self) -> Vec<(PortId, Ethernet)> {
        std::mem::take(
            &mut *self
                .0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl FrameEmitter for RecordingEmitter {
    fn emit(&self, port: PortId, frame: Ethernet) {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((port, frame));
    }
}
