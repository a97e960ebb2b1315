// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-logical-switch event bus.
//!
//! Every participant (the gateway manager, each VTEP peer) connects and
//! obtains a [`BusChannel`]: a publisher tagged with the participant's
//! endpoint id plus a subscription that filters out that participant's own
//! publications. Publications whose logical switch does not match the bus
//! are refused outright.

use crate::types::MacLocation;
use id::Id;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Marker for bus endpoints.
pub struct Endpoint;
pub type EndpointId = Id<Endpoint>;

#[derive(Debug, Clone)]
enum BusMsg {
    Update(EndpointId, MacLocation),
    /// The owning manager terminated; all subscribers disconnect.
    Complete,
}

/// Pub/sub of [`MacLocation`] events for one logical switch.
pub struct VxGatewayBus {
    name: String,
    tx: broadcast::Sender<BusMsg>,
}

impl VxGatewayBus {
    #[must_use]
    pub fn new(name: &str) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            name: name.to_owned(),
            tx,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a participant.
    #[must_use]
    pub fn connect(&self) -> BusChannel {
        BusChannel {
            origin: EndpointId::random(),
            name: self.name.clone(),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            completed: false,
        }
    }

    /// Complete the bus: every subscriber's `recv` returns `None` from the
    /// next call on.
    pub fn complete(&self) {
        let _ = self.tx.send(BusMsg::Complete);
    }
}

/// One participant's endpoint on a [`VxGatewayBus`].
pub struct BusChannel {
    origin: EndpointId,
    name: String,
    tx: broadcast::Sender<BusMsg>,
    rx: broadcast::Receiver<BusMsg>,
    completed: bool,
}

impl BusChannel {
    /// Publish an update. Returns false (and publishes nothing) when the
    /// update names a different logical switch.
    pub fn publish(&self, location: MacLocation) -> bool {
        if location.logical_switch != self.name {
            warn!(
                "refusing publication for switch {} on bus {}",
                location.logical_switch, self.name
            );
            return false;
        }
        debug!("bus {}: {location}", self.name);
        let _ = self.tx.send(BusMsg::Update(self.origin, location));
        true
    }

    /// Receive the next update published by some other participant.
    /// Returns `None` once the bus has completed or dropped.
    pub async fn recv(&mut self) -> Option<MacLocation> {
        if self.completed {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(BusMsg::Update(origin, _)) if origin == self.origin => {}
                Ok(BusMsg::Update(_, location)) => return Some(location),
                Ok(BusMsg::Complete) | Err(broadcast::error::RecvError::Closed) => {
                    self.completed = true;
                    return None;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("bus {}: subscriber lagged by {n}", self.name);
                }
            }
        }
    }
}
