// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing table left-right: lock-free reads from the pipeline while
//! topology updates write.

use left_right::{Absorb, ReadHandleFactory, WriteHandle};
use std::net::Ipv4Addr;

use crate::errors::RouterError;
use crate::rib::{NextHop, Route, RoutingTable};

enum RtableChange {
    Add(Route),
    Del(Route),
}

impl Absorb<RtableChange> for RoutingTable {
    fn absorb_first(&mut self, change: &mut RtableChange, _: &Self) {
        match change {
            // validated before append, see RtableWriter::add
            RtableChange::Add(route) => {
                let _ = self.add(route.clone());
            }
            RtableChange::Del(route) => self.del(route),
        }
    }
    fn drop_first(self: Box<Self>) {}
    fn sync_with(&mut self, first: &Self) {
        *self = first.clone();
    }
}

pub struct RtableWriter {
    w: WriteHandle<RoutingTable, RtableChange>,
    factory: ReadHandleFactory<RoutingTable>,
}

impl RtableWriter {
    #[must_use]
    pub fn new() -> (RtableWriter, RtableReader) {
        let (w, r) = left_right::new_from_empty::<RoutingTable, RtableChange>(RoutingTable::new());
        let factory = r.factory();
        let writer = RtableWriter {
            w,
            factory: factory.clone(),
        };
        (writer, RtableReader(factory))
    }

    #[must_use]
    pub fn as_rtable_reader(&self) -> RtableReader {
        RtableReader(self.factory.clone())
    }

    /// Queue a route addition.
    ///
    /// # Errors
    ///
    /// Rejects `Port` routes that carry no port id.
    pub fn add(&mut self, route: Route, publish: bool) -> Result<(), RouterError> {
        if route.next_hop == NextHop::Port && route.next_hop_port.is_none() {
            return Err(RouterError::RouteWithoutPort);
        }
        self.w.append(RtableChange::Add(route));
        if publish {
            self.w.publish();
        }
        Ok(())
    }

    pub fn del(&mut self, route: Route, publish: bool) {
        self.w.append(RtableChange::Del(route));
        if publish {
            self.w.publish();
        }
    }

    pub fn publish(&mut self) {
        self.w.publish();
    }
}

/// Read access to the last published table state. Cheap to clone and share
/// across tasks; every lookup materializes a fresh read handle.
#[derive(Clone)]
pub struct RtableReader(ReadHandleFactory<RoutingTable>);

impl RtableReader {
    /// Longest-prefix match against the last published table state.
    #[must_use]
    pub fn lookup(&self, dst: Ipv4Addr, src: Ipv4Addr) -> Option<Route> {
        let handle = self.0.handle();
        let guard = handle.enter()?;
        guard.lookup(dst, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortId;

    #[test]
    fn readers_see_published_routes_only() {
        let (mut writer, reader) = RtableWriter::new();
        let port = PortId::random();
        let route = Route::to_port(
            "10.0.0.0/24".parse().unwrap(),
            port,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        writer.add(route.clone(), false).unwrap();
        assert!(reader
            .lookup(Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::UNSPECIFIED)
            .is_none());

        writer.publish();
        let hit = reader
            .lookup(Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::UNSPECIFIED)
            .unwrap();
        assert_eq!(hit.next_hop_port, Some(port));

        writer.del(route, true);
        assert!(reader
            .lookup(Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::UNSPECIFIED)
            .is_none());
    }

    #[test]
    fn readers_clone_across_threads() {
        let (mut writer, reader) = RtableWriter::new();
        writer
            .add(
                Route::to_port(
                    "10.0.0.0/8".parse().unwrap(),
                    PortId::random(),
                    Ipv4Addr::new(10, 0, 0, 1),
                ),
                true,
            )
            .unwrap();
        let other = reader.clone();
        std::thread::spawn(move || {
            assert!(other
                .lookup(Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::UNSPECIFIED)
                .is_some());
        })
        .join()
        .unwrap();
    }
}
