// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Asynchronous IP-to-MAC resolution over the shared [`ArpCache`].
//!
//! Concurrent `get`s for the same address coalesce onto one set of waiters
//! and at most one request loop per table; agents sharing the cache
//! coordinate through the entry's `last_arp` stamp, which acts as a
//! cooperative lease on the right to keep ARPing.

use ahash::RandomState;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::actions::FrameEmitter;
use crate::arp_cache::{ArpCache, ArpCacheEntry, ARP_EXPIRATION, ARP_RETRY};
use crate::errors::RouterError;
use crate::ports::RouterPort;
use net::arp::Arp;
use net::eth::{EthPayload, Ethernet};
use net::Mac;

struct State {
    /// Pending completions, per address. Each waiter is removed when
    /// completed or when its deadline fires.
    waiters: HashMap<Ipv4Addr, Vec<Waiter>, RandomState>,
    /// Addresses with a request loop currently running on this table.
    loops: HashSet<Ipv4Addr, RandomState>,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Option<Mac>>,
}

/// Asynchronous IP-to-MAC resolver for one router.
pub struct ArpTable {
    cache: Arc<dyn ArpCache>,
    emitter: Arc<dyn FrameEmitter>,
    state: Mutex<State>,
    next_waiter: AtomicU64,
}

impl ArpTable {
    /// Create a table over the shared cache. Spawns a task that watches the
    /// cache so resolutions published by other agents complete local
    /// waiters too.
    #[must_use]
    pub fn new(cache: Arc<dyn ArpCache>, emitter: Arc<dyn FrameEmitter>) -> Arc<Self> {
        let table = Arc::new(Self {
            cache: Arc::clone(&cache),
            emitter,
            state: Mutex::new(State {
                waiters: HashMap::with_hasher(RandomState::new()),
                loops: HashSet::with_hasher(RandomState::new()),
            }),
            next_waiter: AtomicU64::new(0),
        });
        let weak = Arc::downgrade(&table);
        let mut updates = cache.watch();
        tokio::spawn(async move {
            loop {
                let update = match updates.recv().await {
                    Ok(update) => update,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(table) = weak.upgrade() else { break };
                if update.mac_changed() {
                    if let Some(mac) = update.new {
                        table.complete_waiters(update.ip, Some(mac));
                    }
                }
            }
        });
        table
    }

    /// Resolve the MAC for `ip` reachable via `port`.
    ///
    /// Returns `Ok(None)` when the address cannot resolve (off-link on an
    /// exterior port, or the resolution expired). Fails with
    /// [`RouterError::Timeout`] when no binding appears before `deadline`.
    pub async fn get(
        self: &Arc<Self>,
        ip: Ipv4Addr,
        port: &RouterPort,
        deadline: Instant,
    ) -> Result<Option<Mac>, RouterError> {
        // Off-link addresses on an exterior port never resolve; a /0
        // network matches everything.
        if port.is_exterior() && !port.is_link_local(ip) {
            return Ok(None);
        }

        let now = Instant::now();
        let entry = self.cache.get(ip);
        if let Some(entry) = entry {
            if let Some(mac) = entry.mac {
                if !entry.is_expired(now) {
                    if entry.is_stale(now) {
                        self.ensure_loop(ip, port.clone());
                    }
                    return Ok(Some(mac));
                }
            }
        }

        // No usable binding: register before touching the cache so a
        // concurrent set cannot slip between the check and the wait.
        let (waiter_id, rx) = self.register_waiter(ip);
        if entry.is_none() {
            self.cache.add(ip, ArpCacheEntry::pending(now));
            self.schedule_expiry(ip, now + ARP_EXPIRATION);
        }
        self.ensure_loop(ip, port.clone());

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(mac)) => Ok(mac),
            Ok(Err(_)) => Err(RouterError::Internal("arp waiter dropped")),
            Err(_) => {
                self.unregister_waiter(ip, waiter_id);
                Err(RouterError::Timeout)
            }
        }
    }

    /// Publish a resolved binding: write a fresh entry and wake every
    /// pending waiter for `ip`.
    pub fn set(&self, ip: Ipv4Addr, mac: Mac) {
        let now = Instant::now();
        let last_arp = self.cache.get(ip).map_or(now, |e| e.last_arp);
        self.cache.add(ip, ArpCacheEntry::resolved(mac, last_arp, now));
        self.complete_waiters(ip, Some(mac));
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn register_waiter(&self, ip: Ipv4Addr) -> (u64, oneshot::Receiver<Option<Mac>>) {
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.lock_state()
            .waiters
            .entry(ip)
            .or_default()
            .push(Waiter { id, tx });
        (id, rx)
    }

    fn unregister_waiter(&self, ip: Ipv4Addr, id: u64) {
        let mut state = self.lock_state();
        if let Some(waiters) = state.waiters.get_mut(&ip) {
            waiters.retain(|w| w.id != id);
            if waiters.is_empty() {
                state.waiters.remove(&ip);
            }
        }
    }

    fn complete_waiters(&self, ip: Ipv4Addr, mac: Option<Mac>) {
        let drained = self.lock_state().waiters.remove(&ip);
        if let Some(waiters) = drained {
            debug!("completing {} arp waiter(s) for {ip} with {mac:?}", waiters.len());
            for waiter in waiters {
                let _ = waiter.tx.send(mac);
            }
        }
    }

    /// Run `arp_for_address` for `ip` unless one is already running here.
    fn ensure_loop(self: &Arc<Self>, ip: Ipv4Addr, port: RouterPort) {
        if !self.lock_state().loops.insert(ip) {
            return;
        }
        let table = Arc::clone(self);
        tokio::spawn(async move {
            table.arp_for_address(ip, &port).await;
            table.lock_state().loops.remove(&ip);
        });
    }

    /// Drop every remaining waiter once the entry has sat unresolved for
    /// the full expiration interval.
    fn schedule_expiry(self: &Arc<Self>, ip: Ipv4Addr, when: Instant) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(when).await;
            let Some(table) = weak.upgrade() else { return };
            if let Some(entry) = table.cache.get(ip) {
                if entry.is_expired(Instant::now()) {
                    table.cache.remove(ip);
                    table.complete_waiters(ip, None);
                }
            }
        });
    }

    /// The two-phase request loop. The top half refetches the entry; the
    /// bottom half sends a request, stamps `last_arp` and waits out the
    /// retry interval.
    async fn arp_for_address(&self, ip: Ipv4Addr, port: &RouterPort) {
        let mut previous: Option<Instant> = None;
        let mut updates = self.cache.watch();
        loop {
            let now = Instant::now();
            let Some(entry) = self.cache.get(ip) else {
                self.complete_waiters(ip, None);
                return;
            };
            if entry.is_expired(now) {
                self.complete_waiters(ip, None);
                return;
            }
            if let Some(previous) = previous {
                // Another agent advanced the lease; back off unless its
                // stamp is itself ancient.
                if entry.last_arp != previous
                    && now.saturating_duration_since(entry.last_arp) < 2 * ARP_RETRY
                {
                    debug!("arp loop for {ip}: another agent took over");
                    return;
                }
            }
            if entry.mac.is_some() && entry.stale > now {
                // Up to date; waiters were completed through set.
                return;
            }

            let mut stamped = entry;
            stamped.last_arp = now;
            self.cache.add(ip, stamped);
            self.emitter.emit(
                port.id,
                make_arp_request(port.mac, port.ip, ip),
            );
            previous = Some(now);

            // Wait out the retry interval, cut short by any change to this
            // entry's binding.
            let _ = tokio::time::timeout(ARP_RETRY, async {
                loop {
                    match updates.recv().await {
                        Ok(update) if update.ip == ip && update.mac_changed() => break,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("arp watch lagged by {n}, resyncing");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
            .await;
        }
    }
}

/// Build a broadcast ARP request frame sourced from the port's addresses.
#[must_use]
pub fn make_arp_request(port_mac: Mac, port_ip: Ipv4Addr, target: Ipv4Addr) -> Ethernet {
    Ethernet::new(
        port_mac,
        Mac::BROADCAST,
        EthPayload::Arp(Arp::request(port_mac, port_ip, target)),
    )
}
