// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The shared IP-to-MAC cache.
//!
//! The cache is written by every agent that routes for the same virtual
//! router, through an external replicated store. This module defines the
//! entry lifecycle, the store contract and an in-memory implementation used
//! by the standalone agent and the tests.

use ahash::RandomState;
use net::Mac;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// How long to wait for a reply before re-sending an ARP request.
pub const ARP_RETRY: Duration = Duration::from_secs(10);
/// How long an unanswered resolution stays alive.
pub const ARP_TIMEOUT: Duration = Duration::from_secs(60);
/// Age at which a resolved entry should be refreshed.
pub const ARP_STALE: Duration = Duration::from_secs(1800);
/// Age at which a resolved entry becomes unusable.
pub const ARP_EXPIRATION: Duration = Duration::from_secs(3600);

/// One entry of the shared ARP cache.
///
/// `mac == None` marks an in-flight resolution. `stale <= expiry` always
/// holds for entries written by this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpCacheEntry {
    pub mac: Option<Mac>,
    /// Entry is unusable from this instant on.
    pub expiry: Instant,
    /// Entry should be refreshed from this instant on.
    pub stale: Instant,
    /// When the last ARP request for this entry was sent, by any agent.
    pub last_arp: Instant,
}

impl ArpCacheEntry {
    /// A fresh in-flight entry: no MAC yet, alive for [`ARP_TIMEOUT`].
    #[must_use]
    pub fn pending(now: Instant) -> Self {
        Self {
            mac: None,
            expiry: now + ARP_TIMEOUT,
            stale: now,
            last_arp: now,
        }
    }

    /// A resolved entry with full [`ARP_STALE`]/[`ARP_EXPIRATION`] lifetimes.
    #[must_use]
    pub fn resolved(mac: Mac, last_arp: Instant, now: Instant) -> Self {
        Self {
            mac: Some(mac),
            expiry: now + ARP_EXPIRATION,
            stale: now + ARP_STALE,
            last_arp,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry <= now
    }

    #[must_use]
    pub fn is_stale(&self, now: Instant) -> bool {
        self.stale < now
    }
}

/// Change notification delivered to cache watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpCacheUpdate {
    pub ip: Ipv4Addr,
    pub old: Option<Mac>,
    pub new: Option<Mac>,
}

impl ArpCacheUpdate {
    /// True when the binding itself changed, as opposed to a bookkeeping
    /// rewrite of the same binding (e.g. a `last_arp` bump).
    #[must_use]
    pub fn mac_changed(&self) -> bool {
        self.old != self.new
    }
}

/// Contract of the shared ARP cache store.
///
/// `add` and `remove` are externally visible: every watcher, on every
/// agent, observes them.
pub trait ArpCache: Send + Sync {
    fn get(&self, ip: Ipv4Addr) -> Option<ArpCacheEntry>;
    fn add(&self, ip: Ipv4Addr, entry: ArpCacheEntry);
    fn remove(&self, ip: Ipv4Addr);
    fn watch(&self) -> broadcast::Receiver<ArpCacheUpdate>;
}

/// In-memory [`ArpCache`]. Clones of one instance share state, which is
/// what lets tests model several agents on one cache.
pub struct MemArpCache {
    entries: Mutex<HashMap<Ipv4Addr, ArpCacheEntry, RandomState>>,
    updates: broadcast::Sender<ArpCacheUpdate>,
}

impl Default for MemArpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemArpCache {
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(HashMap::with_hasher(RandomState::new())),
            updates,
        }
    }

    fn notify(&self, update: ArpCacheUpdate) {
        // no receivers is fine
        let _ = self.updates.send(update);
    }
}

impl ArpCache for MemArpCache {
    fn get(&self, ip: Ipv4Addr) -> Option<ArpCacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&ip)
            .copied()
    }

    fn add(&self, ip: Ipv4Addr, entry: ArpCacheEntry) {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.insert(ip, entry)
        };
        self.notify(ArpCacheUpdate {
            ip,
            old: old.and_then(|e| e.mac),
            new: entry.mac,
        });
    }

    fn remove(&self, ip: Ipv4Addr) {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.remove(&ip)
        };
        if let Some(old) = old {
            self.notify(ArpCacheUpdate {
                ip,
                old: old.mac,
                new: None,
            });
        }
    }

    fn watch(&self) -> broadcast::Receiver<ArpCacheUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_lifecycle() {
        let now = Instant::now();
        let pending = ArpCacheEntry::pending(now);
        assert!(pending.mac.is_none());
        assert!(!pending.is_expired(now));
        assert!(pending.is_expired(now + ARP_TIMEOUT));

        let mac = Mac([0xbb, 0, 0, 0, 0, 1]);
        let resolved = ArpCacheEntry::resolved(mac, now, now);
        assert!(!resolved.is_stale(now + ARP_STALE));
        assert!(resolved.is_stale(now + ARP_STALE + Duration::from_secs(1)));
        assert!(resolved.stale <= resolved.expiry);
    }

    #[tokio::test(start_paused = true)]
    async fn watchers_see_adds_and_removes() {
        let cache = MemArpCache::new();
        let mut rx = cache.watch();
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        let mac = Mac([0xbb, 0, 0, 0, 0, 5]);
        let now = Instant::now();

        cache.add(ip, ArpCacheEntry::pending(now));
        cache.add(ip, ArpCacheEntry::resolved(mac, now, now));
        cache.remove(ip);

        let first = rx.recv().await.unwrap();
        assert_eq!(first, ArpCacheUpdate { ip, old: None, new: None });
        assert!(!first.mac_changed());
        let second = rx.recv().await.unwrap();
        assert_eq!(second.new, Some(mac));
        assert!(second.mac_changed());
        let third = rx.recv().await.unwrap();
        assert_eq!(third.new, None);
        assert_eq!(third.old, Some(mac));
    }
}
