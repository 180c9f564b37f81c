//! Resolve entries and the TTL-ordered queue
//!
//! One [`ResolveEntry`] exists per configured route for the lifetime of a
//! reconciliation session. Entries cache the routes produced by their last
//! resolution and carry the instant that resolution expires; the queue is a
//! binary min-heap on that instant.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::route::IpRoute;

/// Expiries are rounded up to this quantum so that near-simultaneous TTLs
/// coalesce into a single wake-up.
const EXPIRE_PRECISION: Duration = Duration::from_secs(20);

/// Per-configured-route resolution state
#[derive(Debug)]
pub(crate) struct ResolveEntry {
    /// Name of the interface the route belongs to
    pub interface: String,
    /// The configured target
    pub target: String,
    /// The configured resolver name; empty means `addr`
    pub resolver: String,
    /// The effective gateway
    pub gateway: String,
    /// The effective filter list
    pub filters: Vec<String>,
    /// The effective `auto` flag
    pub auto: bool,
    /// Routes produced by the last successful resolution
    pub routes: Vec<IpRoute>,
    /// When the last resolution expires; the epoch initially, so every entry
    /// is due on the first scheduling pass
    pub expire_at: SystemTime,
}

impl ResolveEntry {
    /// Materialise one entry per configured route
    pub fn entries_for(config: &Config) -> Vec<ResolveEntry> {
        let mut entries = Vec::new();
        for interface in &config.interfaces {
            for route in &interface.routes {
                entries.push(ResolveEntry {
                    interface: interface.name.clone(),
                    target: route.target.clone(),
                    resolver: route.resolver.clone(),
                    gateway: route.gateway(&interface.defaults),
                    filters: route.filters(&interface.defaults),
                    auto: route.auto(&interface.defaults),
                    routes: Vec::new(),
                    expire_at: UNIX_EPOCH,
                });
            }
        }
        entries
    }

    /// Reports whether the cached resolution has expired at `now`
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now > self.expire_at
    }

    /// Store a fresh resolution and bucket its expiry
    pub fn apply_resolved(&mut self, routes: Vec<IpRoute>, expire_at: SystemTime) {
        self.routes = routes;
        self.expire_at = bucket_expiry(expire_at);
    }
}

/// Round an instant up to the next [`EXPIRE_PRECISION`] boundary
fn bucket_expiry(at: SystemTime) -> SystemTime {
    let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    let quantum = EXPIRE_PRECISION.as_secs();
    let bucketed = since_epoch.as_secs() / quantum * quantum + quantum;
    UNIX_EPOCH + Duration::from_secs(bucketed)
}

/// Min-heap of resolve entries keyed on `expire_at`
///
/// At any quiescent moment every configured route has exactly one entry here.
#[derive(Debug, Default)]
pub(crate) struct ResolveQueue(BinaryHeap<QueueSlot>);

impl ResolveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ResolveEntry) {
        self.0.push(QueueSlot(entry));
    }

    pub fn pop(&mut self) -> Option<ResolveEntry> {
        self.0.pop().map(|slot| slot.0)
    }

    pub fn peek(&self) -> Option<&ResolveEntry> {
        self.0.peek().map(|slot| &slot.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pop every entry whose resolution has expired at `now`
    pub fn pop_expired(&mut self, now: SystemTime) -> Vec<ResolveEntry> {
        let mut due = Vec::new();
        loop {
            match self.0.peek() {
                Some(slot) if slot.0.is_expired(now) => {}
                _ => break,
            }
            if let Some(slot) = self.0.pop() {
                due.push(slot.0);
            }
        }
        due
    }

    /// Iterate over all queued entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &ResolveEntry> {
        self.0.iter().map(|slot| &slot.0)
    }
}

/// Heap adapter reversing the ordering so the earliest expiry is the root
#[derive(Debug)]
struct QueueSlot(ResolveEntry);

impl Ord for QueueSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.expire_at.cmp(&self.0.expire_at)
    }
}

impl PartialOrd for QueueSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueSlot {
    fn eq(&self, other: &Self) -> bool {
        self.0.expire_at == other.0.expire_at
    }
}

impl Eq for QueueSlot {}
