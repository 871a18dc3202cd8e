//! TTL cache for gateway listings.
//!
//! The gateway is polled, not watched; listing queries are cached briefly so
//! read-heavy callers do not hammer the serialized command channel. The
//! cache has one owner (the registry), a TTL policy, and explicit
//! invalidation hooks wired to registry mutations.

use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Slot<T> {
    value: T,
    stored_at: Instant,
}

/// Single-value cache with time-to-live expiry.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<Slot<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Get the cached value if present and fresh.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.read().unwrap();
        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Store a fresh value.
    pub fn put(&self, value: T) {
        *self.slot.write().unwrap() = Some(Slot {
            value,
            stored_at: Instant::now(),
        });
    }

    /// Drop the cached value. Called on every registry mutation.
    pub fn invalidate(&self) {
        *self.slot.write().unwrap() = None;
    }
}
