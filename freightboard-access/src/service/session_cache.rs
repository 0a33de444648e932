//! Session Permission Cache.
//!
//! Holds exactly one resolved permission set per session, replaced atomically
//! by each successful resolution. Writers follow last-write-wins with
//! staleness rejection: every resolution attempt takes a sequence number
//! before issuing reads, and a completion is applied only if its sequence
//! number beats the highest applied so far. A slow response arriving after a
//! fresher one completed can therefore never regress the cache.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::ResolvedPermissions;

#[derive(Debug)]
struct CacheSlot {
    applied_seq: u64,
    set: Arc<ResolvedPermissions>,
}

/// Per-session holder of the last resolved set.
#[derive(Debug)]
pub struct SessionPermissionCache {
    next_seq: AtomicU64,
    slot: RwLock<CacheSlot>,
}

impl Default for SessionPermissionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPermissionCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            slot: RwLock::new(CacheSlot {
                applied_seq: 0,
                set: Arc::new(ResolvedPermissions::empty()),
            }),
        }
    }

    /// Take a sequence number for a resolution attempt. Must be called before
    /// the backing reads start, so ordering reflects request start, not
    /// completion.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply a completed resolution unless a fresher one already landed.
    /// Returns whether the set was stored.
    pub fn store_if_fresh(&self, seq: u64, set: ResolvedPermissions) -> bool {
        let mut slot = self.slot.write();
        if seq <= slot.applied_seq {
            tracing::debug!(
                seq,
                applied = slot.applied_seq,
                "discarding stale resolution result"
            );
            return false;
        }
        slot.applied_seq = seq;
        slot.set = Arc::new(set);
        true
    }

    /// Clear to the fail-closed empty set, consuming a fresh sequence number
    /// so that any still-in-flight resolution started earlier is rejected on
    /// arrival. Used by logout teardown.
    pub fn clear(&self) {
        let seq = self.next_sequence();
        let mut slot = self.slot.write();
        // clear() is only called from teardown, which runs once; the fresh
        // sequence number still guards against racing resolutions.
        if seq > slot.applied_seq {
            slot.applied_seq = seq;
            slot.set = Arc::new(ResolvedPermissions::empty());
        }
    }

    /// Snapshot of the current complete set. Readers never observe a partial
    /// replacement.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ResolvedPermissions> {
        self.slot.read().set.clone()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.slot.read().set.contains(key)
    }
}
