//! # Event Dedup Cache
//!
//! Concurrent map from event id to expiry. An event id observed within
//! its TTL is a duplicate: at most one side-effecting apply per id.
//! Entries are evicted lazily on insert and by the periodic purge.

use dashmap::DashMap;

use crate::DEDUP_TTL_SECS;

/// TTL-bounded set of recently seen event ids.
#[derive(Debug)]
pub struct DedupCache {
    seen: DashMap<String, u64>,
    ttl_secs: u64,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_ttl(DEDUP_TTL_SECS)
    }

    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self {
            seen: DashMap::new(),
            ttl_secs,
        }
    }

    /// Record `event_id` at `now`. Returns `false` if the id is already
    /// live, in which case the event must be treated as a duplicate.
    ///
    /// The check-and-insert is atomic per key: two concurrent calls with
    /// the same id serialize on the map shard, and exactly one wins.
    pub fn insert_if_absent(&self, event_id: &str, now: u64) -> bool {
        let mut fresh = false;
        let mut entry = self
            .seen
            .entry(event_id.to_string())
            .or_insert_with(|| {
                fresh = true;
                now + self.ttl_secs
            });
        if !fresh && *entry < now {
            // Expired entry: reuse the slot.
            *entry = now + self.ttl_secs;
            fresh = true;
        }
        fresh
    }

    /// Whether the id is currently considered seen.
    pub fn contains(&self, event_id: &str, now: u64) -> bool {
        self.seen
            .get(event_id)
            .map(|expires| *expires >= now)
            .unwrap_or(false)
    }

    /// Drop all expired entries. Returns the number removed.
    pub fn purge_expired(&self, now: u64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires| *expires >= now);
        before - self.seen.len()
    }

    /// Number of live entries (including not-yet-purged expired ones).
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}
