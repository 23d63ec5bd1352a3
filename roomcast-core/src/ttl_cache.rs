//! Keyed TTL cache for released player handles and their snapshots.
//!
//! This module is the data structure only: expiry bookkeeping, read-once
//! removal, and same-handle sweep checks. Liveness probing and destruction
//! happen in the owner scheduler, which funnels both the pull-time purge and
//! the sweep-timer purge through the outcomes returned here so that eviction
//! stays a single idempotent operation.

use std::collections::HashMap;
use tokio::time::Instant;

use roomcast_model::{RoomId, RoomSnapshot};

use crate::handle::{HandleId, PlayerHandle};

/// One cached room: handle, release-time snapshot, absolute expiry.
pub(crate) struct TtlEntry<H> {
    pub handle: PlayerHandle<H>,
    pub snapshot: RoomSnapshot,
    pub expire_at: Instant,
}

/// Result of a pull-time lookup.
pub(crate) enum TakeOutcome<H> {
    /// No entry under the key.
    Miss,
    /// Entry was present but past its expiry; caller must destroy it.
    Expired(TtlEntry<H>),
    /// Live-by-clock entry, removed from the cache (read-once). Caller still
    /// re-probes liveness before trusting it.
    Hit(TtlEntry<H>),
}

/// At most one entry per room key.
pub(crate) struct KeyedTtlCache<H> {
    entries: HashMap<RoomId, TtlEntry<H>>,
}

impl<H> KeyedTtlCache<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert an entry, returning the displaced one (if any) for the caller
    /// to destroy.
    pub fn insert(&mut self, room: RoomId, entry: TtlEntry<H>) -> Option<TtlEntry<H>> {
        self.entries.insert(room, entry)
    }

    /// Remove an entry without expiry checks (used by the dead-handle discard
    /// path and teardown).
    pub fn remove(&mut self, room: &RoomId) -> Option<TtlEntry<H>> {
        self.entries.remove(room)
    }

    /// Pull-time lookup with purge-on-read of expired entries and read-once
    /// removal of hits.
    pub fn take(&mut self, room: &RoomId, now: Instant) -> TakeOutcome<H> {
        match self.entries.remove(room) {
            None => TakeOutcome::Miss,
            Some(entry) if now >= entry.expire_at => TakeOutcome::Expired(entry),
            Some(entry) => TakeOutcome::Hit(entry),
        }
    }

    /// Sweep-timer path: remove the entry only if it still holds the same
    /// handle and its expiry has passed. A sweep firing after the entry was
    /// consumed, replaced, or re-inserted with a fresh TTL is a no-op.
    pub fn take_expired(
        &mut self,
        room: &RoomId,
        handle_id: HandleId,
        now: Instant,
    ) -> Option<TtlEntry<H>> {
        let entry = self.entries.get(room)?;
        if entry.handle.id() != handle_id || now < entry.expire_at {
            return None;
        }
        self.entries.remove(room)
    }

    /// Whether a not-yet-expired entry exists for the key.
    pub fn contains_live(&self, room: &RoomId, now: Instant) -> bool {
        self.entries
            .get(room)
            .is_some_and(|entry| now < entry.expire_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove everything, yielding entries for the caller to destroy.
    pub fn drain(&mut self) -> Vec<TtlEntry<H>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn entry(expire_at: Instant) -> TtlEntry<&'static str> {
        TtlEntry {
            handle: PlayerHandle::new("player"),
            snapshot: RoomSnapshot::empty(),
            expire_at,
        }
    }

    #[test]
    fn take_is_read_once() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("5");
        cache.insert(room.clone(), entry(now + Duration::from_secs(30)));

        assert!(matches!(cache.take(&room, now), TakeOutcome::Hit(_)));
        assert!(matches!(cache.take(&room, now), TakeOutcome::Miss));
    }

    #[test]
    fn take_purges_expired_before_sweep_fires() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("5");
        cache.insert(room.clone(), entry(now + Duration::from_millis(30_000)));

        let late = now + Duration::from_millis(30_001);
        assert!(matches!(cache.take(&room, late), TakeOutcome::Expired(_)));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn hit_at_expiry_boundary() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("5");
        cache.insert(room.clone(), entry(now + Duration::from_millis(30_000)));

        let just_before = now + Duration::from_millis(29_999);
        assert!(matches!(cache.take(&room, just_before), TakeOutcome::Hit(_)));
    }

    #[test]
    fn insert_returns_displaced_entry() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("2");
        let first = entry(now + Duration::from_secs(10));
        let first_id = first.handle.id();

        assert!(cache.insert(room.clone(), first).is_none());
        let displaced = cache
            .insert(room.clone(), entry(now + Duration::from_secs(10)))
            .expect("previous entry displaced");
        assert_eq!(displaced.handle.id(), first_id);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_ignores_replaced_or_consumed_entries() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("3");
        let stale = entry(now);
        let stale_id = stale.handle.id();
        cache.insert(room.clone(), stale);

        // Entry replaced before the sweep fires: sweep keyed to the old
        // handle must not evict the replacement.
        let fresh = entry(now + Duration::from_secs(30));
        let fresh_id = fresh.handle.id();
        cache.insert(room.clone(), fresh);

        assert!(cache.take_expired(&room, stale_id, now).is_none());
        assert!(cache.contains_live(&room, now));

        // Same handle, but TTL extended by a re-put: not yet expired.
        assert!(cache.take_expired(&room, fresh_id, now).is_none());

        // Same handle and past expiry: evicted.
        let late = now + Duration::from_secs(31);
        assert!(cache.take_expired(&room, fresh_id, late).is_some());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn contains_live_respects_expiry() {
        let mut cache = KeyedTtlCache::new();
        let now = Instant::now();
        let room = RoomId::from("7");
        cache.insert(room.clone(), entry(now + Duration::from_secs(1)));

        assert!(cache.contains_live(&room, now));
        assert!(!cache.contains_live(&room, now + Duration::from_secs(1)));
    }
}
