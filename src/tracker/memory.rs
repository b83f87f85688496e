//! Bounded, time-limited memory of disappeared entities for one side.
//!
//! Entries are kept in disappearance order. Because snapshot time is
//! non-decreasing, the front entry is always the oldest disappearance, so
//! both TTL expiry and capacity eviction pop from the front.

use indexmap::IndexMap;

use super::entity::{EntityId, TrackedEntity};
use super::resolver::Candidate;

/// Recently disappeared entities that may still be rematched.
#[derive(Debug, Clone)]
pub struct DisappearedMemory {
    capacity: usize,
    ttl_ns: i64,
    entries: IndexMap<EntityId, TrackedEntity>,
}

impl DisappearedMemory {
    /// Create a memory holding at most `capacity` entries for `ttl_ns`.
    pub fn new(capacity: usize, ttl_ns: i64) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl_ns,
            entries: IndexMap::new(),
        }
    }

    /// Insert a DISAPPEARED entity.
    ///
    /// Returns the entity evicted to make room, if the memory was full.
    pub fn insert(&mut self, entity: TrackedEntity) -> Option<TrackedEntity> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0).map(|(_, e)| e)
        } else {
            None
        };
        self.entries.insert(entity.id, entity);
        evicted
    }

    /// Remove an entity (rematch or fill).
    pub fn take(&mut self, id: EntityId) -> Option<TrackedEntity> {
        self.entries.shift_remove(&id)
    }

    /// Whether an entity absent since `disappeared_at` has outlived the TTL at `now`.
    ///
    /// Inclusive: an absence of exactly `ttl_ns` is expired.
    #[inline]
    pub fn is_expired(&self, disappeared_at: i64, now: i64) -> bool {
        now.saturating_sub(disappeared_at) >= self.ttl_ns
    }

    /// Remove and return every entry whose TTL has run out at `now`,
    /// oldest first.
    pub fn expire(&mut self, now: i64) -> Vec<TrackedEntity> {
        let mut expired = Vec::new();
        while let Some((_, front)) = self.entries.first() {
            let disappeared_at = front.last_disappeared_at.unwrap_or(front.last_seen);
            if !self.is_expired(disappeared_at, now) {
                break;
            }
            if let Some((_, entity)) = self.entries.shift_remove_index(0) {
                expired.push(entity);
            }
        }
        expired
    }

    /// Remove every entry, oldest first.
    pub fn drain(&mut self) -> Vec<TrackedEntity> {
        self.entries.drain(..).map(|(_, e)| e).collect()
    }

    /// Matching views of every entry.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.entries.values().map(TrackedEntity::candidate).collect()
    }

    pub fn get(&self, id: EntityId) -> Option<&TrackedEntity> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut TrackedEntity> {
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl_ns(&self) -> i64 {
        self.ttl_ns
    }
}
