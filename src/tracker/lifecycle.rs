//! Entity lifecycle state machine.
//!
//! ```text
//!   NEW ──match──▶ ACTIVE ──match──▶ ACTIVE
//!    │               │  ▲
//!    │ absent absent │  │ rematch
//!    └─────────▶ DISAPPEARED
//!                     │ expire / evict / fill / flush
//!                     ▼
//!                 RESOLVED (terminal)
//! ```
//!
//! NEW and ACTIVE may also resolve directly when a fill consumes the level or
//! the engine is flushed. Every state change goes through
//! [`EntityState::transition`], which rejects anything not drawn above.

use serde::{Deserialize, Serialize};

use super::entity::{SizeSample, TrackedEntity};
use super::scanner::Observation;
use crate::config::DetectionPolicy;
use crate::error::{Result, TrackerError};

// ============================================================================
// States
// ============================================================================

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
    /// First seen in the current snapshot
    New,
    /// Seen again in a later snapshot
    Active,
    /// Absent, held in memory for possible rematch
    Disappeared,
    /// Terminal: classified and no longer matchable
    Resolved,
}

impl EntityState {
    /// Upper-case name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            EntityState::New => "NEW",
            EntityState::Active => "ACTIVE",
            EntityState::Disappeared => "DISAPPEARED",
            EntityState::Resolved => "RESOLVED",
        }
    }

    /// Whether the entity is on the book.
    #[inline]
    pub fn is_present(&self) -> bool {
        matches!(self, EntityState::New | EntityState::Active)
    }

    /// Whether this state can never change again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityState::Resolved)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: EntityState) -> bool {
        use EntityState::*;
        matches!(
            (self, next),
            (New, Active)
                | (New, Disappeared)
                | (New, Resolved)
                | (Active, Active)
                | (Active, Disappeared)
                | (Active, Resolved)
                | (Disappeared, Active)
                | (Disappeared, Resolved)
        )
    }

    /// Validate and return the next state.
    pub fn transition(self, next: EntityState) -> Result<EntityState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TrackerError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            })
        }
    }
}

/// Why an entity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionCause {
    /// Absent from memory for longer than the TTL
    MemoryExpired,
    /// Evicted because the per-side memory was full
    MemoryOverflow,
    /// A fill consumed the level
    FillConfirmed,
    /// Engine was flushed at end of stream
    Flushed,
}

impl ResolutionCause {
    pub fn name(&self) -> &'static str {
        match self {
            ResolutionCause::MemoryExpired => "memory_expired",
            ResolutionCause::MemoryOverflow => "memory_overflow",
            ResolutionCause::FillConfirmed => "fill_confirmed",
            ResolutionCause::Flushed => "flushed",
        }
    }
}

/// What changed when an observation was absorbed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Size moved by more than the mutation significance
    pub mutated: bool,
    /// Price moved by more than the price-move significance
    pub price_moved: bool,
}

// ============================================================================
// Transitions
// ============================================================================

impl TrackedEntity {
    /// NEW/ACTIVE -> ACTIVE: the entity was matched in the next snapshot.
    pub fn apply_continuation(
        &mut self,
        obs: &Observation,
        policy: &DetectionPolicy,
    ) -> Result<UpdateOutcome> {
        self.state = self.state.transition(EntityState::Active)?;
        Ok(self.absorb(obs, policy))
    }

    /// NEW/ACTIVE -> DISAPPEARED at the first snapshot where it is absent.
    pub fn apply_disappearance(&mut self, timestamp: i64) -> Result<()> {
        self.state = self.state.transition(EntityState::Disappeared)?;
        self.accumulated_presence_ns += self.last_seen - self.presence_started_at;
        self.last_disappeared_at = Some(timestamp);
        Ok(())
    }

    /// DISAPPEARED -> ACTIVE: rematched from memory.
    ///
    /// Increments the disappearance count and records the gap between the
    /// last presence and this observation.
    pub fn apply_reappearance(
        &mut self,
        obs: &Observation,
        policy: &DetectionPolicy,
    ) -> Result<UpdateOutcome> {
        self.state = self.state.transition(EntityState::Active)?;
        self.disappearance_count += 1;
        self.gap_durations_ns.push(obs.timestamp - self.last_seen);
        self.last_disappeared_at = None;
        self.presence_started_at = obs.timestamp;
        Ok(self.absorb(obs, policy))
    }

    /// Any non-terminal state -> RESOLVED.
    pub fn apply_resolution(&mut self) -> Result<()> {
        let was_present = self.state.is_present();
        self.state = self.state.transition(EntityState::Resolved)?;
        if was_present {
            self.accumulated_presence_ns += self.last_seen - self.presence_started_at;
        }
        self.resting_at_resolution = was_present;
        Ok(())
    }

    /// Fold one observation into the entity's current values and history.
    fn absorb(&mut self, obs: &Observation, policy: &DetectionPolicy) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        if self.current_size > 0.0 {
            let change = (obs.size - self.current_size).abs() / self.current_size;
            if change > policy.mutation_significance {
                self.mutation_count += 1;
                outcome.mutated = true;
            }
        }
        if self.current_price > 0 {
            let change = (obs.price - self.current_price).abs() as f64 / self.current_price as f64;
            if change > policy.price_move_significance {
                self.price_move_count += 1;
                outcome.price_moved = true;
            }
        }

        let size_changed = self
            .size_history
            .last()
            .map_or(true, |last| last.size != obs.size);
        if size_changed {
            self.size_history.push(SizeSample {
                timestamp: obs.timestamp,
                size: obs.size,
            });
        }

        self.current_price = obs.price;
        self.current_size = obs.size;
        self.last_seen = obs.timestamp;
        self.depth = obs.depth;
        self.book_share = obs.book_share;
        self.tier = obs.tier;
        self.observation_count += 1;

        outcome
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::entity::EntityId;
    use crate::tracker::scanner::WhaleTier;
    use crate::types::{price_from_f64, Side, NANOS_PER_SECOND};

    fn observation(price: f64, size: f64, secs: f64) -> Observation {
        Observation {
            side: Side::Ask,
            price: price_from_f64(price),
            size,
            notional: price * size,
            depth: 0,
            timestamp: (secs * NANOS_PER_SECOND as f64).round() as i64,
            book_share: 1.0,
            tier: WhaleTier::Whale,
        }
    }

    fn entity() -> TrackedEntity {
        TrackedEntity::new(EntityId(1), "BTCUSDT", &observation(100.0, 1_000.0, 0.0), None)
    }

    // ------------------------------------------------------------------------
    // State machine
    // ------------------------------------------------------------------------

    #[test]
    fn test_legal_transitions() {
        use EntityState::*;
        assert_eq!(New.transition(Active), Ok(Active));
        assert_eq!(Active.transition(Active), Ok(Active));
        assert_eq!(Active.transition(Disappeared), Ok(Disappeared));
        assert_eq!(Disappeared.transition(Active), Ok(Active));
        assert_eq!(Disappeared.transition(Resolved), Ok(Resolved));
        assert_eq!(New.transition(Resolved), Ok(Resolved));
    }

    #[test]
    fn test_illegal_transitions() {
        use EntityState::*;
        for next in [New, Active, Disappeared, Resolved] {
            assert!(Resolved.transition(next).is_err());
        }
        assert!(Active.transition(New).is_err());
        assert!(Disappeared.transition(Disappeared).is_err());
        assert_eq!(
            Disappeared.transition(New),
            Err(TrackerError::InvalidTransition {
                from: "DISAPPEARED",
                to: "NEW"
            })
        );
    }

    // ------------------------------------------------------------------------
    // Entity transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_continuation_without_change() {
        let policy = DetectionPolicy::default();
        let mut e = entity();

        let outcome = e.apply_continuation(&observation(100.0, 1_000.0, 0.1), &policy).unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert_eq!(e.state, EntityState::Active);
        assert_eq!(e.size_history.len(), 1);
        assert_eq!(e.observation_count, 2);
        assert_eq!(e.dwell_ns(), NANOS_PER_SECOND / 10);
    }

    #[test]
    fn test_mutation_is_strictly_greater_than_significance() {
        let policy = DetectionPolicy::default();
        let mut e = entity();

        // 4% change: recorded in history, not a mutation
        let outcome = e.apply_continuation(&observation(100.0, 1_040.0, 1.0), &policy).unwrap();
        assert!(!outcome.mutated);
        assert_eq!(e.mutation_count, 0);
        assert_eq!(e.size_history.len(), 2);

        // ~15% change: mutation
        let outcome = e.apply_continuation(&observation(100.0, 1_200.0, 2.0), &policy).unwrap();
        assert!(outcome.mutated);
        assert_eq!(e.mutation_count, 1);
        assert_eq!(e.size_history.len(), 3);
    }

    #[test]
    fn test_price_move_counted() {
        let policy = DetectionPolicy::default();
        let mut e = entity();
        let outcome = e.apply_continuation(&observation(100.2, 1_000.0, 1.0), &policy).unwrap();
        assert!(outcome.price_moved);
        assert_eq!(e.price_move_count, 1);
        assert_eq!(e.current_price, price_from_f64(100.2));
        assert_eq!(e.identity.first_price, price_from_f64(100.0));
    }

    #[test]
    fn test_disappear_and_reappear() {
        let policy = DetectionPolicy::default();
        let mut e = entity();
        e.apply_continuation(&observation(100.0, 1_000.0, 6.0), &policy).unwrap();

        e.apply_disappearance(secs(6.2)).unwrap();
        assert_eq!(e.state, EntityState::Disappeared);
        assert_eq!(e.last_disappeared_at, Some(secs(6.2)));
        assert_eq!(e.presence_ns(), secs(6.0));

        e.apply_reappearance(&observation(100.0, 1_000.0, 6.5), &policy).unwrap();
        assert_eq!(e.state, EntityState::Active);
        assert_eq!(e.disappearance_count, 1);
        assert_eq!(e.gap_durations_ns, vec![secs(0.5)]);
        assert_eq!(e.last_disappeared_at, None);
        assert_eq!(e.dwell_ns(), secs(6.5));
        assert_eq!(e.presence_ns(), secs(6.0));
    }

    #[test]
    fn test_resolution_is_terminal() {
        let policy = DetectionPolicy::default();
        let mut e = entity();
        e.apply_disappearance(secs(1.0)).unwrap();
        e.apply_resolution().unwrap();
        assert_eq!(e.state, EntityState::Resolved);
        assert!(!e.resting_at_resolution);

        assert!(e.apply_resolution().is_err());
        assert!(e.apply_disappearance(secs(2.0)).is_err());
        assert!(e
            .apply_reappearance(&observation(100.0, 1_000.0, 3.0), &policy)
            .is_err());
        assert_eq!(e.disappearance_count, 0);
    }

    #[test]
    fn test_resolution_while_present_is_flagged() {
        let mut e = entity();
        e.apply_resolution().unwrap();
        assert!(e.resting_at_resolution);
        assert_eq!(e.last_disappeared_at, None);
    }

    #[test]
    fn test_continuation_from_disappeared_rejected() {
        let policy = DetectionPolicy::default();
        let mut e = entity();
        e.apply_disappearance(secs(1.0)).unwrap();
        assert!(e.apply_continuation(&observation(100.0, 1_000.0, 2.0), &policy).is_err());
    }

    fn secs(s: f64) -> i64 {
        (s * NANOS_PER_SECOND as f64).round() as i64
    }
}
