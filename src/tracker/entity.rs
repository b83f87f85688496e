//! Tracked whale entities.
//!
//! A [`TrackedEntity`] is the engine's belief that a sequence of whale-sized
//! levels across snapshots is one participant. It carries the immutable
//! [`WhaleIdentity`] assigned at first sight and everything observed since:
//! size history, mutation and price-move counters, gap durations while
//! absent, and the fill flag.
//!
//! State changes go through the lifecycle methods in
//! [`lifecycle`](super::lifecycle); this module only holds data and derived
//! metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::lifecycle::EntityState;
use super::resolver::Candidate;
use super::scanner::{Observation, WhaleTier};
use crate::types::{ns_to_secs, price_to_f64, Side};

// ============================================================================
// Identity
// ============================================================================

/// Engine-local entity identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity assigned when an entity is first seen. Never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhaleIdentity {
    /// Trading symbol
    pub symbol: String,

    /// Book side
    pub side: Side,

    /// Price at first sight (fixed-point)
    pub first_price: i64,

    /// Timestamp at first sight (nanoseconds)
    pub first_seen: i64,
}

impl WhaleIdentity {
    /// Human-readable key: `{symbol}_{side}_{integer price}_{first seen ms}`.
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.symbol,
            self.side,
            price_to_f64(self.first_price) as i64,
            self.first_seen / 1_000_000
        )
    }
}

impl fmt::Display for WhaleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// One entry of an entity's size history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeSample {
    /// Snapshot timestamp (nanoseconds)
    pub timestamp: i64,
    /// Observed size
    pub size: f64,
}

// ============================================================================
// Tracked Entity
// ============================================================================

/// A whale tracked across snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Engine-local identifier
    pub id: EntityId,

    /// Immutable identity
    pub identity: WhaleIdentity,

    /// Lifecycle state
    pub state: EntityState,

    /// Size class at the most recent observation
    pub tier: WhaleTier,

    /// Most recently observed price (fixed-point)
    pub current_price: i64,

    /// Most recently observed size
    pub current_size: f64,

    /// Notional at first sight
    pub initial_notional: f64,

    /// Initial size followed by every observed size that differed from the
    /// previous entry
    pub size_history: Vec<SizeSample>,

    /// Size changes larger than the mutation significance
    pub mutation_count: u32,

    /// Price changes larger than the price-move significance
    pub price_move_count: u32,

    /// Confirmed rematches from the disappeared memory
    pub disappearance_count: u32,

    /// Length of each absence, from last presence to reappearance (nanoseconds)
    pub gap_durations_ns: Vec<i64>,

    /// Last snapshot in which the entity was present
    pub last_seen: i64,

    /// Start of the current (or last) stretch of presence
    pub presence_started_at: i64,

    /// First snapshot in which the entity was absent, while disappeared
    pub last_disappeared_at: Option<i64>,

    /// Total time present across closed stretches (nanoseconds)
    pub accumulated_presence_ns: i64,

    /// Depth index at the most recent observation
    pub depth: usize,

    /// Share of the side's displayed size at the most recent observation
    pub book_share: f64,

    /// Mid price when first seen, if both sides were quoted
    pub mid_price_at_appearance: Option<f64>,

    /// Set once a fill has been attributed to this entity
    pub fill_observed: bool,

    /// Number of snapshots in which the entity was present
    pub observation_count: u64,

    /// Set on resolution if the entity was still on the book at that moment
    pub resting_at_resolution: bool,
}

impl TrackedEntity {
    /// Create a NEW entity from its first observation.
    pub fn new(id: EntityId, symbol: &str, obs: &Observation, mid_price: Option<f64>) -> Self {
        Self {
            id,
            identity: WhaleIdentity {
                symbol: symbol.to_string(),
                side: obs.side,
                first_price: obs.price,
                first_seen: obs.timestamp,
            },
            state: EntityState::New,
            tier: obs.tier,
            current_price: obs.price,
            current_size: obs.size,
            initial_notional: obs.notional,
            size_history: vec![SizeSample {
                timestamp: obs.timestamp,
                size: obs.size,
            }],
            mutation_count: 0,
            price_move_count: 0,
            disappearance_count: 0,
            gap_durations_ns: Vec::new(),
            last_seen: obs.timestamp,
            presence_started_at: obs.timestamp,
            last_disappeared_at: None,
            accumulated_presence_ns: 0,
            depth: obs.depth,
            book_share: obs.book_share,
            mid_price_at_appearance: mid_price,
            fill_observed: false,
            observation_count: 1,
            resting_at_resolution: false,
        }
    }

    /// Book side.
    #[inline]
    pub fn side(&self) -> Side {
        self.identity.side
    }

    /// Timestamp at first sight.
    #[inline]
    pub fn first_seen(&self) -> i64 {
        self.identity.first_seen
    }

    /// Size at first sight.
    #[inline]
    pub fn initial_size(&self) -> f64 {
        self.size_history.first().map(|s| s.size).unwrap_or(self.current_size)
    }

    /// Current notional (price × size).
    #[inline]
    pub fn current_notional(&self) -> f64 {
        price_to_f64(self.current_price) * self.current_size
    }

    /// Dwell time: last observed presence minus first sight (nanoseconds).
    #[inline]
    pub fn dwell_ns(&self) -> i64 {
        self.last_seen - self.identity.first_seen
    }

    /// Time actually present on the book (nanoseconds), gaps excluded.
    pub fn presence_ns(&self) -> i64 {
        if self.state.is_present() {
            self.accumulated_presence_ns + (self.last_seen - self.presence_started_at)
        } else {
            self.accumulated_presence_ns
        }
    }

    /// Largest size in the history.
    pub fn max_size_seen(&self) -> f64 {
        self.size_history
            .iter()
            .map(|s| s.size)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest size in the history.
    pub fn min_size_seen(&self) -> f64 {
        self.size_history
            .iter()
            .map(|s| s.size)
            .fold(f64::INFINITY, f64::min)
    }

    /// (max size − min size) / initial size, over the whole history.
    pub fn size_variance(&self) -> f64 {
        let initial = self.initial_size();
        if self.size_history.is_empty() || initial <= 0.0 {
            return 0.0;
        }
        (self.max_size_seen() - self.min_size_seen()) / initial
    }

    /// Whether the entity is currently on the book.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.state.is_present()
    }

    /// Matching view used by the resolver.
    #[inline]
    pub fn candidate(&self) -> Candidate {
        Candidate {
            id: self.id,
            price: self.current_price,
            size: self.current_size,
            first_seen: self.identity.first_seen,
        }
    }

    /// Inspection summary.
    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            id: self.id,
            key: self.identity.key(),
            symbol: self.identity.symbol.clone(),
            side: self.identity.side,
            state: self.state,
            tier: self.tier,
            initial_price: price_to_f64(self.identity.first_price),
            current_price: price_to_f64(self.current_price),
            initial_size: self.initial_size(),
            current_size: self.current_size,
            initial_notional: self.initial_notional,
            current_notional: self.current_notional(),
            dwell_secs: ns_to_secs(self.dwell_ns()),
            presence_secs: ns_to_secs(self.presence_ns()),
            mutation_count: self.mutation_count,
            price_move_count: self.price_move_count,
            disappearance_count: self.disappearance_count,
            max_size_seen: self.max_size_seen(),
            min_size_seen: self.min_size_seen(),
            size_variance_pct: self.size_variance() * 100.0,
            depth: self.depth,
            book_share: self.book_share,
            fill_observed: self.fill_observed,
            first_seen: self.identity.first_seen,
            last_seen: self.last_seen,
        }
    }
}

/// Flattened, float-priced view of an entity for reports and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub key: String,
    pub symbol: String,
    pub side: Side,
    pub state: EntityState,
    pub tier: WhaleTier,
    pub initial_price: f64,
    pub current_price: f64,
    pub initial_size: f64,
    pub current_size: f64,
    pub initial_notional: f64,
    pub current_notional: f64,
    pub dwell_secs: f64,
    pub presence_secs: f64,
    pub mutation_count: u32,
    pub price_move_count: u32,
    pub disappearance_count: u32,
    pub max_size_seen: f64,
    pub min_size_seen: f64,
    pub size_variance_pct: f64,
    pub depth: usize,
    pub book_share: f64,
    pub fill_observed: bool,
    pub first_seen: i64,
    pub last_seen: i64,
}

// ============================================================================
// Tests
// ============================================================================
