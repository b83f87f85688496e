//! Change events and event sinks.
//!
//! Every state change of an entity produces one [`ChangeEvent`]. Events are
//! returned from the engine call that caused them and, if a sink is
//! attached, forwarded to it in the same order.
//!
//! [`ChannelSink`] hands events to another thread through a bounded
//! `crossbeam-channel`. A full channel blocks the producing engine, so a
//! slow consumer throttles its symbol instead of growing a queue.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::classifier::Classification;
use super::entity::{EntityId, TrackedEntity};
use super::lifecycle::ResolutionCause;
use super::scanner::WhaleTier;
use crate::types::{price_to_f64, Side};

/// Kind of state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Entity created from an unmatched observation
    New,
    /// Entity matched again in a later snapshot
    Update,
    /// Entity absent from a snapshot in which its side was observed
    Disappear,
    /// Entity rematched from the disappeared memory
    Reappear,
    /// Entity classified and retired
    Resolve,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::New => "NEW",
            EventKind::Update => "UPDATE",
            EventKind::Disappear => "DISAPPEAR",
            EventKind::Reappear => "REAPPEAR",
            EventKind::Resolve => "RESOLVE",
        }
    }
}

/// Resolution details carried by `RESOLVE` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDetails {
    pub cause: ResolutionCause,
    pub classification: Classification,
}

/// One entity state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub entity_id: EntityId,

    /// `{symbol}_{side}_{price}_{first seen ms}`
    pub identity_key: String,

    pub symbol: String,
    pub side: Side,

    /// Most recent price (fixed-point)
    pub price: i64,

    /// Most recent size
    pub size: f64,

    /// Most recent notional
    pub notional: f64,

    pub tier: WhaleTier,

    /// Timestamp of the snapshot (or call) that caused the change
    pub timestamp: i64,

    pub disappearance_count: u32,
    pub mutation_count: u32,

    /// This update changed size by more than the mutation significance
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mutated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionDetails>,
}

impl ChangeEvent {
    /// Build an event from the entity's state after the change.
    pub fn from_entity(kind: EventKind, entity: &TrackedEntity, timestamp: i64) -> Self {
        Self {
            kind,
            entity_id: entity.id,
            identity_key: entity.identity.key(),
            symbol: entity.identity.symbol.clone(),
            side: entity.side(),
            price: entity.current_price,
            size: entity.current_size,
            notional: entity.current_notional(),
            tier: entity.tier,
            timestamp,
            disappearance_count: entity.disappearance_count,
            mutation_count: entity.mutation_count,
            mutated: false,
            resolution: None,
        }
    }

    /// Mark the event as carrying a mutation.
    pub fn with_mutation(mut self, mutated: bool) -> Self {
        self.mutated = mutated;
        self
    }

    /// Attach resolution details.
    pub fn with_resolution(mut self, cause: ResolutionCause, classification: Classification) -> Self {
        self.resolution = Some(ResolutionDetails {
            cause,
            classification,
        });
        self
    }

    /// Price as floating point.
    #[inline]
    pub fn price_as_f64(&self) -> f64 {
        price_to_f64(self.price)
    }

    /// Classification, for `RESOLVE` events.
    pub fn classification(&self) -> Option<&Classification> {
        self.resolution.as_ref().map(|r| &r.classification)
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Receiver of change events.
pub trait EventSink {
    fn emit(&mut self, event: &ChangeEvent);
}

impl EventSink for Vec<ChangeEvent> {
    fn emit(&mut self, event: &ChangeEvent) {
        self.push(event.clone());
    }
}

/// Sink that forwards events into a bounded crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ChangeEvent>,
    dropped: u64,
}

impl ChannelSink {
    /// Wrap an existing sender.
    pub fn new(sender: Sender<ChangeEvent>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Create a sink and its receiver with the given capacity.
    pub fn bounded(capacity: usize) -> (Self, Receiver<ChangeEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    /// Events that could not be delivered because the receiver was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &ChangeEvent) {
        if self.sender.send(event.clone()).is_err() {
            self.dropped += 1;
            if self.dropped == 1 {
                log::warn!("Event receiver disconnected; dropping events for {}", event.symbol);
            }
        }
    }
}
