//! Core data types for order-book snapshots.
//!
//! These types are designed to be:
//! - Deterministic (fixed-point prices, snapshot-embedded timestamps)
//! - Cheap to validate per side
//! - Serializable, so recorded snapshot logs can be replayed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point price scale (9 implied decimals).
pub const PRICE_SCALE: f64 = 1e9;

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a fixed-point price to floating point.
#[inline]
pub fn price_to_f64(price: i64) -> f64 {
    price as f64 / PRICE_SCALE
}

/// Convert a floating point price to fixed-point.
#[inline]
pub fn price_from_f64(price: f64) -> i64 {
    (price * PRICE_SCALE).round() as i64
}

/// Convert seconds to nanoseconds.
#[inline]
pub fn secs_to_ns(secs: f64) -> i64 {
    (secs * NANOS_PER_SECOND as f64).round() as i64
}

/// Convert nanoseconds to seconds.
#[inline]
pub fn ns_to_secs(ns: i64) -> f64 {
    ns as f64 / NANOS_PER_SECOND as f64
}

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side
    Bid,
    /// Sell side
    Ask,
}

impl Side {
    /// Both sides, bids first.
    pub const BOTH: [Side; 2] = [Side::Bid, Side::Ask];

    /// Lowercase name used in identity keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }

    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Check if this is an ask.
    #[inline(always)]
    pub fn is_ask(self) -> bool {
        matches!(self, Side::Ask)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregated price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price in fixed-point format (divide by 1e9 for quote currency)
    pub price: i64,

    /// Aggregated resting size at this price
    pub size: f64,
}

impl PriceLevel {
    /// Create a new level from a fixed-point price.
    pub fn new(price: i64, size: f64) -> Self {
        Self { price, size }
    }

    /// Create a new level from a floating point price.
    pub fn from_f64(price: f64, size: f64) -> Self {
        Self::new(price_from_f64(price), size)
    }

    /// Get price as floating point.
    #[inline]
    pub fn price_as_f64(&self) -> f64 {
        price_to_f64(self.price)
    }

    /// Notional value (price × size) in quote currency.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price_as_f64() * self.size
    }

    /// Whether price and size are both strictly positive (NaN sizes fail).
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.price > 0 && self.size > 0.0
    }
}

/// Full order-book snapshot for one symbol.
///
/// Levels are ordered best-first: bids highest to lowest, asks lowest to
/// highest. The position in the vector is the level's depth index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Trading symbol (e.g. "BTCUSDT")
    pub symbol: String,

    /// Source timestamp (nanoseconds since epoch)
    pub timestamp: i64,

    /// Monotonically increasing sequence number from the feed
    pub sequence: u64,

    /// Bid levels, best first
    pub bids: Vec<PriceLevel>,

    /// Ask levels, best first
    pub asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new(symbol: impl Into<String>, timestamp: i64, sequence: u64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            sequence,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Set the bid levels.
    pub fn with_bids(mut self, bids: Vec<PriceLevel>) -> Self {
        self.bids = bids;
        self
    }

    /// Set the ask levels.
    pub fn with_asks(mut self, asks: Vec<PriceLevel>) -> Self {
        self.asks = asks;
        self
    }

    /// Levels for one side.
    #[inline]
    pub fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Best bid price.
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price.
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price in quote currency, if both sides are quoted.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((price_to_f64(bid) + price_to_f64(ask)) / 2.0),
            _ => None,
        }
    }

    /// Total displayed size on one side.
    pub fn total_size(&self, side: Side) -> f64 {
        self.levels(side).iter().map(|l| l.size).sum()
    }

    /// Check book consistency (whether bid < ask).
    #[inline]
    pub fn check_consistency(&self) -> BookConsistency {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                if bid < ask {
                    BookConsistency::Valid
                } else if bid == ask {
                    BookConsistency::Locked
                } else {
                    BookConsistency::Crossed
                }
            }
            _ => BookConsistency::Empty,
        }
    }
}

/// Book consistency status after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookConsistency {
    /// Book is valid: best_bid < best_ask
    Valid,
    /// Book is empty on one or both sides
    Empty,
    /// Book is locked: best_bid == best_ask
    Locked,
    /// Book is crossed: best_bid > best_ask
    Crossed,
}

impl BookConsistency {
    /// Returns true if the top of book can be trusted.
    #[inline]
    pub fn is_usable(&self) -> bool {
        matches!(self, BookConsistency::Valid | BookConsistency::Empty)
    }
}
