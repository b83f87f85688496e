//! Level scanner: validates one snapshot and extracts whale observations.
//!
//! A side is scanned as a unit. If any of its levels is malformed the whole
//! side is [`SideScan::Rejected`] and produces no observations; the engine
//! then treats that side as "not observed" for this snapshot. A crossed or
//! locked top of book rejects both sides.

use serde::{Deserialize, Serialize};

use crate::config::SymbolConfig;
use crate::error::TrackerError;
use crate::types::{BookConsistency, PriceLevel, Side, Snapshot};

/// Size class of a whale level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleTier {
    /// Notional at or above the whale threshold
    Whale,
    /// Notional at or above the mega-whale threshold
    MegaWhale,
}

/// A whale-sized level seen in one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Book side
    pub side: Side,

    /// Price in fixed-point format
    pub price: i64,

    /// Aggregated size at the level
    pub size: f64,

    /// price × size in quote currency
    pub notional: f64,

    /// Depth index (0 = best)
    pub depth: usize,

    /// Snapshot timestamp (nanoseconds)
    pub timestamp: i64,

    /// Level size as a fraction of the side's total displayed size
    pub book_share: f64,

    /// Size class
    pub tier: WhaleTier,
}

/// Scan verdict for one side.
#[derive(Debug, Clone, PartialEq)]
pub enum SideScan {
    /// Side is well formed. May be empty if no level reaches the threshold.
    Accepted(Vec<Observation>),

    /// Side is malformed and must not touch entity state.
    Rejected(TrackerError),
}

impl SideScan {
    /// Whether the side was accepted.
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, SideScan::Accepted(_))
    }

    /// Observations if accepted.
    pub fn observations(&self) -> Option<&[Observation]> {
        match self {
            SideScan::Accepted(obs) => Some(obs),
            SideScan::Rejected(_) => None,
        }
    }
}

/// Scan verdicts for both sides of one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub bids: SideScan,
    pub asks: SideScan,
}

impl ScanResult {
    /// Verdict for one side.
    pub fn side(&self, side: Side) -> &SideScan {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Split into (bids, asks).
    pub fn into_sides(self) -> (SideScan, SideScan) {
        (self.bids, self.asks)
    }
}

/// Extracts whale observations from snapshots of one symbol.
#[derive(Debug, Clone)]
pub struct LevelScanner {
    whale_threshold: f64,
    mega_threshold: Option<f64>,
}

impl LevelScanner {
    /// Create a scanner from a symbol's thresholds.
    pub fn new(config: &SymbolConfig) -> Self {
        Self {
            whale_threshold: config.whale_notional_threshold,
            mega_threshold: config.mega_whale_notional_threshold,
        }
    }

    /// Whale notional threshold.
    #[inline]
    pub fn whale_threshold(&self) -> f64 {
        self.whale_threshold
    }

    /// Scan both sides of a snapshot.
    pub fn scan(&self, snapshot: &Snapshot) -> ScanResult {
        let bid_check = validate_side(Side::Bid, &snapshot.bids);
        let ask_check = validate_side(Side::Ask, &snapshot.asks);

        // The crossed check only means something when both tops are trustworthy.
        if bid_check.is_ok() && ask_check.is_ok() {
            if let BookConsistency::Crossed | BookConsistency::Locked = snapshot.check_consistency() {
                let err = TrackerError::CrossedBook(
                    snapshot.best_bid().unwrap_or_default(),
                    snapshot.best_ask().unwrap_or_default(),
                );
                return ScanResult {
                    bids: SideScan::Rejected(err.clone()),
                    asks: SideScan::Rejected(err),
                };
            }
        }

        ScanResult {
            bids: match bid_check {
                Ok(()) => SideScan::Accepted(self.extract(snapshot, Side::Bid)),
                Err(e) => SideScan::Rejected(e),
            },
            asks: match ask_check {
                Ok(()) => SideScan::Accepted(self.extract(snapshot, Side::Ask)),
                Err(e) => SideScan::Rejected(e),
            },
        }
    }

    /// Extract whale levels from an already validated side.
    fn extract(&self, snapshot: &Snapshot, side: Side) -> Vec<Observation> {
        let levels = snapshot.levels(side);
        let total = snapshot.total_size(side);

        levels
            .iter()
            .enumerate()
            .filter_map(|(depth, level)| {
                let notional = level.notional();
                if notional < self.whale_threshold {
                    return None;
                }
                Some(Observation {
                    side,
                    price: level.price,
                    size: level.size,
                    notional,
                    depth,
                    timestamp: snapshot.timestamp,
                    book_share: if total > 0.0 { level.size / total } else { 0.0 },
                    tier: self.tier_for(notional),
                })
            })
            .collect()
    }

    #[inline]
    fn tier_for(&self, notional: f64) -> WhaleTier {
        match self.mega_threshold {
            Some(mega) if notional >= mega => WhaleTier::MegaWhale,
            _ => WhaleTier::Whale,
        }
    }
}

/// Check every level of one side: positive price and size, strictly
/// improving best-first order.
fn validate_side(side: Side, levels: &[PriceLevel]) -> Result<(), TrackerError> {
    let mut previous: Option<i64> = None;

    for (depth, level) in levels.iter().enumerate() {
        if level.price <= 0 {
            return Err(TrackerError::InvalidPrice {
                side,
                depth,
                price: level.price,
            });
        }
        if !(level.size > 0.0 && level.size.is_finite()) {
            return Err(TrackerError::InvalidSize {
                side,
                depth,
                size: level.size,
            });
        }
        if let Some(prev) = previous {
            let ordered = match side {
                Side::Bid => level.price < prev,
                Side::Ask => level.price > prev,
            };
            if !ordered {
                return Err(TrackerError::UnorderedLevel {
                    side,
                    depth,
                    price: level.price,
                });
            }
        }
        previous = Some(level.price);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> LevelScanner {
        LevelScanner::new(&SymbolConfig::new(50_000.0).with_mega_threshold(500_000.0))
    }

    fn snapshot(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Snapshot {
        Snapshot::new("BTCUSDT", 1_000, 1).with_bids(bids).with_asks(asks)
    }

    #[test]
    fn test_scan_extracts_whales_only() {
        let snap = snapshot(
            vec![
                PriceLevel::from_f64(100.0, 10.0),
                PriceLevel::from_f64(99.9, 1_000.0),
                PriceLevel::from_f64(99.8, 6_000.0),
            ],
            vec![PriceLevel::from_f64(100.1, 5.0)],
        );

        let result = scanner().scan(&snap);
        let bids = result.bids.observations().unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].depth, 1);
        assert_eq!(bids[0].tier, WhaleTier::Whale);
        assert_eq!(bids[1].depth, 2);
        assert_eq!(bids[1].tier, WhaleTier::MegaWhale);
        assert_eq!(bids[1].timestamp, 1_000);
        assert!((bids[1].book_share - 6_000.0 / 7_010.0).abs() < 1e-12);

        assert_eq!(result.asks.observations().unwrap().len(), 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let snap = snapshot(vec![PriceLevel::from_f64(100.0, 500.0)], vec![]);
        let result = scanner().scan(&snap);
        assert_eq!(result.bids.observations().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_level_rejects_only_that_side() {
        let snap = snapshot(
            vec![PriceLevel::from_f64(100.0, 1_000.0), PriceLevel::from_f64(99.0, 0.0)],
            vec![PriceLevel::from_f64(101.0, 1_000.0)],
        );

        let result = scanner().scan(&snap);
        assert!(matches!(
            result.bids,
            SideScan::Rejected(TrackerError::InvalidSize { depth: 1, .. })
        ));
        assert!(result.asks.is_accepted());
        assert_eq!(result.asks.observations().unwrap().len(), 1);
    }

    #[test]
    fn test_negative_price_rejected() {
        let snap = snapshot(vec![], vec![PriceLevel::new(-1, 1_000.0)]);
        let result = scanner().scan(&snap);
        assert!(result.bids.is_accepted());
        assert!(matches!(
            result.asks,
            SideScan::Rejected(TrackerError::InvalidPrice { side: Side::Ask, .. })
        ));
    }

    #[test]
    fn test_unordered_levels_rejected() {
        let snap = snapshot(
            vec![PriceLevel::from_f64(99.0, 1_000.0), PriceLevel::from_f64(99.0, 1_000.0)],
            vec![],
        );
        let result = scanner().scan(&snap);
        assert!(matches!(
            result.side(Side::Bid),
            SideScan::Rejected(TrackerError::UnorderedLevel { depth: 1, .. })
        ));
    }

    #[test]
    fn test_crossed_book_rejects_both_sides() {
        let snap = snapshot(
            vec![PriceLevel::from_f64(101.0, 1_000.0)],
            vec![PriceLevel::from_f64(100.0, 1_000.0)],
        );
        let result = scanner().scan(&snap);
        assert!(matches!(result.bids, SideScan::Rejected(TrackerError::CrossedBook(..))));
        assert!(matches!(result.asks, SideScan::Rejected(TrackerError::CrossedBook(..))));
    }

    #[test]
    fn test_locked_book_rejects_both_sides() {
        let snap = snapshot(
            vec![PriceLevel::from_f64(100.0, 1_000.0)],
            vec![PriceLevel::from_f64(100.0, 1_000.0)],
        );
        let result = scanner().scan(&snap);
        assert!(!result.bids.is_accepted());
        assert!(!result.asks.is_accepted());
    }

    #[test]
    fn test_empty_snapshot_is_accepted() {
        let result = scanner().scan(&snapshot(vec![], vec![]));
        assert_eq!(result.bids, SideScan::Accepted(vec![]));
        assert_eq!(result.asks, SideScan::Accepted(vec![]));
    }
}
