//! Running statistics over resolved whales.
//!
//! Every resolved entity feeds a [`ResolutionStats`] accumulator: counts per
//! label, pattern and resolution cause, plus online mean/std of dwell times
//! and spoofed notional.
//!
//! # Usage
//!
//! ```
//! use lob_whale_tracker::statistics::RunningStats;
//!
//! let mut dwell = RunningStats::new();
//! for secs in [6.0, 12.0, 9.0] {
//!     dwell.update(secs);
//! }
//! assert!((dwell.mean - 9.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};

use crate::tracker::classifier::{
    Classification, FillEvidenceStatus, SpoofConfidence, SpoofLabel, SpoofPattern,
};
use crate::tracker::lifecycle::ResolutionCause;
use crate::types::ns_to_secs;

// ============================================================================
// Running Statistics (Welford's Algorithm)
// ============================================================================

/// Online algorithm for computing running mean and standard deviation.
///
/// Uses Welford's algorithm for numerical stability with long sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    /// Number of observations
    pub count: u64,
    /// Running mean
    pub mean: f64,
    /// Running M2 (sum of squared differences from mean)
    m2: f64,
    /// Minimum value observed
    pub min: f64,
    /// Maximum value observed
    pub max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Create a new running statistics tracker.
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Update statistics with a new value (Welford's online algorithm).
    #[inline]
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return; // Skip NaN/Inf values
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Get the population variance.
    #[inline]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Get the population standard deviation.
    #[inline]
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Merge another RunningStats into this one (parallel algorithm).
    ///
    /// Used to combine per-symbol statistics computed on separate threads.
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let combined_count = self.count + other.count;
        let delta = other.mean - self.mean;

        let combined_mean = self.mean + delta * (other.count as f64 / combined_count as f64);
        let combined_m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64 / combined_count as f64);

        self.count = combined_count;
        self.mean = combined_mean;
        self.m2 = combined_m2;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Reset statistics to initial state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Check if any values have been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

// ============================================================================
// Resolution Statistics
// ============================================================================

/// Aggregate outcome of every resolved entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    /// Total resolved entities
    pub total: u64,

    /// Per-label counts
    pub ambiguous_short: u64,
    pub confirmed_spoof: u64,
    pub fill_observed: u64,
    pub long_lived: u64,

    /// Per-pattern counts (confirmed spoofs only)
    pub single: u64,
    pub flickering: u64,
    pub size_manipulation: u64,

    /// Per-cause counts
    pub memory_expired: u64,
    pub memory_overflow: u64,
    pub fill_confirmed: u64,
    pub flushed: u64,

    /// Resolutions classified without any fill source
    pub evidence_unavailable: u64,

    /// Entities still on the book when resolved
    pub resting_at_resolution: u64,

    /// Confirmed spoofs scored at high confidence
    pub high_confidence_spoofs: u64,

    /// Dwell time of every resolved entity (seconds)
    pub dwell_secs: RunningStats,

    /// Dwell time of confirmed spoofs (seconds)
    pub spoof_dwell_secs: RunningStats,

    /// Initial notional of confirmed spoofs
    pub spoof_notional: RunningStats,
}

impl ResolutionStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one resolution.
    pub fn record(&mut self, cause: ResolutionCause, classification: &Classification, notional: f64) {
        self.total += 1;

        match classification.label {
            SpoofLabel::AmbiguousShort => self.ambiguous_short += 1,
            SpoofLabel::ConfirmedSpoof => self.confirmed_spoof += 1,
            SpoofLabel::FillObserved => self.fill_observed += 1,
            SpoofLabel::LongLived => self.long_lived += 1,
        }

        match classification.pattern {
            Some(SpoofPattern::Single) => self.single += 1,
            Some(SpoofPattern::Flickering) => self.flickering += 1,
            Some(SpoofPattern::SizeManipulation) => self.size_manipulation += 1,
            None => {}
        }

        match cause {
            ResolutionCause::MemoryExpired => self.memory_expired += 1,
            ResolutionCause::MemoryOverflow => self.memory_overflow += 1,
            ResolutionCause::FillConfirmed => self.fill_confirmed += 1,
            ResolutionCause::Flushed => self.flushed += 1,
        }

        if classification.fill_evidence == FillEvidenceStatus::Unavailable {
            self.evidence_unavailable += 1;
        }
        if classification.resting_at_resolution {
            self.resting_at_resolution += 1;
        }

        let dwell = ns_to_secs(classification.duration_ns);
        self.dwell_secs.update(dwell);
        if classification.label == SpoofLabel::ConfirmedSpoof {
            self.spoof_dwell_secs.update(dwell);
            self.spoof_notional.update(notional);
            if classification.score.confidence == SpoofConfidence::High {
                self.high_confidence_spoofs += 1;
            }
        }
    }

    /// Count for one label.
    pub fn count(&self, label: SpoofLabel) -> u64 {
        match label {
            SpoofLabel::AmbiguousShort => self.ambiguous_short,
            SpoofLabel::ConfirmedSpoof => self.confirmed_spoof,
            SpoofLabel::FillObserved => self.fill_observed,
            SpoofLabel::LongLived => self.long_lived,
        }
    }

    /// Fraction of resolutions labeled as confirmed spoofs.
    pub fn spoof_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.confirmed_spoof as f64 / self.total as f64
        }
    }

    /// Merge statistics from another engine.
    pub fn merge(&mut self, other: &ResolutionStats) {
        self.total += other.total;
        self.ambiguous_short += other.ambiguous_short;
        self.confirmed_spoof += other.confirmed_spoof;
        self.fill_observed += other.fill_observed;
        self.long_lived += other.long_lived;
        self.single += other.single;
        self.flickering += other.flickering;
        self.size_manipulation += other.size_manipulation;
        self.memory_expired += other.memory_expired;
        self.memory_overflow += other.memory_overflow;
        self.fill_confirmed += other.fill_confirmed;
        self.flushed += other.flushed;
        self.evidence_unavailable += other.evidence_unavailable;
        self.resting_at_resolution += other.resting_at_resolution;
        self.high_confidence_spoofs += other.high_confidence_spoofs;
        self.dwell_secs.merge(&other.dwell_secs);
        self.spoof_dwell_secs.merge(&other.spoof_dwell_secs);
        self.spoof_notional.merge(&other.spoof_notional);
    }
}

// ============================================================================
// Tests
// ============================================================================
