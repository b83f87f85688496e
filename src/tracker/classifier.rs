//! Spoof classification of resolved entities.
//!
//! [`classify`] is a pure function of a resolved entity, the detection policy
//! and the fill-evidence status. Dwell time is measured from first sight to
//! the last snapshot in which the entity was present.
//!
//! | dwell                 | fill evidence | on book at resolution | label             |
//! |-----------------------|---------------|-----------------------|-------------------|
//! | `< min window`        | any           | any                   | `AMBIGUOUS_SHORT` |
//! | `> max window`        | any           | any                   | `LONG_LIVED`      |
//! | within window         | observed      | any                   | `FILL_OBSERVED`   |
//! | within window         | otherwise     | yes                   | `AMBIGUOUS_SHORT` |
//! | within window         | otherwise     | no                    | `CONFIRMED_SPOOF` |
//!
//! An entity still resting when the stream was flushed never disappeared, so
//! its fate is unknown; it is withheld from `CONFIRMED_SPOOF` and flagged
//! with [`Classification::resting_at_resolution`].
//!
//! Confirmed spoofs get a pattern: size manipulation when the size variance
//! exceeds the cutoff, flickering when the entity disappeared and came back
//! at least `flicker_min_disappearances` times, single otherwise.
//!
//! Every classification also carries a [`SpoofScore`]: points for dwell,
//! size, distance from mid and flicker behavior, banded into a
//! [`SpoofConfidence`]. The score ranks candidates; it does not change the
//! label.
//!
//! The label is a heuristic. An order that was never filled while visible
//! is consistent with spoofing but does not establish intent; every
//! [`Classification`] carries [`HEURISTIC_CAVEAT`] so downstream consumers
//! cannot lose that context.

use serde::{Deserialize, Serialize};

use super::entity::TrackedEntity;
use crate::config::DetectionPolicy;
use crate::types::{ns_to_secs, price_to_f64, Side, NANOS_PER_SECOND};

/// Attached to every classification.
pub const HEURISTIC_CAVEAT: &str = "heuristic label: absence of an observed fill while the order \
was visible is consistent with spoofing but is not proof of manipulative intent";

/// Outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpoofLabel {
    /// Too short-lived to call, or still resting when tracking stopped
    AmbiguousShort,
    /// Disappeared within the spoof window with no fill observed
    ConfirmedSpoof,
    /// Within the spoof window but a fill was attributed to it
    FillObserved,
    /// Rested longer than the spoof window
    LongLived,
}

impl SpoofLabel {
    pub fn name(&self) -> &'static str {
        match self {
            SpoofLabel::AmbiguousShort => "AMBIGUOUS_SHORT",
            SpoofLabel::ConfirmedSpoof => "CONFIRMED_SPOOF",
            SpoofLabel::FillObserved => "FILL_OBSERVED",
            SpoofLabel::LongLived => "LONG_LIVED",
        }
    }
}

/// Behavioral sub-type of a confirmed spoof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpoofPattern {
    Single,
    Flickering,
    SizeManipulation,
}

impl SpoofPattern {
    pub fn name(&self) -> &'static str {
        match self {
            SpoofPattern::Single => "SINGLE",
            SpoofPattern::Flickering => "FLICKERING",
            SpoofPattern::SizeManipulation => "SIZE_MANIPULATION",
        }
    }
}

/// What the engine knows about fills against an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillEvidenceStatus {
    /// A fill was attributed to the entity
    Observed,
    /// A fill source was available and reported none
    NotObserved,
    /// No fill source could answer
    Unavailable,
}

/// Classification of one resolved entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SpoofLabel,

    /// Present only for `CONFIRMED_SPOOF`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<SpoofPattern>,

    /// last_seen − first_seen (nanoseconds)
    pub duration_ns: i64,

    /// (max size − min size) / initial size
    pub size_variance: f64,

    pub disappearance_count: u32,

    pub fill_evidence: FillEvidenceStatus,

    /// The entity was still on the book when it was resolved
    #[serde(default)]
    pub resting_at_resolution: bool,

    /// |first price − mid| / mid at first sight, if a mid was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_mid: Option<f64>,

    #[serde(default)]
    pub score: SpoofScore,

    pub caveat: String,
}

impl Classification {
    /// Dwell time in seconds.
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        ns_to_secs(self.duration_ns)
    }

    /// Whether this is a confirmed spoof.
    #[inline]
    pub fn is_spoof(&self) -> bool {
        self.label == SpoofLabel::ConfirmedSpoof
    }
}

/// Classify a resolved entity.
pub fn classify(
    entity: &TrackedEntity,
    policy: &DetectionPolicy,
    fill_evidence: FillEvidenceStatus,
) -> Classification {
    let duration_ns = entity.dwell_ns();
    let size_variance = entity.size_variance();
    let resting = entity.resting_at_resolution;

    let label = if duration_ns < policy.min_spoof_window_ns {
        SpoofLabel::AmbiguousShort
    } else if duration_ns > policy.max_spoof_window_ns {
        SpoofLabel::LongLived
    } else if fill_evidence == FillEvidenceStatus::Observed {
        SpoofLabel::FillObserved
    } else if resting {
        SpoofLabel::AmbiguousShort
    } else {
        SpoofLabel::ConfirmedSpoof
    };

    let pattern = (label == SpoofLabel::ConfirmedSpoof).then(|| {
        if size_variance > policy.size_variance_cutoff {
            SpoofPattern::SizeManipulation
        } else if entity.disappearance_count >= policy.flicker_min_disappearances {
            SpoofPattern::Flickering
        } else {
            SpoofPattern::Single
        }
    });

    let distance_from_mid = entity.mid_price_at_appearance.and_then(|mid| {
        (mid.is_finite() && mid > 0.0)
            .then(|| (price_to_f64(entity.identity.first_price) - mid).abs() / mid)
    });

    let score = score(entity, policy, fill_evidence, size_variance, distance_from_mid);

    Classification {
        label,
        pattern,
        duration_ns,
        size_variance,
        disappearance_count: entity.disappearance_count,
        fill_evidence,
        resting_at_resolution: resting,
        distance_from_mid,
        score,
        caveat: HEURISTIC_CAVEAT.to_string(),
    }
}

// ============================================================================
// Confidence Scoring
// ============================================================================

/// Distance from mid beyond which a whale is too far out to move the book.
const FAR_FROM_MID_PCT: f64 = 0.03;

/// Dwell beyond which an unfilled order earns the "never traded" bonus.
const UNFILLED_DWELL_NS: i64 = 20 * NANOS_PER_SECOND;

/// Confidence band of a [`SpoofScore`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SpoofConfidence {
    #[default]
    Unlikely,
    Low,
    Medium,
    High,
}

impl SpoofConfidence {
    /// Band a point total: 60+ high, 40+ medium, 25+ low.
    pub fn from_total(total: u32) -> Self {
        if total >= 60 {
            SpoofConfidence::High
        } else if total >= 40 {
            SpoofConfidence::Medium
        } else if total >= 25 {
            SpoofConfidence::Low
        } else {
            SpoofConfidence::Unlikely
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpoofConfidence::Unlikely => "unlikely",
            SpoofConfidence::Low => "low",
            SpoofConfidence::Medium => "medium",
            SpoofConfidence::High => "high",
        }
    }
}

/// Point breakdown behind a confidence band.
///
/// | component      | max | rewards                                        |
/// |----------------|-----|------------------------------------------------|
/// | `duration`     | 25  | dwell in the middle of the spoof window        |
/// | `size_pattern` | 25  | dominating its side, resizing past the cutoff  |
/// | `distance`     | 20  | resting a little away from the touch           |
/// | `behavior`     | 25  | flickering, staying long without being traded  |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoofScore {
    pub total: u32,
    pub duration: u32,
    pub size_pattern: u32,
    pub distance: u32,
    pub behavior: u32,
    pub confidence: SpoofConfidence,
    /// Human-readable contributions, in component order
    pub reasons: Vec<String>,
}

fn score(
    entity: &TrackedEntity,
    policy: &DetectionPolicy,
    fill_evidence: FillEvidenceStatus,
    size_variance: f64,
    distance_from_mid: Option<f64>,
) -> SpoofScore {
    let mut reasons = Vec::new();
    let dwell = entity.dwell_ns();
    let (min, max) = (policy.min_spoof_window_ns, policy.max_spoof_window_ns);

    let duration = if dwell < min {
        if dwell < min / 2 {
            reasons.push(format!("dwell {:.1}s: well below spoof window", ns_to_secs(dwell)));
            0
        } else {
            reasons.push(format!("dwell {:.1}s: just below spoof window", ns_to_secs(dwell)));
            10
        }
    } else if dwell > max {
        reasons.push(format!("dwell {:.1}s: longer than spoof window", ns_to_secs(dwell)));
        5
    } else if dwell >= min.saturating_mul(3) && dwell <= max / 4 * 3 {
        reasons.push(format!("dwell {:.1}s: typical spoof duration", ns_to_secs(dwell)));
        25
    } else {
        reasons.push(format!("dwell {:.1}s: inside spoof window", ns_to_secs(dwell)));
        20
    };

    let share = entity.book_share;
    let mut size_pattern = if share >= 0.5 {
        reasons.push(format!("{:.0}% of side depth", share * 100.0));
        20
    } else if share >= 0.25 {
        reasons.push(format!("{:.0}% of side depth", share * 100.0));
        15
    } else {
        5
    };
    if size_variance > policy.size_variance_cutoff {
        reasons.push(format!("size varied by {:.0}%", size_variance * 100.0));
        size_pattern += 5;
    }

    let distance = match distance_from_mid {
        None => 5,
        Some(d) if d <= policy.near_mid_pct => {
            reasons.push(format!("{:.2}% from mid: close enough to trade", d * 100.0));
            5
        }
        Some(d) if d < FAR_FROM_MID_PCT => {
            reasons.push(format!("{:.2}% from mid: visible but out of reach", d * 100.0));
            if d < policy.spoof_distance_pct {
                15
            } else {
                20
            }
        }
        Some(d) => {
            reasons.push(format!("{:.2}% from mid: far from the touch", d * 100.0));
            10
        }
    };

    let disappearances = entity.disappearance_count;
    let mut behavior = if disappearances >= policy.flicker_min_disappearances {
        reasons.push(format!("flickered {disappearances} times"));
        20
    } else if disappearances >= 1 {
        reasons.push(format!("disappeared {disappearances} time(s)"));
        10
    } else {
        0
    };
    if fill_evidence != FillEvidenceStatus::Observed && dwell > UNFILLED_DWELL_NS {
        reasons.push("never traded despite long dwell".to_string());
        behavior += 5;
    }

    let total = duration + size_pattern + distance + behavior;
    SpoofScore {
        total,
        duration,
        size_pattern,
        distance,
        behavior,
        confidence: SpoofConfidence::from_total(total),
        reasons,
    }
}

// ============================================================================
// Fill Evidence
// ============================================================================

/// Question asked of a fill source when an entity resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillQuery<'a> {
    pub symbol: &'a str,
    pub side: Side,
    /// Most recent price of the entity (fixed-point)
    pub price: i64,
    /// First sight (nanoseconds)
    pub start: i64,
    /// Last presence (nanoseconds)
    pub end: i64,
}

impl<'a> FillQuery<'a> {
    /// Build the query for an entity's dwell window.
    pub fn for_entity(entity: &'a TrackedEntity) -> Self {
        Self {
            symbol: &entity.identity.symbol,
            side: entity.side(),
            price: entity.current_price,
            start: entity.first_seen(),
            end: entity.last_seen,
        }
    }
}

/// An external source of trade prints.
///
/// Returns `Some(true)` if a fill against the described resting liquidity
/// occurred in the window, `Some(false)` if the source can say none did, and
/// `None` if it cannot tell (gap in the feed, window not covered).
pub trait FillEvidence {
    fn was_filled(&self, query: &FillQuery<'_>) -> Option<bool>;
}

impl<F> FillEvidence for F
where
    F: Fn(&FillQuery<'_>) -> Option<bool>,
{
    fn was_filled(&self, query: &FillQuery<'_>) -> Option<bool> {
        self(query)
    }
}

/// Combine the entity's own fill flag with an optional external source.
///
/// `fills_pushed` tells whether the engine has been receiving fills through
/// its own fill path; if so, that stream counts as a source.
pub fn gather_evidence(
    entity: &TrackedEntity,
    source: Option<&dyn FillEvidence>,
    fills_pushed: bool,
) -> FillEvidenceStatus {
    if entity.fill_observed {
        return FillEvidenceStatus::Observed;
    }
    match source.map(|s| s.was_filled(&FillQuery::for_entity(entity))) {
        Some(Some(true)) => FillEvidenceStatus::Observed,
        Some(Some(false)) => FillEvidenceStatus::NotObserved,
        Some(None) => FillEvidenceStatus::Unavailable,
        None if fills_pushed => FillEvidenceStatus::NotObserved,
        None => FillEvidenceStatus::Unavailable,
    }
}

// ============================================================================
// Tests
// ============================================================================
