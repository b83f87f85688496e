//! # LOB-Whale-Tracker
//!
//! Whale identity resolution and spoof lifecycle classification over
//! order-book snapshots.
//!
//! A *whale* is a single price level whose resting notional crosses a
//! per-symbol threshold. The tracker follows each whale across snapshots
//! as it persists, drifts, vanishes and comes back, and when it is finally
//! gone classifies how it behaved: a short-lived order that left without a
//! fill is labelled a confirmed spoof.
//!
//! ## Features
//!
//! - **Identity Resolution**: Tolerance-based greedy matching of whales across snapshots
//! - **Disappeared Memory**: Bounded, TTL-limited memory so flickering orders keep their identity
//! - **Lifecycle State Machine**: `NEW → ACTIVE ⇄ DISAPPEARED → RESOLVED`, enforced
//! - **Spoof Classification**: Duration window, fill evidence and pattern (single, flickering, size manipulation)
//! - **Confidence Scoring**: Point breakdown over dwell, size, distance from mid and flicker behavior
//! - **Change Events**: Ordered event stream, optionally forwarded through a crossbeam channel
//! - **Data Quality Tracking**: Malformed books are reported, never silently dropped
//!
//! ## Quick Start
//!
//! ```rust
//! use lob_whale_tracker::{
//!     EngineConfig, EventKind, PriceLevel, Snapshot, SpoofLabel, SymbolConfig, WhaleEngine,
//! };
//!
//! let config = EngineConfig::new("BTCUSDT", SymbolConfig::new(50_000.0));
//! let mut engine = WhaleEngine::new(config).unwrap();
//!
//! let book = |ts: i64, seq: u64, whale: bool| {
//!     let bids = if whale {
//!         vec![PriceLevel::from_f64(100.0, 1_000.0), PriceLevel::from_f64(99.9, 1.0)]
//!     } else {
//!         vec![PriceLevel::from_f64(99.9, 1.0)]
//!     };
//!     Snapshot::new("BTCUSDT", ts, seq)
//!         .with_bids(bids)
//!         .with_asks(vec![PriceLevel::from_f64(100.1, 1.0)])
//! };
//!
//! // A 100k bid rests for six seconds, then vanishes
//! for i in 0..=30 {
//!     engine.process_snapshot(&book(i * 200_000_000, i as u64 + 1, true)).unwrap();
//! }
//! let report = engine.process_snapshot(&book(6_200_000_000, 32, false)).unwrap();
//! assert_eq!(report.events_of(EventKind::Disappear).count(), 1);
//!
//! // Five minutes later the memory entry expires and the whale is classified
//! let events = engine.advance_clock(306_200_000_000).unwrap();
//! let classification = events[0].classification().unwrap();
//! assert_eq!(classification.label, SpoofLabel::ConfirmedSpoof);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core types: `Snapshot`, `PriceLevel`, `Side`, fixed-point helpers |
//! | [`config`] | Configuration: `TrackerConfig`, `SymbolConfig`, `DetectionPolicy`, `EngineLimits` |
//! | [`tracker`] | Tracking: `WhaleEngine`, `MultiSymbolTracker`, events, classification |
//! | [`statistics`] | Aggregates: `ResolutionStats`, `RunningStats` |
//! | [`warnings`] | Data quality: `QualityTracker`, `QualityIssue`, `IssueCategory` |
//! | [`error`] | Error type: `TrackerError` |

pub mod config;
pub mod error;
pub mod statistics;
pub mod tracker;
pub mod types;
pub mod warnings;

// Re-export commonly used types
pub use error::{Result, TrackerError};
pub use types::{BookConsistency, PriceLevel, Side, Snapshot, NANOS_PER_SECOND, PRICE_SCALE};

// Configuration
pub use config::{DetectionPolicy, EngineConfig, EngineLimits, SymbolConfig, TrackerConfig};

// Tracking
pub use tracker::{
    ChangeEvent, ChannelSink, Classification, EngineStats, EntityId, EntityState, EntitySummary,
    EventKind, EventSink, FillEvidence, FillEvidenceStatus, FillPrint, FillQuery, MultiSymbolStats,
    MultiSymbolTracker, ResolutionCause, ResolvedEntity, SnapshotReport, SpoofConfidence, SpoofLabel,
    SpoofPattern, SpoofScore, TrackedEntity, WhaleEngine, WhaleIdentity, WhaleTier, HEURISTIC_CAVEAT,
};

// Statistics
pub use statistics::{ResolutionStats, RunningStats};

// Data quality
pub use warnings::{IssueCategory, QualityIssue, QualitySummary, QualityTracker, QualityTrackerConfig};
