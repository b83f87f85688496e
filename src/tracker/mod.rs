//! Whale identity tracking.
//!
//! Scanning, identity resolution, lifecycle, disappeared memory and
//! classification, wired together by [`WhaleEngine`] (one symbol) and
//! [`MultiSymbolTracker`] (many).

pub mod classifier;
pub mod engine;
pub mod entity;
pub mod events;
pub mod lifecycle;
pub mod memory;
mod multi_symbol;
pub mod resolver;
pub mod scanner;

pub use classifier::{
    classify, Classification, FillEvidence, FillEvidenceStatus, FillQuery, SpoofConfidence,
    SpoofLabel, SpoofPattern, SpoofScore, HEURISTIC_CAVEAT,
};
pub use engine::{EngineStats, FillPrint, ResolvedEntity, SnapshotReport, WhaleEngine};
pub use entity::{EntityId, EntitySummary, TrackedEntity, WhaleIdentity};
pub use events::{ChangeEvent, ChannelSink, EventKind, EventSink, ResolutionDetails};
pub use lifecycle::{EntityState, ResolutionCause};
pub use memory::DisappearedMemory;
pub use multi_symbol::{MultiSymbolStats, MultiSymbolTracker};
pub use scanner::{LevelScanner, Observation, WhaleTier};
