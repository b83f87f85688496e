//! Single-symbol whale engine.
//!
//! The engine owns every entity of one symbol and advances them one
//! snapshot at a time:
//!
//! 1. reject stale sequences and timestamps that go backwards
//! 2. resolve remembered entities whose TTL ran out at the snapshot time
//! 3. scan both sides; a rejected side is skipped entirely
//! 4. for each accepted side, resolve identities and apply the decisions
//!
//! Processing is deterministic: the output depends only on the input
//! sequence and configuration. Time comes exclusively from snapshot (or
//! call) timestamps.
//!
//! # Example
//!
//! ```
//! use lob_whale_tracker::{EngineConfig, PriceLevel, Snapshot, SymbolConfig, WhaleEngine};
//!
//! let config = EngineConfig::new("BTCUSDT", SymbolConfig::new(50_000.0));
//! let mut engine = WhaleEngine::new(config).unwrap();
//!
//! let snapshot = Snapshot::new("BTCUSDT", 0, 1)
//!     .with_bids(vec![PriceLevel::from_f64(100.0, 1_000.0)])
//!     .with_asks(vec![PriceLevel::from_f64(100.1, 1.0)]);
//!
//! let report = engine.process_snapshot(&snapshot).unwrap();
//! assert_eq!(report.events.len(), 1);
//! assert_eq!(engine.active_count(), 1);
//! ```

use ahash::AHashMap;
use indexmap::IndexMap;
use std::collections::VecDeque;

use super::classifier::{classify, gather_evidence, Classification, FillEvidence, SpoofLabel};
use super::entity::{EntityId, EntitySummary, TrackedEntity};
use super::events::{ChangeEvent, EventKind, EventSink};
use super::lifecycle::ResolutionCause;
use super::memory::DisappearedMemory;
use super::resolver::{resolve_side, Assignment, Tolerance};
use super::scanner::{LevelScanner, Observation, SideScan, WhaleTier};
use crate::config::{DetectionPolicy, EngineConfig};
use crate::error::{Result, TrackerError};
use crate::statistics::ResolutionStats;
use crate::types::{ns_to_secs, price_to_f64, Side, Snapshot};
use crate::warnings::{IssueCategory, QualityIssue, QualityTracker, QualityTrackerConfig};

// ============================================================================
// Reports and Statistics
// ============================================================================

/// Outcome of processing one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotReport {
    /// Snapshot sequence number
    pub sequence: u64,

    /// Snapshot timestamp
    pub timestamp: i64,

    /// Events in emission order
    pub events: Vec<ChangeEvent>,

    /// Data-quality issues raised by this snapshot
    pub issues: Vec<QualityIssue>,

    /// Whole snapshot was skipped (stale sequence or time going backwards)
    pub skipped: bool,

    /// Whale observations on accepted sides
    pub observations: usize,
}

impl SnapshotReport {
    fn new(snapshot: &Snapshot) -> Self {
        Self {
            sequence: snapshot.sequence,
            timestamp: snapshot.timestamp,
            ..Default::default()
        }
    }

    /// Events of one kind.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Whether any side was rejected or the snapshot was skipped.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// A resolved entity retained for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub entity: TrackedEntity,
    pub cause: ResolutionCause,
    pub classification: Classification,
    /// Time of resolution
    pub resolved_at: i64,
}

/// A trade print against resting liquidity.
///
/// `side` is the side of the resting (maker) order that was hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillPrint {
    pub side: Side,
    /// Price in fixed-point format
    pub price: i64,
    pub size: f64,
    pub timestamp: i64,
}

impl FillPrint {
    pub fn new(side: Side, price: i64, size: f64, timestamp: i64) -> Self {
        Self {
            side,
            price,
            size,
            timestamp,
        }
    }

    pub fn from_f64(side: Side, price: f64, size: f64, timestamp: i64) -> Self {
        Self::new(side, crate::types::price_from_f64(price), size, timestamp)
    }

    /// Check price and size the same way book levels are checked.
    pub fn validate(&self) -> Result<()> {
        if self.price <= 0 {
            return Err(TrackerError::InvalidPrice {
                side: self.side,
                depth: 0,
                price: self.price,
            });
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(TrackerError::InvalidSize {
                side: self.side,
                depth: 0,
                size: self.size,
            });
        }
        Ok(())
    }
}

/// Counters for monitoring one engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Snapshots accepted for processing
    pub snapshots_processed: u64,

    /// Snapshots skipped entirely (sequence/timestamp anomalies)
    pub snapshots_skipped: u64,

    /// Sides rejected as malformed
    pub sides_rejected: u64,

    /// Whale observations on accepted sides
    pub observations: u64,

    pub entities_created: u64,
    pub updates: u64,
    pub mutations: u64,
    pub price_moves: u64,
    pub disappearances: u64,
    pub reappearances: u64,

    /// Entities evicted from a full memory
    pub memory_overflow_evictions: u64,

    /// Resolved entities dropped from the retention ring
    pub resolved_evicted: u64,

    pub fills_received: u64,
    pub fills_matched: u64,
    /// Prints with a non-positive price or a non-finite or non-positive size
    pub fills_rejected: u64,

    /// Gauges
    pub active_entities: usize,
    pub remembered_entities: usize,

    /// Last snapshot or clock timestamp
    pub last_timestamp: Option<i64>,

    /// Outcome of every resolution
    pub resolutions: ResolutionStats,
}

// ============================================================================
// Engine
// ============================================================================

/// Tracks whales of one symbol.
pub struct WhaleEngine {
    config: EngineConfig,
    scanner: LevelScanner,

    /// Present entities (NEW/ACTIVE) of both sides
    active: IndexMap<EntityId, TrackedEntity>,

    /// Disappeared entities, one memory per side
    bid_memory: DisappearedMemory,
    ask_memory: DisappearedMemory,

    /// Most recent resolutions, oldest first
    resolved: VecDeque<ResolvedEntity>,

    fill_source: Option<Box<dyn FillEvidence + Send>>,
    sink: Option<Box<dyn EventSink + Send>>,

    quality: QualityTracker,
    stats: EngineStats,

    next_id: u64,
    last_sequence: Option<u64>,
    last_timestamp: Option<i64>,
}

impl std::fmt::Debug for WhaleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhaleEngine")
            .field("symbol", &self.config.symbol)
            .field("active", &self.active.len())
            .field("bid_memory", &self.bid_memory.len())
            .field("ask_memory", &self.ask_memory.len())
            .field("resolved", &self.resolved.len())
            .field("has_fill_source", &self.fill_source.is_some())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl WhaleEngine {
    /// Create an engine from a validated configuration.
    ///
    /// # Errors
    /// [`TrackerError::InvalidConfig`] if any threshold or policy value is out of range.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let ttl = config.policy().memory_ttl_ns;
        let capacity = config.limits.max_memory_per_side;
        let quality = QualityTracker::with_config(QualityTrackerConfig {
            log_issues: config.limits.log_warnings,
            ..Default::default()
        });

        Ok(Self {
            scanner: LevelScanner::new(&config.symbol_config),
            active: IndexMap::new(),
            bid_memory: DisappearedMemory::new(capacity, ttl),
            ask_memory: DisappearedMemory::new(capacity, ttl),
            resolved: VecDeque::new(),
            fill_source: None,
            sink: None,
            quality,
            stats: EngineStats::default(),
            next_id: 1,
            last_sequence: None,
            last_timestamp: None,
            config,
        })
    }

    /// Attach an external fill source consulted at resolution time.
    pub fn with_fill_source(mut self, source: impl FillEvidence + Send + 'static) -> Self {
        self.fill_source = Some(Box::new(source));
        self
    }

    /// Attach an event sink.
    pub fn with_sink(mut self, sink: impl EventSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Replace the event sink.
    pub fn set_sink(&mut self, sink: Option<Box<dyn EventSink + Send>>) {
        self.sink = sink;
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn policy(&self) -> &DetectionPolicy {
        self.config.policy()
    }

    // ------------------------------------------------------------------------
    // Snapshot processing
    // ------------------------------------------------------------------------

    /// Process one snapshot.
    ///
    /// Malformed data never fails the call: it is reported in
    /// [`SnapshotReport::issues`] and recorded in the quality tracker.
    ///
    /// # Errors
    /// [`TrackerError::SymbolMismatch`] if the snapshot belongs to another symbol.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> Result<SnapshotReport> {
        if snapshot.symbol != self.config.symbol {
            return Err(TrackerError::SymbolMismatch {
                expected: self.config.symbol.clone(),
                actual: snapshot.symbol.clone(),
            });
        }

        let mut report = SnapshotReport::new(snapshot);

        if let Err(err) = self.check_ordering(snapshot) {
            let issue = QualityIssue::from_error(&self.config.symbol, &err)
                .with_sequence(snapshot.sequence)
                .with_data_timestamp(snapshot.timestamp);
            self.record_issue(issue.clone());
            report.issues.push(issue);
            report.skipped = true;
            self.stats.snapshots_skipped += 1;
            return Ok(report);
        }

        let now = snapshot.timestamp;
        self.last_sequence = Some(snapshot.sequence);
        self.last_timestamp = Some(now);
        self.stats.last_timestamp = Some(now);

        self.expire_memory(now, &mut report.events)?;

        let mid_price = snapshot.mid_price();
        let (bids, asks) = self.scanner.scan(snapshot).into_sides();

        for (side, scan) in [(Side::Bid, bids), (Side::Ask, asks)] {
            match scan {
                SideScan::Accepted(observations) => {
                    report.observations += observations.len();
                    self.process_side(side, &observations, now, mid_price, &mut report.events)?;
                }
                SideScan::Rejected(err) => {
                    self.stats.sides_rejected += 1;
                    let issue = QualityIssue::from_error(&self.config.symbol, &err)
                        .with_side(side)
                        .with_sequence(snapshot.sequence)
                        .with_data_timestamp(now);
                    self.record_issue(issue.clone());
                    report.issues.push(issue);
                }
            }
        }

        self.stats.snapshots_processed += 1;
        self.stats.observations += report.observations as u64;
        self.refresh_gauges();
        self.publish(&report.events);

        Ok(report)
    }

    /// Reject duplicate/out-of-order sequences and time going backwards.
    fn check_ordering(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(previous) = self.last_sequence {
            if snapshot.sequence <= previous {
                return Err(TrackerError::StaleSequence {
                    previous,
                    current: snapshot.sequence,
                });
            }
        }
        if let Some(previous) = self.last_timestamp {
            if snapshot.timestamp < previous {
                return Err(TrackerError::NonMonotonicTimestamp {
                    previous,
                    current: snapshot.timestamp,
                });
            }
        }
        Ok(())
    }

    /// Resolve identities for one accepted side and apply the decisions.
    fn process_side(
        &mut self,
        side: Side,
        observations: &[Observation],
        now: i64,
        mid_price: Option<f64>,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<()> {
        let policy = self.config.symbol_config.policy.clone();

        let active: Vec<_> = self
            .active
            .values()
            .filter(|e| e.side() == side)
            .map(TrackedEntity::candidate)
            .collect();
        let remembered = self.memory(side).candidates();

        let resolution = resolve_side(
            &active,
            &remembered,
            observations,
            Tolerance::active(&policy),
            Tolerance::reappear(&policy),
        );

        for (obs, assignment) in observations.iter().zip(resolution.assignments) {
            match assignment {
                Assignment::Continued(id) => {
                    let entity = self
                        .active
                        .get_mut(&id)
                        .ok_or_else(|| TrackerError::generic(format!("active entity {id} missing")))?;
                    let outcome = entity.apply_continuation(obs, &policy)?;
                    self.stats.updates += 1;
                    self.stats.mutations += outcome.mutated as u64;
                    self.stats.price_moves += outcome.price_moved as u64;
                    events.push(
                        ChangeEvent::from_entity(EventKind::Update, entity, now)
                            .with_mutation(outcome.mutated),
                    );
                }
                Assignment::Reappeared(id) => {
                    let mut entity = self
                        .memory_mut(side)
                        .take(id)
                        .ok_or_else(|| TrackerError::generic(format!("remembered entity {id} missing")))?;
                    let outcome = entity.apply_reappearance(obs, &policy)?;
                    self.stats.reappearances += 1;
                    self.stats.mutations += outcome.mutated as u64;
                    self.stats.price_moves += outcome.price_moved as u64;
                    log::debug!(
                        "{} {} {} reappeared at {:.4} (count={})",
                        self.config.symbol,
                        side,
                        entity.identity,
                        price_to_f64(entity.current_price),
                        entity.disappearance_count
                    );
                    events.push(
                        ChangeEvent::from_entity(EventKind::Reappear, &entity, now)
                            .with_mutation(outcome.mutated),
                    );
                    self.active.insert(id, entity);
                }
                Assignment::New => {
                    let id = EntityId(self.next_id);
                    self.next_id += 1;
                    let entity = TrackedEntity::new(id, &self.config.symbol, obs, mid_price);
                    self.stats.entities_created += 1;
                    if obs.tier == WhaleTier::MegaWhale && self.config.limits.log_warnings {
                        log::info!(
                            "{} mega whale {} at {:.4} x {} (notional {:.0})",
                            self.config.symbol,
                            entity.identity,
                            price_to_f64(obs.price),
                            obs.size,
                            obs.notional
                        );
                    } else {
                        log::debug!(
                            "{} new {} whale {} at {:.4} x {} (notional {:.0})",
                            self.config.symbol,
                            side,
                            entity.identity,
                            price_to_f64(obs.price),
                            obs.size,
                            obs.notional
                        );
                    }
                    events.push(ChangeEvent::from_entity(EventKind::New, &entity, now));
                    self.active.insert(id, entity);
                }
            }
        }

        for id in resolution.disappeared {
            let mut entity = self
                .active
                .shift_remove(&id)
                .ok_or_else(|| TrackerError::generic(format!("active entity {id} missing")))?;
            entity.apply_disappearance(now)?;
            self.stats.disappearances += 1;
            events.push(ChangeEvent::from_entity(EventKind::Disappear, &entity, now));

            if let Some(evicted) = self.memory_mut(side).insert(entity) {
                self.stats.memory_overflow_evictions += 1;
                let issue = QualityIssue::new(
                    IssueCategory::MemoryOverflow,
                    &self.config.symbol,
                    format!(
                        "{side} memory full ({}), evicting {}",
                        self.config.limits.max_memory_per_side,
                        evicted.identity
                    ),
                )
                .with_side(side)
                .with_data_timestamp(now);
                self.record_issue(issue);
                events.push(self.resolve_entity(evicted, ResolutionCause::MemoryOverflow, now)?);
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Fills, clock and flush
    // ------------------------------------------------------------------------

    /// Attribute a trade print to the closest matching whale on its side.
    ///
    /// The entity (present or remembered) whose current price is within the
    /// price tolerance and closest to the print is flagged as filled. If the
    /// print consumes the level (size at least the entity's size less the
    /// size tolerance) the entity is resolved with
    /// [`ResolutionCause::FillConfirmed`].
    ///
    /// A remembered entity only takes prints up to the snapshot that first
    /// showed it gone; later prints belong to whatever trades there now. A
    /// malformed print is recorded as a quality issue and ignored.
    pub fn apply_fill(&mut self, fill: &FillPrint) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        if let Err(err) = fill.validate() {
            self.stats.fills_rejected += 1;
            let issue = QualityIssue::from_error(&self.config.symbol, &err)
                .with_side(fill.side)
                .with_data_timestamp(fill.timestamp);
            self.record_issue(issue);
            return Ok(events);
        }
        self.stats.fills_received += 1;

        let Some((id, present)) = self.match_fill(fill) else {
            return Ok(events);
        };
        self.stats.fills_matched += 1;

        let size_tolerance = self.policy().size_tolerance;
        let (consumed, identity) = {
            let entity = if present {
                self.active.get_mut(&id)
            } else {
                self.memory_mut(fill.side).get_mut(id)
            }
            .ok_or_else(|| TrackerError::generic(format!("entity {id} missing")))?;

            entity.fill_observed = true;
            (
                fill.size >= entity.current_size * (1.0 - size_tolerance),
                entity.identity.key(),
            )
        };
        log::debug!(
            "{} fill {:.4} x {} attributed to {} (consumed={})",
            self.config.symbol,
            price_to_f64(fill.price),
            fill.size,
            identity,
            consumed
        );

        if consumed {
            let entity = if present {
                self.active.shift_remove(&id)
            } else {
                self.memory_mut(fill.side).take(id)
            }
            .ok_or_else(|| TrackerError::generic(format!("entity {id} missing")))?;
            events.push(self.resolve_entity(entity, ResolutionCause::FillConfirmed, fill.timestamp)?);
            self.refresh_gauges();
        }

        self.publish(&events);
        Ok(events)
    }

    /// Find the entity a fill belongs to: (id, currently present).
    fn match_fill(&self, fill: &FillPrint) -> Option<(EntityId, bool)> {
        let tolerance = self.policy().price_tolerance;

        let present = self
            .active
            .values()
            .filter(|e| e.side() == fill.side)
            .map(|e| (e, true));
        let remembered = self.memory(fill.side).iter().map(|e| (e, false));

        present
            .chain(remembered)
            .filter(|(e, _)| e.first_seen() <= fill.timestamp && e.current_price > 0)
            .filter(|(e, _)| e.last_disappeared_at.map_or(true, |gone| fill.timestamp <= gone))
            .filter_map(|(e, is_present)| {
                let deviation =
                    fill.price.abs_diff(e.current_price) as f64 / e.current_price as f64;
                (deviation <= tolerance).then_some((deviation, e, is_present))
            })
            .min_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then_with(|| b.2.cmp(&a.2))
                    .then_with(|| a.1.first_seen().cmp(&b.1.first_seen()))
                    .then_with(|| a.1.id.cmp(&b.1.id))
            })
            .map(|(_, e, is_present)| (e.id, is_present))
    }

    /// Advance time without a snapshot, resolving expired memory entries.
    ///
    /// A timestamp earlier than the last one seen is recorded as a quality
    /// issue and ignored.
    pub fn advance_clock(&mut self, timestamp: i64) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();

        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                let err = TrackerError::NonMonotonicTimestamp {
                    previous,
                    current: timestamp,
                };
                let issue =
                    QualityIssue::from_error(&self.config.symbol, &err).with_data_timestamp(timestamp);
                self.record_issue(issue);
                return Ok(events);
            }
        }

        self.last_timestamp = Some(timestamp);
        self.stats.last_timestamp = Some(timestamp);
        self.expire_memory(timestamp, &mut events)?;
        self.refresh_gauges();
        self.publish(&events);
        Ok(events)
    }

    /// Resolve every entity, present or remembered (end of stream).
    ///
    /// Entities still on the book are classified with
    /// `resting_at_resolution` set and are never confirmed spoofs.
    pub fn flush(&mut self, timestamp: i64) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        let at = self.last_timestamp.map_or(timestamp, |t| t.max(timestamp));

        let present: Vec<TrackedEntity> = self.active.drain(..).map(|(_, e)| e).collect();
        for entity in present {
            events.push(self.resolve_entity(entity, ResolutionCause::Flushed, at)?);
        }
        for side in Side::BOTH {
            let remembered = self.memory_mut(side).drain();
            for entity in remembered {
                events.push(self.resolve_entity(entity, ResolutionCause::Flushed, at)?);
            }
        }

        self.last_timestamp = Some(at);
        self.stats.last_timestamp = Some(at);
        self.refresh_gauges();
        self.publish(&events);
        Ok(events)
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    fn expire_memory(&mut self, now: i64, events: &mut Vec<ChangeEvent>) -> Result<()> {
        for side in Side::BOTH {
            let expired = self.memory_mut(side).expire(now);
            for entity in expired {
                events.push(self.resolve_entity(entity, ResolutionCause::MemoryExpired, now)?);
            }
        }
        Ok(())
    }

    /// Move an entity to RESOLVED, classify it and retain the result.
    fn resolve_entity(
        &mut self,
        mut entity: TrackedEntity,
        cause: ResolutionCause,
        now: i64,
    ) -> Result<ChangeEvent> {
        entity.apply_resolution()?;

        let evidence = gather_evidence(
            &entity,
            self.fill_source.as_deref().map(|s| s as &dyn FillEvidence),
            self.stats.fills_received > 0,
        );
        let classification = classify(&entity, self.config.policy(), evidence);

        self.stats
            .resolutions
            .record(cause, &classification, entity.initial_notional);

        if classification.label == SpoofLabel::ConfirmedSpoof && self.config.limits.log_warnings {
            log::info!(
                "{} spoof {} {:?}: {} {:.4} x {} for {:.1}s ({} disappearances, variance {:.1}%, fills {:?}, confidence {} [{}])",
                self.config.symbol,
                entity.identity,
                classification.pattern,
                entity.side(),
                price_to_f64(entity.identity.first_price),
                entity.initial_size(),
                ns_to_secs(classification.duration_ns),
                classification.disappearance_count,
                classification.size_variance * 100.0,
                classification.fill_evidence,
                classification.score.confidence.name(),
                classification.score.total
            );
        }

        let event = ChangeEvent::from_entity(EventKind::Resolve, &entity, now)
            .with_resolution(cause, classification.clone());
        self.store_resolved(ResolvedEntity {
            entity,
            cause,
            classification,
            resolved_at: now,
        });
        Ok(event)
    }

    /// Retain a resolved entity, evicting the oldest beyond the limit.
    fn store_resolved(&mut self, resolved: ResolvedEntity) {
        let max = self.config.limits.max_resolved_retention;
        if max == 0 {
            return;
        }
        while self.resolved.len() >= max {
            self.resolved.pop_front();
            self.stats.resolved_evicted += 1;
        }
        self.resolved.push_back(resolved);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[inline]
    fn memory(&self, side: Side) -> &DisappearedMemory {
        match side {
            Side::Bid => &self.bid_memory,
            Side::Ask => &self.ask_memory,
        }
    }

    #[inline]
    fn memory_mut(&mut self, side: Side) -> &mut DisappearedMemory {
        match side {
            Side::Bid => &mut self.bid_memory,
            Side::Ask => &mut self.ask_memory,
        }
    }

    fn record_issue(&mut self, issue: QualityIssue) {
        self.quality.record(issue);
    }

    fn refresh_gauges(&mut self) {
        self.stats.active_entities = self.active.len();
        self.stats.remembered_entities = self.bid_memory.len() + self.ask_memory.len();
    }

    fn publish(&mut self, events: &[ChangeEvent]) {
        if let Some(sink) = self.sink.as_mut() {
            for event in events {
                sink.emit(event);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Present entities (both sides), in insertion order.
    pub fn active_entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.active.values()
    }

    /// Number of present entities.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Remembered entities of one side, oldest disappearance first.
    pub fn remembered_entities(&self, side: Side) -> impl Iterator<Item = &TrackedEntity> {
        self.memory(side).iter()
    }

    /// Number of remembered entities on both sides.
    pub fn remembered_count(&self) -> usize {
        self.bid_memory.len() + self.ask_memory.len()
    }

    /// Look up a present or remembered entity.
    pub fn entity(&self, id: EntityId) -> Option<&TrackedEntity> {
        self.active
            .get(&id)
            .or_else(|| self.bid_memory.get(id))
            .or_else(|| self.ask_memory.get(id))
    }

    /// Summary of a present or remembered entity.
    pub fn summary(&self, id: EntityId) -> Option<EntitySummary> {
        self.entity(id).map(TrackedEntity::summary)
    }

    /// Retained resolutions, oldest first.
    pub fn resolved(&self) -> &VecDeque<ResolvedEntity> {
        &self.resolved
    }

    /// Drain retained resolutions.
    pub fn take_resolved(&mut self) -> Vec<ResolvedEntity> {
        self.resolved.drain(..).collect()
    }

    /// Retained resolutions grouped by label.
    pub fn resolved_by_label(&self) -> AHashMap<SpoofLabel, Vec<&ResolvedEntity>> {
        let mut grouped: AHashMap<SpoofLabel, Vec<&ResolvedEntity>> = AHashMap::new();
        for r in &self.resolved {
            grouped.entry(r.classification.label).or_default().push(r);
        }
        grouped
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn quality(&self) -> &QualityTracker {
        &self.quality
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::classifier::{FillEvidenceStatus, FillQuery};
    use crate::config::{EngineLimits, SymbolConfig};
    use crate::types::{PriceLevel, NANOS_PER_SECOND};

    const SYMBOL: &str = "BTCUSDT";

    fn ts(secs: f64) -> i64 {
        (secs * NANOS_PER_SECOND as f64).round() as i64
    }

    fn engine() -> WhaleEngine {
        let config = EngineConfig::new(SYMBOL, SymbolConfig::new(50_000.0))
            .with_limits(EngineLimits::default().with_logging(false));
        WhaleEngine::new(config).unwrap()
    }

    /// Book with a small ask and the given bid levels.
    struct Feed {
        seq: u64,
    }

    impl Feed {
        fn new() -> Self {
            Self { seq: 0 }
        }

        fn bids(&mut self, secs: f64, bids: &[(f64, f64)]) -> Snapshot {
            self.seq += 1;
            Snapshot::new(SYMBOL, ts(secs), self.seq)
                .with_bids(bids.iter().map(|&(p, s)| PriceLevel::from_f64(p, s)).collect())
                .with_asks(vec![PriceLevel::from_f64(101.0, 1.0)])
        }
    }

    fn kinds(events: &[ChangeEvent]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    // ------------------------------------------------------------------------
    // Basic lifecycle
    // ------------------------------------------------------------------------

    #[test]
    fn test_new_update_disappear() {
        let mut engine = engine();
        let mut feed = Feed::new();

        let r = engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        assert_eq!(kinds(&r.events), vec![EventKind::New]);

        let r = engine.process_snapshot(&feed.bids(0.1, &[(100.0, 1_000.0)])).unwrap();
        assert_eq!(kinds(&r.events), vec![EventKind::Update]);
        assert_eq!(engine.active_entities().next().unwrap().state, crate::EntityState::Active);

        let r = engine.process_snapshot(&feed.bids(0.2, &[(100.0, 1.0)])).unwrap();
        assert_eq!(kinds(&r.events), vec![EventKind::Disappear]);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.remembered_count(), 1);
        assert_eq!(engine.stats().disappearances, 1);
    }

    #[test]
    fn test_mutation_event_flag() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let r = engine.process_snapshot(&feed.bids(1.0, &[(100.0, 1_100.0)])).unwrap();
        assert!(r.events[0].mutated);
        assert_eq!(r.events[0].mutation_count, 1);
        assert_eq!(engine.stats().mutations, 1);
    }

    #[test]
    fn test_symbol_mismatch_is_error() {
        let mut engine = engine();
        let snap = Snapshot::new("ETHUSDT", 0, 1);
        assert!(matches!(
            engine.process_snapshot(&snap),
            Err(TrackerError::SymbolMismatch { .. })
        ));
    }

    // ------------------------------------------------------------------------
    // Data quality
    // ------------------------------------------------------------------------

    #[test]
    fn test_rejected_side_is_not_observed() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        // Malformed bid side: the whale must neither update nor disappear
        let r = engine
            .process_snapshot(&feed.bids(1.0, &[(100.0, 1_000.0), (99.0, -5.0)]))
            .unwrap();
        assert!(r.events.is_empty());
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.issues[0].category, IssueCategory::InvalidLevel);
        assert_eq!(r.issues[0].side, Some(Side::Bid));
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.active_entities().next().unwrap().last_seen, 0);
        assert_eq!(engine.stats().sides_rejected, 1);
    }

    #[test]
    fn test_crossed_book_touches_nothing() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let crossed = Snapshot::new(SYMBOL, ts(1.0), 99)
            .with_bids(vec![PriceLevel::from_f64(102.0, 1_000.0)])
            .with_asks(vec![PriceLevel::from_f64(101.0, 1.0)]);
        let r = engine.process_snapshot(&crossed).unwrap();

        assert!(r.events.is_empty());
        assert_eq!(r.issues.len(), 2);
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.quality().count_by_category(IssueCategory::CrossedBook), 2);
    }

    #[test]
    fn test_stale_sequence_skips_snapshot() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let mut stale = feed.bids(1.0, &[]);
        stale.sequence = 1;
        let r = engine.process_snapshot(&stale).unwrap();
        assert!(r.skipped);
        assert_eq!(r.issues[0].category, IssueCategory::SequenceAnomaly);
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.stats().snapshots_skipped, 1);
    }

    #[test]
    fn test_backwards_timestamp_skips_snapshot() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(5.0, &[(100.0, 1_000.0)])).unwrap();

        let r = engine.process_snapshot(&feed.bids(4.0, &[])).unwrap();
        assert!(r.skipped);
        assert_eq!(r.issues[0].category, IssueCategory::TimestampAnomaly);
        assert_eq!(engine.active_count(), 1);
        assert_eq!(engine.last_timestamp(), Some(ts(5.0)));
    }

    // ------------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------------

    #[test]
    fn test_reappearance_within_ttl() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(1.0, &[])).unwrap();

        let r = engine.process_snapshot(&feed.bids(2.0, &[(100.0, 1_000.0)])).unwrap();
        assert_eq!(kinds(&r.events), vec![EventKind::Reappear]);
        assert_eq!(r.events[0].disappearance_count, 1);
        assert_eq!(r.events[0].entity_id, EntityId(1));
        assert_eq!(engine.remembered_count(), 0);
    }

    #[test]
    fn test_no_rematch_after_ttl() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(1.0, &[])).unwrap();

        let r = engine.process_snapshot(&feed.bids(301.0, &[(100.0, 1_000.0)])).unwrap();
        assert_eq!(kinds(&r.events), vec![EventKind::Resolve, EventKind::New]);
        assert_ne!(r.events[1].entity_id, EntityId(1));
    }

    #[test]
    fn test_memory_overflow_resolves_oldest() {
        let config = EngineConfig::new(SYMBOL, SymbolConfig::new(50_000.0))
            .with_limits(EngineLimits::default().with_max_memory(1).with_logging(false));
        let mut engine = WhaleEngine::new(config).unwrap();
        let mut feed = Feed::new();

        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0), (90.0, 2_000.0)])).unwrap();
        let r = engine.process_snapshot(&feed.bids(1.0, &[])).unwrap();

        assert_eq!(
            kinds(&r.events),
            vec![EventKind::Disappear, EventKind::Disappear, EventKind::Resolve]
        );
        let resolve = &r.events[2];
        assert_eq!(resolve.entity_id, EntityId(1));
        assert_eq!(
            resolve.resolution.as_ref().unwrap().cause,
            ResolutionCause::MemoryOverflow
        );
        assert_eq!(engine.stats().memory_overflow_evictions, 1);
        assert_eq!(engine.quality().count_by_category(IssueCategory::MemoryOverflow), 1);
    }

    // ------------------------------------------------------------------------
    // Fills
    // ------------------------------------------------------------------------

    #[test]
    fn test_consuming_fill_resolves_entity() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(10.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine
            .apply_fill(&FillPrint::from_f64(Side::Bid, 100.0, 1_000.0, ts(10.5)))
            .unwrap();
        assert_eq!(kinds(&events), vec![EventKind::Resolve]);

        let c = events[0].classification().unwrap();
        assert_eq!(c.label, SpoofLabel::FillObserved);
        assert_eq!(c.fill_evidence, FillEvidenceStatus::Observed);
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.stats().resolutions.fill_confirmed, 1);
    }

    #[test]
    fn test_partial_fill_only_flags() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine
            .apply_fill(&FillPrint::from_f64(Side::Bid, 100.0, 10.0, ts(0.5)))
            .unwrap();
        assert!(events.is_empty());
        assert!(engine.entity(EntityId(1)).unwrap().fill_observed);
        assert_eq!(engine.stats().fills_matched, 1);
    }

    #[test]
    fn test_unmatched_fill() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine
            .apply_fill(&FillPrint::from_f64(Side::Ask, 100.0, 1_000.0, ts(0.5)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.stats().fills_received, 1);
        assert_eq!(engine.stats().fills_matched, 0);
    }

    #[test]
    fn test_fill_after_disappearance_is_not_attributed() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(7.0, &[])).unwrap();

        // Print in the gap between last presence and the empty snapshot
        let events = engine
            .apply_fill(&FillPrint::from_f64(Side::Bid, 100.0, 10.0, ts(6.5)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.stats().fills_matched, 1);

        // Print after the level was already seen gone
        engine
            .apply_fill(&FillPrint::from_f64(Side::Bid, 100.0, 1_000.0, ts(8.0)))
            .unwrap();
        assert_eq!(engine.stats().fills_matched, 1);
        assert_eq!(engine.remembered_count(), 1);
    }

    #[test]
    fn test_late_fill_after_ttl_does_not_rescue_spoof() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(7.0, &[])).unwrap();

        let events = engine
            .apply_fill(&FillPrint::from_f64(Side::Bid, 100.0, 1_000.0, ts(400.0)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.stats().fills_matched, 0);

        let events = engine.advance_clock(ts(400.0)).unwrap();
        let c = events[0].classification().unwrap();
        assert_eq!(events[0].resolution.as_ref().unwrap().cause, ResolutionCause::MemoryExpired);
        assert_eq!(c.label, SpoofLabel::ConfirmedSpoof);
        assert_eq!(c.fill_evidence, FillEvidenceStatus::NotObserved);
    }

    #[test]
    fn test_malformed_fill_is_recorded_not_matched() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let bad = [
            FillPrint::new(Side::Bid, i64::MIN, 1_000.0, ts(0.5)),
            FillPrint::new(Side::Bid, 0, 1_000.0, ts(0.5)),
            FillPrint::from_f64(Side::Bid, 100.0, f64::NAN, ts(0.5)),
            FillPrint::from_f64(Side::Bid, 100.0, -5.0, ts(0.5)),
        ];
        for fill in &bad {
            assert!(engine.apply_fill(fill).unwrap().is_empty());
        }

        assert_eq!(engine.stats().fills_rejected, 4);
        assert_eq!(engine.stats().fills_received, 0);
        assert_eq!(engine.quality().count_by_category(IssueCategory::InvalidLevel), 4);
        assert!(!engine.entity(EntityId(1)).unwrap().fill_observed);
    }

    #[test]
    fn test_extreme_fill_price_does_not_overflow() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine
            .apply_fill(&FillPrint::new(Side::Bid, i64::MAX, 1_000.0, ts(0.5)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(engine.stats().fills_received, 1);
        assert_eq!(engine.stats().fills_matched, 0);
    }

    // ------------------------------------------------------------------------
    // Clock, flush, retention
    // ------------------------------------------------------------------------

    #[test]
    fn test_advance_clock_expires() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.2, &[])).unwrap();

        assert!(engine.advance_clock(ts(306.1)).unwrap().is_empty());
        let events = engine.advance_clock(ts(306.2)).unwrap();
        assert_eq!(kinds(&events), vec![EventKind::Resolve]);
        assert_eq!(engine.remembered_count(), 0);

        // backwards: ignored and recorded
        assert!(engine.advance_clock(ts(1.0)).unwrap().is_empty());
        assert_eq!(engine.quality().count_by_category(IssueCategory::TimestampAnomaly), 1);
    }

    #[test]
    fn test_flush_resolves_everything() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0), (90.0, 2_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(1.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine.flush(ts(2.0)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Resolve));
        assert_eq!(engine.active_count(), 0);
        assert_eq!(engine.remembered_count(), 0);
        assert_eq!(engine.stats().resolutions.flushed, 2);
        assert_eq!(engine.resolved().len(), 2);
    }

    #[test]
    fn test_resolved_retention_bounded() {
        let config = EngineConfig::new(SYMBOL, SymbolConfig::new(50_000.0))
            .with_limits(EngineLimits::default().with_max_resolved(1).with_logging(false));
        let mut engine = WhaleEngine::new(config).unwrap();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0), (90.0, 2_000.0)])).unwrap();
        engine.flush(ts(1.0)).unwrap();

        assert_eq!(engine.resolved().len(), 1);
        assert_eq!(engine.stats().resolved_evicted, 1);
        assert_eq!(engine.stats().resolutions.total, 2);
    }

    #[test]
    fn test_sink_receives_events_in_order() {
        let (sink, rx) = crate::ChannelSink::bounded(16);
        let mut engine = engine().with_sink(sink);
        let mut feed = Feed::new();

        let r1 = engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        let r2 = engine.process_snapshot(&feed.bids(1.0, &[])).unwrap();
        let flushed = engine.flush(ts(2.0)).unwrap();

        let received: Vec<ChangeEvent> = rx.try_iter().collect();
        let expected: Vec<ChangeEvent> = r1
            .events
            .into_iter()
            .chain(r2.events)
            .chain(flushed)
            .collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_fill_source_consulted() {
        fn never_filled(_: &FillQuery<'_>) -> Option<bool> {
            Some(false)
        }
        let mut engine = engine().with_fill_source(never_filled);
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.2, &[])).unwrap();

        let events = engine.flush(ts(7.0)).unwrap();
        let c = events[0].classification().unwrap();
        assert_eq!(c.label, SpoofLabel::ConfirmedSpoof);
        assert_eq!(c.fill_evidence, FillEvidenceStatus::NotObserved);
        assert!(!c.resting_at_resolution);
    }

    #[test]
    fn test_flush_of_resting_entity_is_not_spoof() {
        fn never_filled(_: &FillQuery<'_>) -> Option<bool> {
            Some(false)
        }
        let mut engine = engine().with_fill_source(never_filled);
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        engine.process_snapshot(&feed.bids(6.0, &[(100.0, 1_000.0)])).unwrap();

        let events = engine.flush(ts(7.0)).unwrap();
        let c = events[0].classification().unwrap();
        assert_eq!(c.label, SpoofLabel::AmbiguousShort);
        assert_eq!(c.pattern, None);
        assert!(c.resting_at_resolution);
        assert_eq!(engine.stats().resolutions.confirmed_spoof, 0);
        assert_eq!(engine.stats().resolutions.resting_at_resolution, 1);
    }

    #[test]
    fn test_summary_lookup() {
        let mut engine = engine();
        let mut feed = Feed::new();
        engine.process_snapshot(&feed.bids(0.0, &[(100.0, 1_000.0)])).unwrap();
        let summary = engine.summary(EntityId(1)).unwrap();
        assert_eq!(summary.key, "BTCUSDT_bid_100_0");
        assert!(engine.summary(EntityId(99)).is_none());
    }
}
