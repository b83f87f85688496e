//! Multi-symbol whale tracker.
//!
//! Manages one [`WhaleEngine`] per symbol. Engines share nothing, so they
//! can also be split off with [`MultiSymbolTracker::into_engines`] and
//! driven from separate threads.

use ahash::AHashMap;

use super::engine::{FillPrint, SnapshotReport, WhaleEngine};
use super::events::ChangeEvent;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::statistics::ResolutionStats;
use crate::types::Snapshot;

/// Multi-symbol whale tracker.
///
/// Every symbol must have its own entry in the [`TrackerConfig`]; a symbol
/// without one is rejected at construction.
///
/// # Example
/// ```
/// use lob_whale_tracker::{MultiSymbolTracker, SymbolConfig, TrackerConfig};
///
/// let config = TrackerConfig::new()
///     .with_symbol("BTCUSDT", SymbolConfig::new(1_000_000.0))
///     .with_symbol("ETHUSDT", SymbolConfig::new(500_000.0));
///
/// let tracker = MultiSymbolTracker::new(config.clone(), &["BTCUSDT", "ETHUSDT"]).unwrap();
/// assert_eq!(tracker.symbol_count(), 2);
///
/// assert!(MultiSymbolTracker::new(config, &["SOLUSDT"]).is_err());
/// ```
#[derive(Debug)]
pub struct MultiSymbolTracker {
    /// Configuration engines are built from
    config: TrackerConfig,

    /// Map of symbol -> engine
    engines: AHashMap<String, WhaleEngine>,

    /// Statistics
    stats: MultiSymbolStats,
}

/// Statistics for multi-symbol processing.
#[derive(Debug, Clone, Default)]
pub struct MultiSymbolStats {
    /// Total symbols tracked
    pub symbol_count: usize,

    /// Total snapshots routed across all symbols
    pub total_snapshots: u64,

    /// Snapshots per symbol
    pub snapshots_per_symbol: AHashMap<String, u64>,
}

impl MultiSymbolTracker {
    /// Create a tracker for the given symbols.
    ///
    /// # Errors
    /// [`TrackerError::MissingSymbolConfig`] if any symbol has no configuration,
    /// [`TrackerError::DuplicateSymbol`] if a symbol is listed twice.
    pub fn new(config: TrackerConfig, symbols: &[&str]) -> Result<Self> {
        let mut tracker = Self {
            config,
            engines: AHashMap::new(),
            stats: MultiSymbolStats::default(),
        };
        for symbol in symbols {
            tracker.add_symbol(symbol)?;
        }
        Ok(tracker)
    }

    /// Create a tracker for every configured symbol.
    pub fn from_config(config: TrackerConfig) -> Result<Self> {
        let symbols: Vec<String> = config.symbols.keys().cloned().collect();
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        Self::new(config, &refs)
    }

    /// Add a new symbol to track.
    pub fn add_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.engines.contains_key(symbol) {
            return Err(TrackerError::DuplicateSymbol(symbol.to_string()));
        }

        let engine = WhaleEngine::new(self.config.engine_config(symbol)?)?;
        self.engines.insert(symbol.to_string(), engine);
        self.stats.symbol_count = self.engines.len();
        self.stats.snapshots_per_symbol.insert(symbol.to_string(), 0);

        Ok(())
    }

    /// Remove a symbol and return its engine.
    pub fn remove_symbol(&mut self, symbol: &str) -> Result<WhaleEngine> {
        let engine = self
            .engines
            .remove(symbol)
            .ok_or_else(|| TrackerError::SymbolNotFound(symbol.to_string()))?;

        self.stats.symbol_count = self.engines.len();
        self.stats.snapshots_per_symbol.remove(symbol);

        Ok(engine)
    }

    /// Route a snapshot to its symbol's engine.
    pub fn process_snapshot(&mut self, snapshot: &Snapshot) -> Result<SnapshotReport> {
        let engine = self
            .engines
            .get_mut(&snapshot.symbol)
            .ok_or_else(|| TrackerError::SymbolNotFound(snapshot.symbol.clone()))?;

        let report = engine.process_snapshot(snapshot)?;

        self.stats.total_snapshots += 1;
        *self
            .stats
            .snapshots_per_symbol
            .entry(snapshot.symbol.clone())
            .or_insert(0) += 1;

        Ok(report)
    }

    /// Route a fill to a symbol's engine.
    pub fn apply_fill(&mut self, symbol: &str, fill: &FillPrint) -> Result<Vec<ChangeEvent>> {
        self.engine_mut(symbol)?.apply_fill(fill)
    }

    /// Advance every engine's clock.
    pub fn advance_clock(&mut self, timestamp: i64) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        for symbol in self.sorted_symbols() {
            events.extend(self.engine_mut(&symbol)?.advance_clock(timestamp)?);
        }
        Ok(events)
    }

    /// Flush every engine, in symbol order.
    pub fn flush_all(&mut self, timestamp: i64) -> Result<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        for symbol in self.sorted_symbols() {
            events.extend(self.engine_mut(&symbol)?.flush(timestamp)?);
        }
        Ok(events)
    }

    /// Engine for a symbol.
    pub fn engine(&self, symbol: &str) -> Result<&WhaleEngine> {
        self.engines
            .get(symbol)
            .ok_or_else(|| TrackerError::SymbolNotFound(symbol.to_string()))
    }

    /// Mutable engine for a symbol.
    pub fn engine_mut(&mut self, symbol: &str) -> Result<&mut WhaleEngine> {
        self.engines
            .get_mut(symbol)
            .ok_or_else(|| TrackerError::SymbolNotFound(symbol.to_string()))
    }

    /// Split into independent engines, sorted by symbol.
    pub fn into_engines(self) -> Vec<WhaleEngine> {
        let mut engines: Vec<WhaleEngine> = self.engines.into_values().collect();
        engines.sort_by(|a, b| a.symbol().cmp(b.symbol()));
        engines
    }

    /// Resolution statistics merged across symbols.
    pub fn combined_resolutions(&self) -> ResolutionStats {
        let mut combined = ResolutionStats::new();
        for engine in self.engines.values() {
            combined.merge(&engine.stats().resolutions);
        }
        combined
    }

    /// Get list of all tracked symbols.
    pub fn symbols(&self) -> Vec<&str> {
        self.engines.keys().map(|s| s.as_str()).collect()
    }

    fn sorted_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.engines.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Get number of tracked symbols.
    pub fn symbol_count(&self) -> usize {
        self.engines.len()
    }

    /// Check if a symbol is being tracked.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.engines.contains_key(symbol)
    }

    /// Get statistics.
    pub fn stats(&self) -> &MultiSymbolStats {
        &self.stats
    }
}
