//! Tracker configuration.
//!
//! Configuration is supplied once at process start. Every tracked symbol needs
//! its own [`SymbolConfig`]; there is deliberately no fallback threshold, and a
//! symbol without one fails [`TrackerConfig::engine_config`] with
//! [`TrackerError::MissingSymbolConfig`].
//!
//! # Calibration
//!
//! The numbers in [`DetectionPolicy::default`] (0.1% / 20% tolerances, 5 s / 60 s
//! dwell windows, 50% variance cutoff, 300 s memory) are reference values, not
//! calibrated ones. Tune them per venue and symbol.
//!
//! # Example
//!
//! ```
//! use lob_whale_tracker::{SymbolConfig, TrackerConfig};
//!
//! let config = TrackerConfig::new()
//!     .with_symbol("BTCUSDT", SymbolConfig::new(1_000_000.0))
//!     .with_symbol("ETHUSDT", SymbolConfig::new(500_000.0).with_mega_threshold(2_000_000.0));
//!
//! assert!(config.engine_config("BTCUSDT").is_ok());
//! assert!(config.engine_config("DOGEUSDT").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, TrackerError};
use crate::types::{secs_to_ns, NANOS_PER_SECOND};

// ============================================================================
// Detection Policy
// ============================================================================

/// Matching tolerances, time windows and classification cutoffs.
///
/// When loaded from JSON, the tolerances, memory TTL, spoof window, variance
/// cutoff and mutation significance must all be present; a missing one fails
/// with [`TrackerError::InvalidConfig`]. Only the secondary knobs
/// (`reappear_tolerance_factor`, `price_move_significance`,
/// `flicker_min_disappearances`, `near_mid_pct`, `spoof_distance_pct`) fall
/// back to their reference values. [`DetectionPolicy::default`] and the presets are for callers that
/// choose the reference values explicitly in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionPolicy {
    /// Maximum relative price difference for an identity match.
    /// Default: 0.001 (0.1%)
    pub price_tolerance: f64,

    /// Maximum relative size difference for an identity match.
    /// Default: 0.20 (20%)
    pub size_tolerance: f64,

    /// Multiplier applied to both tolerances when matching against the
    /// recently-disappeared memory. Default: 1.0 (same rule as active matching)
    #[serde(default = "default_reappear_tolerance_factor")]
    pub reappear_tolerance_factor: f64,

    /// How long a disappeared entity may still be rematched.
    ///
    /// The boundary is inclusive: an entity absent for exactly the TTL is
    /// already purged, so only absences strictly shorter than the TTL can
    /// rematch. Default: 300 s
    pub memory_ttl_ns: i64,

    /// Dwell times below this are too short to call.
    /// Default: 5 s
    pub min_spoof_window_ns: i64,

    /// Dwell times above this are long-lived.
    /// Default: 60 s
    pub max_spoof_window_ns: i64,

    /// (max size − min size) / initial size above which a spoof is tagged
    /// as size manipulation. Default: 0.5
    pub size_variance_cutoff: f64,

    /// Relative size change that counts as a mutation (strictly greater).
    /// Default: 0.05
    pub mutation_significance: f64,

    /// Relative price change that counts as a price move (strictly greater).
    /// Default: 0.001
    #[serde(default = "default_price_move_significance")]
    pub price_move_significance: f64,

    /// Disappearance count at which a spoof is tagged as flickering.
    /// Default: 2
    #[serde(default = "default_flicker_min_disappearances")]
    pub flicker_min_disappearances: u32,

    /// Distance from mid (fraction of mid) within which a whale counts as
    /// sitting near the touch when scoring confidence. Default: 0.005 (0.5%)
    #[serde(default = "default_near_mid_pct")]
    pub near_mid_pct: f64,

    /// Distance from mid (fraction of mid) inside which a whale beyond the
    /// near-touch band scores as a plausible spoof placement rather than a
    /// far one. Default: 0.01 (1%)
    #[serde(default = "default_spoof_distance_pct")]
    pub spoof_distance_pct: f64,
}

fn default_reappear_tolerance_factor() -> f64 {
    1.0
}

fn default_price_move_significance() -> f64 {
    0.001
}

fn default_flicker_min_disappearances() -> u32 {
    2
}

fn default_near_mid_pct() -> f64 {
    0.005
}

fn default_spoof_distance_pct() -> f64 {
    0.01
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            price_tolerance: 0.001,
            size_tolerance: 0.20,
            reappear_tolerance_factor: default_reappear_tolerance_factor(),
            memory_ttl_ns: 300 * NANOS_PER_SECOND,
            min_spoof_window_ns: 5 * NANOS_PER_SECOND,
            max_spoof_window_ns: 60 * NANOS_PER_SECOND,
            size_variance_cutoff: 0.5,
            mutation_significance: 0.05,
            price_move_significance: default_price_move_significance(),
            flicker_min_disappearances: default_flicker_min_disappearances(),
            near_mid_pct: default_near_mid_pct(),
            spoof_distance_pct: default_spoof_distance_pct(),
        }
    }
}

impl DetectionPolicy {
    /// Policy for thin, volatile books: shorter windows, lower variance cutoff.
    pub fn high_volatility() -> Self {
        Self {
            min_spoof_window_ns: 5 * NANOS_PER_SECOND,
            max_spoof_window_ns: 90 * NANOS_PER_SECOND,
            size_variance_cutoff: 0.35,
            flicker_min_disappearances: 3,
            ..Default::default()
        }
    }

    /// Policy for deep, liquid books: longer windows.
    pub fn low_volatility() -> Self {
        Self {
            min_spoof_window_ns: 15 * NANOS_PER_SECOND,
            max_spoof_window_ns: 120 * NANOS_PER_SECOND,
            size_variance_cutoff: 0.3,
            flicker_min_disappearances: 3,
            ..Default::default()
        }
    }

    /// Set identity tolerances (relative, e.g. 0.001 = 0.1%).
    pub fn with_tolerances(mut self, price: f64, size: f64) -> Self {
        self.price_tolerance = price;
        self.size_tolerance = size;
        self
    }

    /// Set the memory TTL in seconds.
    pub fn with_memory_ttl_secs(mut self, secs: f64) -> Self {
        self.memory_ttl_ns = secs_to_ns(secs);
        self
    }

    /// Set the spoof dwell window in seconds.
    pub fn with_spoof_window_secs(mut self, min: f64, max: f64) -> Self {
        self.min_spoof_window_ns = secs_to_ns(min);
        self.max_spoof_window_ns = secs_to_ns(max);
        self
    }

    /// Set the size-variance cutoff.
    pub fn with_size_variance_cutoff(mut self, cutoff: f64) -> Self {
        self.size_variance_cutoff = cutoff;
        self
    }

    /// Set the mutation significance threshold.
    pub fn with_mutation_significance(mut self, significance: f64) -> Self {
        self.mutation_significance = significance;
        self
    }

    /// Set the tolerance multiplier for rematching disappeared entities.
    pub fn with_reappear_tolerance_factor(mut self, factor: f64) -> Self {
        self.reappear_tolerance_factor = factor;
        self
    }

    /// Validate ranges.
    pub fn validate(&self) -> Result<()> {
        non_negative("price_tolerance", self.price_tolerance)?;
        non_negative("size_tolerance", self.size_tolerance)?;
        non_negative("size_variance_cutoff", self.size_variance_cutoff)?;
        non_negative("mutation_significance", self.mutation_significance)?;
        non_negative("price_move_significance", self.price_move_significance)?;
        non_negative("near_mid_pct", self.near_mid_pct)?;
        non_negative("spoof_distance_pct", self.spoof_distance_pct)?;

        if !(self.reappear_tolerance_factor.is_finite() && self.reappear_tolerance_factor > 0.0) {
            return Err(TrackerError::config(format!(
                "reappear_tolerance_factor must be positive, got {}",
                self.reappear_tolerance_factor
            )));
        }
        if self.memory_ttl_ns <= 0 {
            return Err(TrackerError::config("memory_ttl_ns must be positive"));
        }
        if self.min_spoof_window_ns < 0 || self.min_spoof_window_ns > self.max_spoof_window_ns {
            return Err(TrackerError::config(format!(
                "spoof window must satisfy 0 <= min <= max, got [{}, {}] ns",
                self.min_spoof_window_ns, self.max_spoof_window_ns
            )));
        }
        if self.flicker_min_disappearances == 0 {
            return Err(TrackerError::config("flicker_min_disappearances must be >= 1"));
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TrackerError::config(format!("{name} must be finite and >= 0, got {value}")))
    }
}

// ============================================================================
// Symbol Configuration
// ============================================================================

/// Per-symbol configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Minimum notional (quote currency) for a level to be a whale.
    pub whale_notional_threshold: f64,

    /// Optional notional at which a whale is tagged as a mega whale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mega_whale_notional_threshold: Option<f64>,

    /// Matching and classification policy. Required in JSON.
    pub policy: DetectionPolicy,
}

impl SymbolConfig {
    /// Create a config with the given whale threshold and the reference policy.
    pub fn new(whale_notional_threshold: f64) -> Self {
        Self {
            whale_notional_threshold,
            mega_whale_notional_threshold: None,
            policy: DetectionPolicy::default(),
        }
    }

    /// Set the mega-whale threshold.
    pub fn with_mega_threshold(mut self, threshold: f64) -> Self {
        self.mega_whale_notional_threshold = Some(threshold);
        self
    }

    /// Set the detection policy.
    pub fn with_policy(mut self, policy: DetectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.whale_notional_threshold.is_finite() && self.whale_notional_threshold > 0.0) {
            return Err(TrackerError::config(format!(
                "whale_notional_threshold must be positive, got {}",
                self.whale_notional_threshold
            )));
        }
        if let Some(mega) = self.mega_whale_notional_threshold {
            if !(mega.is_finite() && mega >= self.whale_notional_threshold) {
                return Err(TrackerError::config(format!(
                    "mega_whale_notional_threshold ({mega}) must be >= whale threshold ({})",
                    self.whale_notional_threshold
                )));
            }
        }
        self.policy.validate()
    }
}

// ============================================================================
// Engine Limits
// ============================================================================

/// Engine-wide resource limits, shared by every symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum disappeared entities remembered per side.
    /// Oldest disappearance is evicted first. Default: 1_024
    pub max_memory_per_side: usize,

    /// Maximum resolved entities retained for inspection.
    /// Set to 0 to disable retention. Default: 10_000
    pub max_resolved_retention: usize,

    /// Whether to log data-quality rejections and evictions.
    /// Default: true
    pub log_warnings: bool,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_memory_per_side: 1_024,
            max_resolved_retention: 10_000,
            log_warnings: true,
        }
    }
}

impl EngineLimits {
    /// Limits with no resolved retention (minimal memory).
    pub fn minimal() -> Self {
        Self {
            max_memory_per_side: 256,
            max_resolved_retention: 0,
            log_warnings: true,
        }
    }

    /// Set the memory capacity per side.
    pub fn with_max_memory(mut self, max: usize) -> Self {
        self.max_memory_per_side = max;
        self
    }

    /// Set resolved retention.
    pub fn with_max_resolved(mut self, max: usize) -> Self {
        self.max_resolved_retention = max;
        self
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self
    }
}

// ============================================================================
// Tracker Configuration
// ============================================================================

/// Complete configuration for all tracked symbols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Per-symbol configuration.
    pub symbols: BTreeMap<String, SymbolConfig>,

    /// Engine-wide limits.
    #[serde(default)]
    pub limits: EngineLimits,
}

impl TrackerConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a symbol's configuration.
    pub fn with_symbol(mut self, symbol: impl Into<String>, config: SymbolConfig) -> Self {
        self.symbols.insert(symbol.into(), config);
        self
    }

    /// Set engine-wide limits.
    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate every symbol and the limits.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_memory_per_side == 0 {
            return Err(TrackerError::config("max_memory_per_side must be >= 1"));
        }
        for (symbol, config) in &self.symbols {
            config
                .validate()
                .map_err(|e| TrackerError::config(format!("{symbol}: {e}")))?;
        }
        Ok(())
    }

    /// Build the validated engine configuration for one symbol.
    ///
    /// # Errors
    /// [`TrackerError::MissingSymbolConfig`] if the symbol is not configured,
    /// [`TrackerError::InvalidConfig`] if its values are out of range.
    pub fn engine_config(&self, symbol: &str) -> Result<EngineConfig> {
        let symbol_config = self
            .symbols
            .get(symbol)
            .ok_or_else(|| TrackerError::MissingSymbolConfig(symbol.to_string()))?;

        let config = EngineConfig {
            symbol: symbol.to_string(),
            symbol_config: symbol_config.clone(),
            limits: self.limits.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file and validate.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Parse from a JSON string and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Validated configuration for a single symbol engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Symbol this engine tracks.
    pub symbol: String,

    /// Thresholds and policy.
    pub symbol_config: SymbolConfig,

    /// Resource limits.
    pub limits: EngineLimits,
}

impl EngineConfig {
    /// Create an engine config directly (mostly for tests and single-symbol use).
    pub fn new(symbol: impl Into<String>, symbol_config: SymbolConfig) -> Self {
        Self {
            symbol: symbol.into(),
            symbol_config,
            limits: EngineLimits::default(),
        }
    }

    /// Set resource limits.
    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Detection policy.
    #[inline]
    pub fn policy(&self) -> &DetectionPolicy {
        &self.symbol_config.policy
    }

    /// Validate.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_memory_per_side == 0 {
            return Err(TrackerError::config("max_memory_per_side must be >= 1"));
        }
        self.symbol_config
            .validate()
            .map_err(|e| TrackerError::config(format!("{}: {e}", self.symbol)))
    }
}

// ============================================================================
// Tests
// ============================================================================
