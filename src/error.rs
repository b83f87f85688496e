//! Error types for the whale tracker.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//! Data-quality variants are never propagated out of snapshot processing;
//! they are wrapped into [`QualityIssue`](crate::warnings::QualityIssue)s.

use thiserror::Error;

use crate::types::Side;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Main error type for tracker operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// Invalid price (zero or negative)
    #[error("Invalid price on {side} level {depth}: {price}")]
    InvalidPrice { side: Side, depth: usize, price: i64 },

    /// Invalid size (zero, negative or NaN)
    #[error("Invalid size on {side} level {depth}: {size}")]
    InvalidSize { side: Side, depth: usize, size: f64 },

    /// Levels not strictly ordered best-first (or duplicated)
    #[error("Unordered {side} level at depth {depth}: {price} does not improve on previous level")]
    UnorderedLevel { side: Side, depth: usize, price: i64 },

    /// Crossed or locked book (best bid >= best ask)
    #[error("Crossed book: best_bid={0} >= best_ask={1}")]
    CrossedBook(i64, i64),

    /// Snapshot timestamp went backwards
    #[error("Non-monotonic timestamp: previous={previous}, current={current}")]
    NonMonotonicTimestamp { previous: i64, current: i64 },

    /// Sequence number is a duplicate or out of order
    #[error("Stale sequence number: previous={previous}, current={current}")]
    StaleSequence { previous: u64, current: u64 },

    /// Snapshot delivered to the engine of another symbol
    #[error("Symbol mismatch: engine tracks {expected}, snapshot is for {actual}")]
    SymbolMismatch { expected: String, actual: String },

    /// Symbol not found (for multi-symbol tracker)
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Symbol is already tracked
    #[error("Symbol already tracked: {0}")]
    DuplicateSymbol(String),

    /// No threshold configuration for a symbol (fatal at startup)
    #[error("Missing configuration for symbol: {0}")]
    MissingSymbolConfig(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lifecycle transition that the state machine does not allow
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl TrackerError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        TrackerError::Generic(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        TrackerError::InvalidConfig(msg.into())
    }

    /// Whether this error describes malformed market data (as opposed to
    /// misuse of the API or bad configuration).
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            TrackerError::InvalidPrice { .. }
                | TrackerError::InvalidSize { .. }
                | TrackerError::UnorderedLevel { .. }
                | TrackerError::CrossedBook(..)
                | TrackerError::NonMonotonicTimestamp { .. }
                | TrackerError::StaleSequence { .. }
        )
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::InvalidConfig(format!("JSON error: {err}"))
    }
}

impl From<String> for TrackerError {
    fn from(err: String) -> Self {
        TrackerError::Generic(err)
    }
}
