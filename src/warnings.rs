//! Data-quality issue tracking.
//!
//! Malformed snapshots never stop an engine. Each rejection is turned into a
//! [`QualityIssue`], returned with the snapshot's report, and accumulated in a
//! [`QualityTracker`] for later inspection or export.
//!
//! # Design Philosophy
//!
//! 1. **Not fail silently**: every rejected side is recorded
//! 2. **Not fail loudly**: recoverable issues never abort processing
//! 3. **Deterministic**: issues carry the snapshot's timestamp, never the wall clock
//!
//! # Example
//!
//! ```
//! use lob_whale_tracker::warnings::{IssueCategory, QualityIssue, QualityTracker};
//!
//! let mut tracker = QualityTracker::new();
//! tracker.record(
//!     QualityIssue::new(IssueCategory::CrossedBook, "BTCUSDT", "best bid above best ask")
//!         .with_sequence(42)
//!         .with_data_timestamp(1_700_000_000_000_000_000),
//! );
//!
//! assert_eq!(tracker.count_by_category(IssueCategory::CrossedBook), 1);
//! ```

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::TrackerError;
use crate::types::Side;

/// Category of a quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    /// Non-positive or NaN price/size, or levels out of order
    InvalidLevel,

    /// Best bid at or above best ask
    CrossedBook,

    /// Snapshot timestamp went backwards
    TimestampAnomaly,

    /// Duplicate or out-of-order sequence number
    SequenceAnomaly,

    /// Disappeared entity evicted because the memory set was full
    MemoryOverflow,

    /// Other/uncategorized issue
    Other,
}

impl IssueCategory {
    /// Get a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            IssueCategory::InvalidLevel => "INVALID_LEVEL",
            IssueCategory::CrossedBook => "CROSSED_BOOK",
            IssueCategory::TimestampAnomaly => "TIMESTAMP_ANOMALY",
            IssueCategory::SequenceAnomaly => "SEQUENCE_ANOMALY",
            IssueCategory::MemoryOverflow => "MEMORY_OVERFLOW",
            IssueCategory::Other => "OTHER",
        }
    }

    /// Get severity level (1=low, 2=medium, 3=high).
    pub fn severity(&self) -> u8 {
        match self {
            IssueCategory::InvalidLevel => 2,
            IssueCategory::CrossedBook => 3,
            IssueCategory::TimestampAnomaly => 3,
            IssueCategory::SequenceAnomaly => 2,
            IssueCategory::MemoryOverflow => 1,
            IssueCategory::Other => 1,
        }
    }

    /// Map a data-quality error to its category.
    pub fn from_error(err: &TrackerError) -> Self {
        match err {
            TrackerError::InvalidPrice { .. }
            | TrackerError::InvalidSize { .. }
            | TrackerError::UnorderedLevel { .. } => IssueCategory::InvalidLevel,
            TrackerError::CrossedBook(..) => IssueCategory::CrossedBook,
            TrackerError::NonMonotonicTimestamp { .. } => IssueCategory::TimestampAnomaly,
            TrackerError::StaleSequence { .. } => IssueCategory::SequenceAnomaly,
            _ => IssueCategory::Other,
        }
    }
}

/// A single quality issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Issue category
    pub category: IssueCategory,

    /// Symbol the issue belongs to
    pub symbol: String,

    /// Human-readable message
    pub message: String,

    /// Affected side (None when the whole snapshot was rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,

    /// Snapshot sequence number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// Snapshot timestamp (nanoseconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_timestamp: Option<i64>,

    /// Additional context as key-value pairs
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub context: HashMap<String, String>,
}

impl QualityIssue {
    /// Create a new issue with minimal information.
    pub fn new(category: IssueCategory, symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            symbol: symbol.into(),
            message: message.into(),
            side: None,
            sequence: None,
            data_timestamp: None,
            context: HashMap::new(),
        }
    }

    /// Build an issue from a data-quality error.
    pub fn from_error(symbol: impl Into<String>, err: &TrackerError) -> Self {
        Self::new(IssueCategory::from_error(err), symbol, err.to_string())
    }

    /// Set the affected side.
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the data timestamp.
    pub fn with_data_timestamp(mut self, ts: i64) -> Self {
        self.data_timestamp = Some(ts);
        self
    }

    /// Add context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Summary statistics for issues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySummary {
    /// Total number of issues (including deduplicated ones)
    pub total: u64,

    /// Count by category name
    pub by_category: HashMap<String, u64>,

    /// Count by severity
    pub by_severity: HashMap<u8, u64>,

    /// First stored issue timestamp
    pub first_timestamp: Option<i64>,

    /// Last stored issue timestamp
    pub last_timestamp: Option<i64>,
}

/// Configuration for the quality tracker.
#[derive(Debug, Clone)]
pub struct QualityTrackerConfig {
    /// Maximum number of issues to keep in memory
    pub max_issues: usize,

    /// Whether to forward issues to the `log` facade
    pub log_issues: bool,

    /// Minimum severity to log (1=all, 2=medium+, 3=high only)
    pub min_log_severity: u8,

    /// Whether to deduplicate identical messages
    pub deduplicate: bool,

    /// Data-time window for deduplication (nanoseconds)
    pub dedupe_window_ns: i64,
}

impl Default for QualityTrackerConfig {
    fn default() -> Self {
        Self {
            max_issues: 100_000,
            log_issues: true,
            min_log_severity: 1,
            deduplicate: true,
            dedupe_window_ns: 1_000_000_000,
        }
    }
}

/// Accumulates quality issues for one engine.
#[derive(Debug, Clone)]
pub struct QualityTracker {
    config: QualityTrackerConfig,

    /// Stored issues
    issues: Vec<QualityIssue>,

    /// Count by category (includes deduplicated issues)
    category_counts: AHashMap<IssueCategory, u64>,

    /// Recent messages for deduplication (category -> (message, timestamp))
    recent: AHashMap<IssueCategory, Vec<(String, i64)>>,
}

impl QualityTracker {
    /// Create a new tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(QualityTrackerConfig::default())
    }

    /// Create a new tracker with custom configuration.
    pub fn with_config(config: QualityTrackerConfig) -> Self {
        Self {
            config,
            issues: Vec::new(),
            category_counts: AHashMap::new(),
            recent: AHashMap::new(),
        }
    }

    /// Record an issue.
    ///
    /// Returns `true` if stored, `false` if it duplicated a recent issue.
    /// Duplicates are still counted.
    pub fn record(&mut self, issue: QualityIssue) -> bool {
        *self.category_counts.entry(issue.category).or_insert(0) += 1;

        if self.config.deduplicate {
            let now = issue.data_timestamp.unwrap_or(0);
            let window = self.config.dedupe_window_ns;
            let recent = self.recent.entry(issue.category).or_default();

            recent.retain(|(_, ts)| now.saturating_sub(*ts) < window);
            if recent.iter().any(|(msg, _)| *msg == issue.message) {
                return false;
            }
            recent.push((issue.message.clone(), now));
        }

        if self.config.log_issues && issue.category.severity() >= self.config.min_log_severity {
            log::warn!(
                "[{}] {} seq={:?}: {}",
                issue.category.name(),
                issue.symbol,
                issue.sequence,
                issue.message
            );
        }

        if self.issues.len() < self.config.max_issues {
            self.issues.push(issue);
        }
        true
    }

    /// Get the number of stored issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Check if no issues have been stored.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Total count including deduplicated issues.
    pub fn total_count(&self) -> u64 {
        self.category_counts.values().sum()
    }

    /// Count for a specific category.
    pub fn count_by_category(&self, category: IssueCategory) -> u64 {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    /// All stored issues.
    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    /// Summary statistics.
    pub fn summary(&self) -> QualitySummary {
        let mut by_category = HashMap::new();
        let mut by_severity = HashMap::new();

        for (cat, count) in &self.category_counts {
            by_category.insert(cat.name().to_string(), *count);
            *by_severity.entry(cat.severity()).or_insert(0) += *count;
        }

        QualitySummary {
            total: self.total_count(),
            by_category,
            by_severity,
            first_timestamp: self.issues.first().and_then(|i| i.data_timestamp),
            last_timestamp: self.issues.last().and_then(|i| i.data_timestamp),
        }
    }

    /// Export summary and issues to a JSON file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        #[derive(Serialize)]
        struct Export<'a> {
            summary: QualitySummary,
            issues: &'a [QualityIssue],
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let export = Export {
            summary: self.summary(),
            issues: &self.issues,
        };
        serde_json::to_writer_pretty(&mut writer, &export)?;
        writer.flush()
    }

    /// Clear all issues and counters.
    pub fn clear(&mut self) {
        self.issues.clear();
        self.category_counts.clear();
        self.recent.clear();
    }
}

impl Default for QualityTracker {
    fn default() -> Self {
        Self::new()
    }
}
