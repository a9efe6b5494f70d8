//! # Item Statistics
//!
//! Runtime statistics of one symbol. The execution engine updates them while
//! checks run; the statistics store round-trips them through the stats file.

use serde::{Deserialize, Serialize};

/// Per-symbol statistics record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemStats {
    /// Score weight from the scoring table. Never restored from disk.
    pub weight: f64,
    /// Mean execution time in seconds.
    pub avg_time: f64,
    /// Total number of times the symbol fired.
    pub total_hits: u64,
    /// Hit counter at the last frequency sample.
    pub last_count: u64,
    /// Mean firing frequency.
    pub avg_frequency: f64,
    /// Standard deviation of the firing frequency.
    pub stddev_frequency: f64,
}

impl ItemStats {
    /// Zero-initialized statistics with a configured weight.
    #[must_use]
    pub fn with_weight(weight: f64) -> Self {
        Self {
            weight,
            ..Self::default()
        }
    }
}

/// Round to two decimal places, as stored in the stats file.
#[must_use]
pub fn round_to_hundreds(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
