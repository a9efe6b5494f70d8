//! # Cache Configuration
//!
//! Settings the cache consumes from the configuration layer. Loading the
//! configuration file itself is the app's job.

use crate::primitives::DEFAULT_RELOAD_TIME;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of one symbol cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SymcacheConfig {
    /// Statistics file. Loading and saving are disabled when unset.
    pub cache_filename: Option<PathBuf>,
    /// Period in seconds between statistics saves. The cache never saves on
    /// its own; the embedding scheduler reads [`SymcacheConfig::reload_interval`].
    pub cache_reload_time: f64,
    /// Scoring table cross-linked against registered symbols after `init`.
    pub scores: BTreeMap<String, f64>,
}

impl Default for SymcacheConfig {
    fn default() -> Self {
        Self {
            cache_filename: None,
            cache_reload_time: DEFAULT_RELOAD_TIME,
            scores: BTreeMap::new(),
        }
    }
}

impl SymcacheConfig {
    /// Configuration with a statistics file.
    #[must_use]
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_filename = Some(path.into());
        self
    }

    /// Add one entry to the scoring table.
    #[must_use]
    pub fn with_score(mut self, symbol: impl Into<String>, score: f64) -> Self {
        self.scores.insert(symbol.into(), score);
        self
    }

    /// Save period for the external scheduler. Values that are not a
    /// positive finite number of seconds fall back to the default.
    pub fn reload_interval(&self) -> Duration {
        let fallback = Duration::from_secs_f64(DEFAULT_RELOAD_TIME);
        if self.cache_reload_time <= 0.0 {
            return fallback;
        }
        Duration::try_from_secs_f64(self.cache_reload_time).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_persistence() {
        let config = SymcacheConfig::default();
        assert!(config.cache_filename.is_none());
        assert_eq!(config.cache_reload_time, DEFAULT_RELOAD_TIME);
        assert!(config.scores.is_empty());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: SymcacheConfig =
            serde_json::from_str(r#"{"cache_filename": "/tmp/stats"}"#).expect("parse");
        assert_eq!(config.cache_filename, Some(PathBuf::from("/tmp/stats")));
        assert_eq!(config.cache_reload_time, DEFAULT_RELOAD_TIME);
    }

    #[test]
    fn reload_interval_rejects_nonsense() {
        let mut config = SymcacheConfig::default();
        assert_eq!(config.reload_interval(), Duration::from_secs(30));

        config.cache_reload_time = 2.5;
        assert_eq!(config.reload_interval(), Duration::from_millis(2500));

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            config.cache_reload_time = bad;
            assert_eq!(config.reload_interval(), Duration::from_secs(30));
        }
    }
}
