//! # Application Configuration
//!
//! TOML file describing the statistics file, the scoring table and every
//! symbol to register.
//!
//! ```toml
//! [cache]
//! file = "/var/lib/symcache/stats.cache"
//! reload_time = 60.0
//!
//! [scores]
//! SPAM_WORD = 2.5
//!
//! [[symbol]]
//! name = "SPAM_WORD"
//! priority = 5
//! depends = ["DNS_CHECK"]
//!
//! [[symbol]]
//! name = "SPAM_WORD_ALIAS"
//! parent = "SPAM_WORD"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use symcache_core::primitives::DEFAULT_RELOAD_TIME;
use symcache_core::{ConditionRef, SymbolFlags, SymbolSpec, Symcache, SymcacheConfig, SymcacheError};
use tracing::debug;

/// Maximum configuration file size (4 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 4 * 1024 * 1024;

/// The `[cache]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub file: Option<PathBuf>,
    pub reload_time: f64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            file: None,
            reload_time: DEFAULT_RELOAD_TIME,
        }
    }
}

fn default_type() -> String {
    "normal".to_string()
}

/// One `[[symbol]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolEntry {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub weight: f64,
    /// Makes the entry a virtual symbol aliasing `parent`.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub ghost: bool,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub allowed_ids: Vec<u32>,
    #[serde(default)]
    pub forbidden_ids: Vec<u32>,
    /// Opaque handle of a condition callback owned by the caller.
    #[serde(default)]
    pub condition: Option<u64>,
}

impl SymbolEntry {
    fn flags(&self) -> Result<SymbolFlags, SymcacheError> {
        let mut flags = SymbolFlags::from_type_name(&self.kind)?;
        if self.ghost {
            flags |= SymbolFlags::GHOST;
        }
        Ok(flags)
    }

    fn is_virtual(&self, flags: SymbolFlags) -> bool {
        self.parent.is_some() || flags.intersects(SymbolFlags::VIRTUAL | SymbolFlags::GHOST)
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub cache: CacheSection,
    pub scores: BTreeMap<String, f64>,
    pub symbol: Vec<SymbolEntry>,
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SymcacheError> {
        toml::from_str(text).map_err(|e| SymcacheError::Config(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, SymcacheError> {
        let io_error = |e: std::io::Error| SymcacheError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        };

        let metadata = std::fs::metadata(path).map_err(io_error)?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(SymcacheError::Config(format!(
                "config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(io_error)?;
        Self::from_toml_str(&text)
    }

    /// Settings handed to the cache itself.
    #[must_use]
    pub fn cache_config(&self) -> SymcacheConfig {
        SymcacheConfig {
            cache_filename: self.cache.file.clone(),
            cache_reload_time: self.cache.reload_time,
            scores: self.scores.clone(),
        }
    }

    /// Register every configured symbol into a fresh cache.
    ///
    /// Symbols are registered in file order; ids, dependencies and conditions
    /// are attached afterwards so they may name any symbol in the file.
    pub fn build(&self, tag: &str) -> Result<Symcache, SymcacheError> {
        let mut cache = Symcache::with_tag(self.cache_config(), tag);

        for entry in &self.symbol {
            let flags = entry.flags()?;
            let spec = SymbolSpec::new(entry.name.clone(), flags)
                .with_priority(entry.priority)
                .with_weight(entry.weight);

            if entry.is_virtual(flags) {
                cache.add_virtual_symbol(spec, entry.parent.as_deref().unwrap_or(""))?;
            } else {
                cache.add_symbol(spec)?;
            }
        }

        for entry in &self.symbol {
            if !entry.allowed_ids.is_empty() {
                cache.set_allowed_ids(&entry.name, entry.allowed_ids.iter().copied())?;
            }
            if !entry.forbidden_ids.is_empty() {
                cache.set_forbidden_ids(&entry.name, entry.forbidden_ids.iter().copied())?;
            }
            for dep in &entry.depends {
                cache.add_delayed_dependency(entry.name.clone(), dep.clone())?;
            }
            if let Some(condition) = entry.condition {
                cache.add_delayed_condition(entry.name.clone(), ConditionRef(condition))?;
            }
        }

        debug!("registered {} symbols from configuration", cache.len());
        Ok(cache)
    }
}
