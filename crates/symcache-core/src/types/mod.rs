//! # Core Type Definitions
//!
//! This module contains the shared types of the symbol cache:
//! - Item identifiers (`ItemId`) and opaque condition handles (`ConditionRef`)
//! - Symbol type flags (`SymbolFlags`)
//! - Error types (`SymcacheError`, `ResolutionError`)

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Dense index of an item in the registry arena.
///
/// Real and virtual items share one id space; `items_by_id[id].id == id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u32);

impl ItemId {
    /// Position of this item in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a condition callback owned by the scripting layer.
///
/// The cache only stores and hands these back; it never invokes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionRef(pub u64);

// =============================================================================
// SYMBOL FLAGS
// =============================================================================

bitflags! {
    /// Type flags of a registered symbol.
    ///
    /// Exactly one of the stage flags (`CONNFILTER`, `PREFILTER`, `POSTFILTER`,
    /// `IDEMPOTENT`) is expected on stage items; items with none of them, and
    /// not composite or classifier, are ordinary filters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SymbolFlags: u32 {
        const NORMAL = 1 << 0;
        const VIRTUAL = 1 << 1;
        const CALLBACK = 1 << 2;
        /// Virtual symbol that may exist without a parent.
        const GHOST = 1 << 3;
        const SKIPPED = 1 << 4;
        const COMPOSITE = 1 << 5;
        const CLASSIFIER = 1 << 6;
        const FINE = 1 << 7;
        const EMPTY = 1 << 8;
        const CONNFILTER = 1 << 9;
        const PREFILTER = 1 << 10;
        const POSTFILTER = 1 << 11;
        const IDEMPOTENT = 1 << 12;
        const SQUEEZED = 1 << 13;
        const TRIVIAL = 1 << 14;
        const MIME_ONLY = 1 << 15;
        const EXPLICIT_DISABLE = 1 << 16;
        const IGNORE_PASSTHROUGH = 1 << 17;
        const NOSTAT = 1 << 18;
    }
}

impl SymbolFlags {
    /// Flags that take an item out of the main filter stage.
    pub const NON_FILTER: SymbolFlags = SymbolFlags::PREFILTER
        .union(SymbolFlags::POSTFILTER)
        .union(SymbolFlags::IDEMPOTENT)
        .union(SymbolFlags::CONNFILTER)
        .union(SymbolFlags::COMPOSITE)
        .union(SymbolFlags::CLASSIFIER);

    /// Parse a symbol type name as used in configuration files.
    pub fn from_type_name(name: &str) -> Result<Self, SymcacheError> {
        let flags = match name.to_ascii_lowercase().as_str() {
            "normal" | "filter" => SymbolFlags::NORMAL,
            "virtual" => SymbolFlags::VIRTUAL,
            "callback" => SymbolFlags::CALLBACK,
            "ghost" => SymbolFlags::GHOST | SymbolFlags::VIRTUAL,
            "composite" => SymbolFlags::COMPOSITE,
            "classifier" => SymbolFlags::CLASSIFIER,
            "connfilter" => SymbolFlags::CONNFILTER,
            "prefilter" => SymbolFlags::PREFILTER,
            "postfilter" => SymbolFlags::POSTFILTER,
            "idempotent" => SymbolFlags::IDEMPOTENT,
            other => {
                return Err(SymcacheError::Config(format!(
                    "unknown symbol type '{}'",
                    other
                )));
            }
        };
        Ok(flags)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors returned by cache operations.
///
/// Persistence failures are never fatal to the caller's startup sequence; the
/// only variant a caller must treat as fatal is `ConditionOnVirtual`.
#[derive(Debug, Error)]
pub enum SymcacheError {
    /// A symbol with this name is already registered.
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    /// An item id is out of range or refers to the wrong kind of item.
    #[error("invalid item {id}: {reason}")]
    InvalidItem { id: ItemId, reason: &'static str },

    /// A symbol lookup failed.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A condition callback was attached to a virtual symbol.
    #[error("cannot register condition for {0}: virtual symbol")]
    ConditionOnVirtual(String),

    /// No statistics file is configured.
    #[error("no statistics file configured")]
    NoCacheFile,

    /// The statistics file is shorter than its header.
    #[error("cannot use file {path:?}, truncated: {size} bytes")]
    Truncated { path: PathBuf, size: usize },

    /// The statistics file does not start with the expected magic bytes.
    #[error("cannot use file {path:?}, bad magic")]
    BadMagic { path: PathBuf },

    /// The statistics file was written by an incompatible format version.
    #[error("cannot use file {path:?}, unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u8,
        expected: u8,
    },

    /// The statistics payload could not be parsed or encoded.
    #[error("statistics payload error: {0}")]
    Payload(String),

    /// Another writer is creating the statistics file right now.
    #[error("statistics file {0:?} is being written by another process")]
    SaveInProgress(PathBuf),

    /// An I/O error occurred.
    #[error("I/O error on {path:?}: {cause}")]
    Io { path: PathBuf, cause: String },

    /// The cache shape is frozen once `init` has run.
    #[error("symbol cache is already initialized")]
    AlreadyInitialized,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SymcacheError {
    /// Whether this error must stop the process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, SymcacheError::ConditionOnVirtual(_))
    }
}

/// A dependency or parent reference that could not be resolved.
///
/// These are reported and the offending edge is dropped; resolution of every
/// other item continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("cannot find dependency on symbol {dependency} for symbol {symbol}")]
    MissingDependency { symbol: String, dependency: String },

    #[error("cannot add dependency from {symbol} on {dependency}: invalid symbol types")]
    InvalidStage { symbol: String, dependency: String },

    #[error("cannot add dependency on self: {symbol} -> {dependency} (resolved to {resolved})")]
    SelfDependency {
        symbol: String,
        dependency: String,
        resolved: String,
    },

    #[error("cannot register delayed dependency between {from} and {to}: {from} is missing")]
    MissingDelayedSource { from: String, to: String },

    #[error("cannot register delayed condition for {symbol}")]
    MissingConditionTarget { symbol: String },

    #[error("cannot find parent {parent} for virtual symbol {symbol}")]
    MissingParent { symbol: String, parent: String },

    #[error("cyclic dependency detected: {symbol} -> {dependency}")]
    CyclicDependency { symbol: String, dependency: String },
}

impl ResolutionError {
    /// The symbol the error is attributed to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            ResolutionError::MissingDependency { symbol, .. }
            | ResolutionError::InvalidStage { symbol, .. }
            | ResolutionError::SelfDependency { symbol, .. }
            | ResolutionError::MissingConditionTarget { symbol }
            | ResolutionError::MissingParent { symbol, .. }
            | ResolutionError::CyclicDependency { symbol, .. } => symbol,
            ResolutionError::MissingDelayedSource { from, .. } => from,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_parse() {
        assert_eq!(
            SymbolFlags::from_type_name("prefilter").expect("parse"),
            SymbolFlags::PREFILTER
        );
        assert!(
            SymbolFlags::from_type_name("Ghost")
                .expect("parse")
                .contains(SymbolFlags::GHOST | SymbolFlags::VIRTUAL)
        );
    }

    #[test]
    fn unknown_type_name_rejected() {
        let result = SymbolFlags::from_type_name("sometimes");
        assert!(matches!(result, Err(SymcacheError::Config(_))));
    }

    #[test]
    fn only_virtual_condition_is_fatal() {
        assert!(SymcacheError::ConditionOnVirtual("V".into()).is_fatal());
        assert!(!SymcacheError::NoCacheFile.is_fatal());
    }

    #[test]
    fn resolution_error_names_symbols() {
        let err = ResolutionError::InvalidStage {
            symbol: "A".into(),
            dependency: "B".into(),
        };
        assert_eq!(err.symbol(), "A");
        let text = err.to_string();
        assert!(text.contains('A') && text.contains('B'));
    }
}
