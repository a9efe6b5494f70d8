//! # Formats Module
//!
//! Byte-level encodings used by the cache. Pure transformations, no file I/O.

pub mod persistence;

pub use persistence::{
    PersistedEntry, PersistedFrequency, PersistedStats, StatsHeader, StatsSnapshot,
    stats_from_bytes, stats_to_bytes,
};
