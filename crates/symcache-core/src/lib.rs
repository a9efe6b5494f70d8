//! # symcache-core
//!
//! The symbol cache of a rule evaluation pipeline - THE LOGIC.
//!
//! Checks ("symbols") are registered independently, in any order, by
//! configuration or extension code. This crate turns them into a schedule:
//!
//! 1. Registration fills the [`Symcache`] arena (real symbols and virtual
//!    aliases of them).
//! 2. [`Symcache::init`] loads prior statistics, resolves delayed and
//!    declared dependencies, rejects edges that break stage semantics,
//!    propagates settings ids along virtual edges and sorts every stage.
//! 3. The execution engine reads the ordered stages; statistics are saved
//!    periodically with [`Symcache::save_items`].
//!
//! ## Architectural Constraints
//!
//! - No check execution: conditions are opaque handles
//! - No async, no network dependencies
//! - Single-threaded initialization; the shape is frozen afterwards
//! - Persistence failures never stop startup
//! - No unsafe code, except the read-only mapping of the stats file

#![deny(unsafe_code)]

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod formats;
pub mod item;
pub mod primitives;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{ConditionRef, ItemId, ResolutionError, SymbolFlags, SymcacheError};

// =============================================================================
// RE-EXPORTS: Cache
// =============================================================================

pub use config::SymcacheConfig;
pub use item::{CacheDependency, CacheItem, IdList, ItemKind};
pub use registry::{InitReport, SymbolSpec, Symcache};
pub use scheduler::Stage;
pub use stats::ItemStats;

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{PersistedEntry, PersistedStats, StatsHeader, StatsSnapshot};
pub use storage::{LoadSummary, inspect};
