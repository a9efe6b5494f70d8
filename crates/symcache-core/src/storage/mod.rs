//! # Storage Module
//!
//! File-backed persistence of symbol statistics.

mod stats_file;

pub use stats_file::{LoadSummary, inspect, read_snapshot};
