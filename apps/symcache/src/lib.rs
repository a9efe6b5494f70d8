//! # symcache
//!
//! Command line front end for `symcache-core`: reads a TOML symbol
//! configuration, registers every symbol, runs initialization and prints or
//! persists the result.

pub mod cli;
pub mod config;

pub use config::{AppConfig, CacheSection, SymbolEntry};
