//! # symcache CLI Module
//!
//! ## Available Commands
//!
//! - `check` - Resolve the configuration and print the schedule
//! - `save` - Resolve the configuration and write the statistics file
//! - `inspect` - Dump a statistics file

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use symcache_core::SymcacheError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// symcache - rule symbol scheduler
///
/// Resolves symbol dependencies, orders execution stages and keeps per-symbol
/// runtime statistics across restarts.
#[derive(Parser, Debug)]
#[command(name = "symcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML symbol configuration
    #[arg(short, long, global = true, default_value = "symcache.toml")]
    pub config: PathBuf,

    /// Tag attached to every log line of this cache
    #[arg(short, long, global = true, default_value = "default")]
    pub tag: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve dependencies and print every stage in execution order
    Check,

    /// Resolve dependencies and save statistics to the configured file
    Save,

    /// Print the contents of a statistics file
    Inspect {
        /// Statistics file (defaults to the configured one)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), SymcacheError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Check) | None => cmd_check(&cli.config, &cli.tag, json_mode),
        Some(Commands::Save) => cmd_save(&cli.config, &cli.tag, json_mode),
        Some(Commands::Inspect { file }) => cmd_inspect(&cli.config, file, json_mode),
    }
}
