//! # symcache
//!
//! The command line binary for the symcache scheduling core.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            apps/symcache (THE BINARY)          │
//! │                                                │
//! │  ┌─────────────┐        ┌──────────────────┐  │
//! │  │   CLI       │ ─────▶ │  TOML config     │  │
//! │  │  (clap)     │        │  (symbol table)  │  │
//! │  └──────┬──────┘        └────────┬─────────┘  │
//! │         └──────────────┬─────────┘            │
//! │                        ▼                      │
//! │                ┌───────────────┐              │
//! │                │ symcache-core │              │
//! │                │ (THE LOGIC)   │              │
//! │                └───────────────┘              │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! symcache -c rules.toml check
//! symcache -c rules.toml --json-mode check
//! symcache -c rules.toml save
//! symcache inspect -f /var/lib/symcache/stats.cache
//! ```

use clap::Parser;
use symcache::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // SYMCACHE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("SYMCACHE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("SYMCACHE_LOG")
        .unwrap_or_else(|_| "symcache=info,symcache_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        if e.is_fatal() {
            // The symbol table cannot be used in any form.
            std::process::abort();
        }
        std::process::exit(1);
    }
}
