//! # CLI Command Implementations

use crate::config::AppConfig;
use std::path::{Path, PathBuf};
use symcache_core::{
    InitReport, ItemId, Stage, StatsSnapshot, Symcache, SymcacheError, inspect,
};

/// Load the configuration, register its symbols and run initialization.
fn load_and_init(config: &Path, tag: &str) -> Result<(Symcache, InitReport), SymcacheError> {
    let app = AppConfig::load(config)?;
    let mut cache = app.build(tag)?;
    let report = cache.init()?;
    Ok((cache, report))
}

fn symbol_names<'a>(cache: &'a Symcache, ids: &[ItemId]) -> Vec<&'a str> {
    ids.iter()
        .filter_map(|id| cache.get_item_by_id(*id, false))
        .map(|item| item.symbol.as_str())
        .collect()
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Print the resolved schedule. Fails when any edge was rejected.
pub fn cmd_check(config: &Path, tag: &str, json_mode: bool) -> Result<(), SymcacheError> {
    let (cache, report) = load_and_init(config, tag)?;

    if json_mode {
        let stages: serde_json::Map<String, serde_json::Value> = Stage::ALL
            .iter()
            .map(|stage| {
                (
                    stage.name().to_string(),
                    serde_json::json!(symbol_names(&cache, cache.stage(*stage))),
                )
            })
            .collect();
        let output = serde_json::json!({
            "symbols": cache.len(),
            "virtual": cache.virtual_symbols().len(),
            "stages": stages,
            "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "unmatched_scores": report.unmatched_scores,
            "stats_loaded": report.stats.map(|s| s.matched),
            "total_weight": cache.total_weight(),
            "total_hits": cache.total_hits(),
            "save_interval_secs": cache.config().reload_interval().as_secs_f64(),
        });
        print_json(&output);
    } else {
        println!("Symbol Cache Schedule");
        println!("=====================");
        println!("Config:  {:?}", config);
        println!(
            "Saves:   every {:.1}s",
            cache.config().reload_interval().as_secs_f64()
        );
        println!(
            "Symbols: {} ({} virtual)",
            cache.len(),
            cache.virtual_symbols().len()
        );
        if let Some(stats) = report.stats {
            println!(
                "Stats:   {} loaded, {} unknown",
                stats.matched, stats.ignored
            );
        }
        println!();

        for stage in Stage::ALL {
            let names = symbol_names(&cache, cache.stage(stage));
            println!("{} ({}):", stage, names.len());
            for name in names {
                let item = cache.get_item_by_name(name, false);
                let priority = item.map_or(0, |item| item.priority);
                let deps = item.map_or(0, |item| item.deps.len());
                println!("  {:<32} priority {:>4}  deps {}", name, priority, deps);
            }
        }

        for name in &report.unmatched_scores {
            println!("warning: score for unregistered symbol {}", name);
        }
        for err in &report.errors {
            println!("error: {}", err);
        }
    }

    if report.errors.is_empty() {
        Ok(())
    } else {
        Err(SymcacheError::Config(format!(
            "{} dependency errors",
            report.errors.len()
        )))
    }
}

// =============================================================================
// SAVE COMMAND
// =============================================================================

/// Resolve the configuration and persist the statistics of every symbol.
pub fn cmd_save(config: &Path, tag: &str, json_mode: bool) -> Result<(), SymcacheError> {
    let (cache, _report) = load_and_init(config, tag)?;
    cache.save_items()?;

    let file = cache.config().cache_filename.clone().unwrap_or_default();
    if json_mode {
        print_json(&serde_json::json!({
            "file": file.to_string_lossy(),
            "symbols": cache.len(),
        }));
    } else {
        println!("Saved statistics for {} symbols to {:?}", cache.len(), file);
    }
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Dump a statistics file, falling back to the configured one.
pub fn cmd_inspect(
    config: &Path,
    file: Option<PathBuf>,
    json_mode: bool,
) -> Result<(), SymcacheError> {
    let path = match file {
        Some(path) => path,
        None => AppConfig::load(config)?
            .cache
            .file
            .ok_or(SymcacheError::NoCacheFile)?,
    };
    let snapshot = inspect(&path)?;

    if json_mode {
        print_json(&snapshot_to_json(&snapshot));
        return Ok(());
    }

    println!("Statistics File {:?}", path);
    println!("{} entries", snapshot.len());
    println!();
    println!(
        "  {:<32} {:>8} {:>8} {:>10} {:>8} {:>8}",
        "symbol", "weight", "time", "count", "avg", "stddev"
    );
    for (name, entry) in &snapshot {
        println!(
            "  {:<32} {:>8.2} {:>8.2} {:>10} {:>8.2} {:>8.2}",
            name,
            entry.weight.unwrap_or_default(),
            entry.time.unwrap_or_default(),
            entry.count.unwrap_or_default(),
            entry.frequency_avg.unwrap_or_default(),
            entry.frequency_stddev.unwrap_or_default(),
        );
    }
    Ok(())
}

/// JSON view of a decoded statistics file; absent fields become `null`.
pub fn snapshot_to_json(snapshot: &StatsSnapshot) -> serde_json::Value {
    let entries: serde_json::Map<String, serde_json::Value> = snapshot
        .iter()
        .map(|(name, entry)| {
            (
                name.clone(),
                serde_json::json!({
                    "weight": entry.weight,
                    "time": entry.time,
                    "count": entry.count,
                    "frequency": {
                        "avg": entry.frequency_avg,
                        "stddev": entry.frequency_stddev,
                    },
                }),
            )
        })
        .collect();
    serde_json::Value::Object(entries)
}
