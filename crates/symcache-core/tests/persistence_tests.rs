//! # Statistics Persistence Tests
//!
//! Save/load cycles through a real file, corrupted files and alias
//! propagation on load.

use std::fs;
use std::path::Path;
use symcache_core::primitives::STATS_HEADER_SIZE;
use symcache_core::{
    ItemStats, StatsHeader, SymbolFlags, SymbolSpec, Symcache, SymcacheConfig, SymcacheError, inspect,
};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn registry(path: &Path) -> Symcache {
    let mut cache = Symcache::new(SymcacheConfig::default().with_cache_file(path));
    cache
        .add_symbol(SymbolSpec::new("SYM", SymbolFlags::NORMAL).with_weight(3.456))
        .expect("add");
    cache
}

/// Record known runtime statistics for SYM and save them.
fn save_known_stats(path: &Path) {
    let mut cache = registry(path);
    let report = cache.init().expect("init");
    assert!(report.stats.is_none());

    let id = cache.get_item_by_name("SYM", false).expect("SYM").id;
    let stats = ItemStats {
        weight: 3.456,
        avg_time: 0.1234,
        total_hits: 42,
        last_count: 42,
        avg_frequency: 0.5,
        stddev_frequency: 0.02,
    };
    cache.record_stats(id, stats).expect("record");
    cache.save_items().expect("save");
}

#[test]
fn save_then_load_restores_rounded_stats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    save_known_stats(&path);

    let mut fresh = registry(&path);
    let report = fresh.init().expect("init");
    let summary = report.stats.expect("loaded");
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.ignored, 0);

    let item = fresh.get_item_by_name("SYM", false).expect("SYM");
    // Weight comes from registration, never from the file.
    assert!(close(item.stats.weight, 3.456));
    assert!(close(item.stats.avg_time, 0.12));
    assert_eq!(item.stats.total_hits, 42);
    assert!(close(item.stats.avg_frequency, 0.5));
    assert!(close(item.stats.stddev_frequency, 0.02));
    assert_eq!(fresh.total_hits(), 42);
}

#[test]
fn saved_file_is_inspectable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    save_known_stats(&path);

    let bytes = fs::read(&path).expect("read");
    let header = StatsHeader::from_bytes(&bytes).expect("header");
    assert_eq!(header.nitems, 1);

    let snapshot = inspect(&path).expect("inspect");
    let entry = snapshot["SYM"];
    assert_eq!(entry.weight, Some(3.46));
    assert_eq!(entry.count, Some(42));
}

#[test]
fn truncated_body_leaves_stats_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    let mut bytes = StatsHeader::new(1).to_bytes().to_vec();
    bytes.extend_from_slice(br#"{"SYM":{"time":0.5,"count":"#);
    fs::write(&path, &bytes).expect("write");

    let mut cache = registry(&path);
    assert!(matches!(cache.load_items(), Err(SymcacheError::Payload(_))));

    let report = cache.init().expect("init");
    assert!(report.stats.is_none());
    let item = cache.get_item_by_name("SYM", false).expect("SYM");
    assert_eq!(item.stats.avg_time, 0.0);
    assert_eq!(item.stats.total_hits, 0);
}

#[test]
fn wrong_magic_leaves_stats_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    let mut bytes = StatsHeader::new(1).to_bytes().to_vec();
    bytes[0..4].copy_from_slice(b"rsc1");
    bytes.extend_from_slice(br#"{"SYM":{"time":0.5,"count":7}}"#);
    fs::write(&path, &bytes).expect("write");

    let mut cache = registry(&path);
    assert!(matches!(cache.load_items(), Err(SymcacheError::BadMagic { .. })));
    assert_eq!(cache.total_hits(), 0);
}

#[test]
fn short_file_leaves_stats_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    fs::write(&path, vec![0u8; STATS_HEADER_SIZE - 1]).expect("write");

    let mut cache = registry(&path);
    assert!(matches!(
        cache.load_items(),
        Err(SymcacheError::Truncated { .. })
    ));
    let item = cache.get_item_by_name("SYM", false).expect("SYM");
    assert_eq!(item.stats.total_hits, 0);
}

#[test]
fn unknown_symbols_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    let mut bytes = StatsHeader::new(2).to_bytes().to_vec();
    bytes.extend_from_slice(br#"{"GONE":{"count":5},"SYM":{"count":7}}"#);
    fs::write(&path, &bytes).expect("write");

    let mut cache = registry(&path);
    let summary = cache.load_items().expect("load");
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.ignored, 1);
    assert_eq!(cache.total_hits(), 7);
}

#[test]
fn reloading_does_not_double_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    save_known_stats(&path);

    let mut cache = registry(&path);
    cache.load_items().expect("first load");
    cache.load_items().expect("second load");
    assert_eq!(cache.total_hits(), 42);
    assert!(close(cache.total_weight(), 3.456));
}

#[test]
fn alias_takes_parent_time_and_raises_parent_weight() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stats.cache");
    let mut bytes = StatsHeader::new(2).to_bytes().to_vec();
    bytes.extend_from_slice(
        br#"{"PARENT":{"time":0.75,"count":10},"ALIAS":{"time":0.01,"count":3}}"#,
    );
    fs::write(&path, &bytes).expect("write");

    let mut cache = Symcache::new(SymcacheConfig::default().with_cache_file(&path));
    cache
        .add_symbol(SymbolSpec::new("PARENT", SymbolFlags::NORMAL).with_weight(1.0))
        .expect("add");
    cache
        .add_virtual_symbol(
            SymbolSpec::new("ALIAS", SymbolFlags::NORMAL).with_weight(4.0),
            "PARENT",
        )
        .expect("add");
    let report = cache.init().expect("init");
    assert_eq!(report.stats.expect("loaded").matched, 2);

    let parent = cache.get_item_by_name("PARENT", false).expect("parent");
    let alias = cache.get_item_by_name("ALIAS", false).expect("alias");
    assert!(close(parent.stats.weight, 4.0));
    assert!(close(alias.stats.avg_time, 0.75));
    assert_eq!(alias.stats.total_hits, 3);
}

#[test]
fn scores_override_registered_weights() {
    let config = SymcacheConfig::default()
        .with_score("SYM", 7.5)
        .with_score("UNREGISTERED", 1.0);
    let mut cache = Symcache::new(config);
    cache
        .add_symbol(SymbolSpec::new("SYM", SymbolFlags::NORMAL).with_weight(1.0))
        .expect("add");
    let report = cache.init().expect("init");

    assert_eq!(report.unmatched_scores, vec!["UNREGISTERED".to_string()]);
    let item = cache.get_item_by_name("SYM", false).expect("SYM");
    assert!(close(item.stats.weight, 7.5));
}

#[test]
fn shape_is_frozen_after_init() {
    let mut cache = Symcache::new(SymcacheConfig::default());
    cache
        .add_symbol(SymbolSpec::new("SYM", SymbolFlags::NORMAL))
        .expect("add");
    cache.init().expect("init");

    assert!(matches!(
        cache.add_symbol(SymbolSpec::new("LATE", SymbolFlags::NORMAL)),
        Err(SymcacheError::AlreadyInitialized)
    ));
    assert!(matches!(cache.init(), Err(SymcacheError::AlreadyInitialized)));
}
