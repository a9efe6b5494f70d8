//! # Property-Based Tests
//!
//! Ordering and coherence invariants of an initialized cache.

use proptest::collection::vec;
use proptest::prelude::*;
use symcache_core::{ItemId, Stage, SymbolFlags, SymbolSpec, Symcache, SymcacheConfig};

const STAGE_FLAGS: [SymbolFlags; 5] = [
    SymbolFlags::CONNFILTER,
    SymbolFlags::PREFILTER,
    SymbolFlags::NORMAL,
    SymbolFlags::POSTFILTER,
    SymbolFlags::IDEMPOTENT,
];

/// Build a cache from `(stage index, priority)` pairs plus `(from, to)`
/// dependency pairs over the same indices.
fn build(symbols: &[(usize, i32)], deps: &[(usize, usize)]) -> Symcache {
    let mut cache = Symcache::new(SymcacheConfig::default());
    for (i, &(stage, priority)) in symbols.iter().enumerate() {
        cache
            .add_symbol(
                SymbolSpec::new(format!("SYM_{}", i), STAGE_FLAGS[stage % STAGE_FLAGS.len()])
                    .with_priority(priority),
            )
            .expect("add");
    }
    for &(from, to) in deps {
        let from = from % symbols.len();
        let to = to % symbols.len();
        cache
            .add_delayed_dependency(format!("SYM_{}", from), format!("SYM_{}", to))
            .expect("queue");
    }
    cache
}

fn priorities(cache: &Symcache, stage: Stage) -> Vec<i32> {
    cache
        .stage(stage)
        .iter()
        .map(|id| cache.get_item_by_id(*id, false).expect("item").priority)
        .collect()
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Priority-sorted stages are monotonic in the right direction.
    #[test]
    fn stage_priorities_monotonic(
        symbols in vec((0usize..5, -10i32..10), 1..40),
        deps in vec((0usize..40, 0usize..40), 0..30)
    ) {
        let mut cache = build(&symbols, &deps);
        cache.init().expect("init");

        for stage in [Stage::Connection, Stage::Prefilter] {
            let p = priorities(&cache, stage);
            prop_assert!(p.windows(2).all(|w| w[0] >= w[1]), "{}: {:?}", stage, p);
        }
        for stage in [Stage::Postfilter, Stage::Idempotent] {
            let p = priorities(&cache, stage);
            prop_assert!(p.windows(2).all(|w| w[0] <= w[1]), "{}: {:?}", stage, p);
        }
    }

    /// Equal priorities keep registration order.
    #[test]
    fn stage_sort_is_stable(priorities_in in vec(0i32..3, 1..30)) {
        let symbols: Vec<(usize, i32)> = priorities_in.iter().map(|&p| (1, p)).collect();
        let mut cache = build(&symbols, &[]);
        cache.init().expect("init");

        let ids = cache.prefilters();
        for pair in ids.windows(2) {
            let a = cache.get_item_by_id(pair[0], false).expect("item");
            let b = cache.get_item_by_id(pair[1], false).expect("item");
            if a.priority == b.priority {
                prop_assert!(a.id < b.id);
            }
        }
    }

    /// Every item sits at its own id and is in exactly one stage.
    #[test]
    fn ids_coherent_and_stages_partition(
        symbols in vec((0usize..5, -10i32..10), 1..40)
    ) {
        let mut cache = build(&symbols, &[]);
        cache.init().expect("init");

        prop_assert_eq!(cache.len(), symbols.len());
        for item in cache.items() {
            let by_id = cache.get_item_by_id(item.id, false).expect("by id");
            prop_assert_eq!(&by_id.symbol, &item.symbol);
            let stages = Stage::ALL
                .iter()
                .filter(|stage| cache.stage(**stage).contains(&item.id))
                .count();
            prop_assert_eq!(stages, 1);
        }
    }

    /// Resolved edges never point back at their owner and always have a
    /// matching reverse edge.
    #[test]
    fn edges_resolved_without_self_loops(
        symbols in vec((0usize..5, -10i32..10), 1..30),
        deps in vec((0usize..30, 0usize..30), 0..40)
    ) {
        let mut cache = build(&symbols, &deps);
        cache.init().expect("init");

        for item in cache.items() {
            for dep in &item.deps {
                let target = dep.id.expect("resolved");
                prop_assert_ne!(target, item.id);
                let target = cache.get_item_by_id(target, false).expect("target");
                prop_assert!(target.rdeps.iter().any(|r| r.id == Some(item.id)));
            }
        }
    }

    /// In an acyclic filter graph every filter runs after its dependencies.
    #[test]
    fn filters_run_after_dependencies(
        count in 2usize..25,
        deps in vec((0usize..25, 0usize..25), 0..30)
    ) {
        let symbols: Vec<(usize, i32)> = (0..count).map(|i| (2, (i % 4) as i32)).collect();
        // Edges only go from a higher index to a lower one: no cycles.
        let acyclic: Vec<(usize, usize)> = deps
            .iter()
            .map(|&(a, b)| (a % count, b % count))
            .filter(|(a, b)| a > b)
            .collect();
        let mut cache = build(&symbols, &acyclic);
        let report = cache.init().expect("init");
        prop_assert!(report.errors.is_empty(), "{:?}", report.errors);

        let position = |id: ItemId| cache.filters().iter().position(|f| *f == id);
        for item in cache.items() {
            for dep in &item.deps {
                let target = dep.id.expect("resolved");
                prop_assert!(position(target) < position(item.id));
            }
        }
    }
}
