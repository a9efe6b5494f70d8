//! # Stage Scheduler
//!
//! Orders the execution stages once dependencies are resolved.
//!
//! | Stage      | Order                                              |
//! |------------|----------------------------------------------------|
//! | Connection | priority, highest first                            |
//! | Prefilter  | priority, highest first                            |
//! | Filter     | dependency depth, then priority, then runtime score |
//! | Postfilter | priority, lowest first                             |
//! | Idempotent | priority, lowest first                             |
//!
//! Every sort is stable: items that compare equal keep registration order.

use crate::item::CacheItem;
use crate::primitives::{SCORE_FREQ_ALPHA, SCORE_TIME_ALPHA, SCORE_WEIGHT_ALPHA};
use crate::registry::Symcache;
use crate::types::{ItemId, ResolutionError};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use tracing::{debug, error};

/// One of the ordered execution stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Connection,
    Prefilter,
    Filter,
    Postfilter,
    Idempotent,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Connection,
        Stage::Prefilter,
        Stage::Filter,
        Stage::Postfilter,
        Stage::Idempotent,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Connection => "connfilters",
            Stage::Prefilter => "prefilters",
            Stage::Filter => "filters",
            Stage::Postfilter => "postfilters",
            Stage::Idempotent => "idempotent",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable sort by priority, highest first.
pub fn sort_descending(list: &mut [ItemId], items: &[CacheItem]) {
    list.sort_by_key(|id| Reverse(priority_of(items, *id)));
}

/// Stable sort by priority, lowest first.
pub fn sort_ascending(list: &mut [ItemId], items: &[CacheItem]) {
    list.sort_by_key(|id| priority_of(items, *id));
}

fn priority_of(items: &[CacheItem], id: ItemId) -> i32 {
    items.get(id.index()).map_or(0, |item| item.priority)
}

/// Ranking of a filter among equals: heavy, frequent and fast first.
#[must_use]
pub fn score(weight: f64, frequency: f64, time: f64) -> f64 {
    let w = if weight > 0.0 {
        weight
    } else {
        SCORE_WEIGHT_ALPHA
    };
    let f = if frequency > 0.0 {
        frequency
    } else {
        SCORE_FREQ_ALPHA
    };
    w * f / time.max(SCORE_TIME_ALPHA)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done(u32),
}

/// Depth of `id` in the filter dependency graph; dependencies come first.
fn visit(
    items: &[CacheItem],
    id: ItemId,
    marks: &mut [Mark],
    errors: &mut Vec<ResolutionError>,
) -> u32 {
    match marks.get(id.index()) {
        Some(Mark::Done(depth)) => return *depth,
        Some(Mark::InProgress) | None => return 0,
        Some(Mark::Unvisited) => {}
    }
    let Some(item) = items.get(id.index()) else {
        return 0;
    };
    marks[id.index()] = Mark::InProgress;

    let mut depth = 0;
    for dep in &item.deps {
        let Some(target) = dep.item.and_then(|t| items.get(t.index())) else {
            continue;
        };
        if target.is_virtual() || !target.is_filter() {
            continue;
        }
        if marks.get(target.id.index()) == Some(&Mark::InProgress) {
            let err = ResolutionError::CyclicDependency {
                symbol: item.symbol.clone(),
                dependency: target.symbol.clone(),
            };
            error!("{}", err);
            errors.push(err);
            continue;
        }
        depth = depth.max(visit(items, target.id, marks, errors) + 1);
    }

    marks[id.index()] = Mark::Done(depth);
    depth
}

impl Symcache {
    /// Priority-sort the connection, prefilter, postfilter and idempotent stages.
    pub(crate) fn sort_stages(&mut self) {
        let items = &self.items_by_id;
        sort_descending(&mut self.connfilters, items);
        sort_descending(&mut self.prefilters, items);
        sort_ascending(&mut self.postfilters, items);
        sort_ascending(&mut self.idempotent, items);
    }

    /// Re-sequence the filter stage: dependencies before dependents, then
    /// priority, then the runtime score.
    pub(crate) fn resort(&mut self, errors: &mut Vec<ResolutionError>) {
        let items = &self.items_by_id;
        let mut marks = vec![Mark::Unvisited; items.len()];

        for &id in &self.filters {
            visit(items, id, &mut marks, errors);
        }

        let used = self.filters.len().max(1) as f64;
        let (hits, weight) = self
            .filters
            .iter()
            .filter_map(|id| items.get(id.index()))
            .fold((0.0, 0.0), |(h, w), item| {
                (h + item.stats.total_hits as f64, w + item.stats.weight.abs())
            });
        let avg_hits = hits / used;
        let avg_weight = weight / used;

        let rank = |id: &ItemId| -> (u32, i32, f64) {
            let depth = match marks.get(id.index()) {
                Some(Mark::Done(depth)) => *depth,
                _ => 0,
            };
            let Some(item) = items.get(id.index()) else {
                return (depth, 0, 0.0);
            };
            let f = if avg_hits > 0.0 {
                item.stats.total_hits as f64 / avg_hits
            } else {
                0.0
            };
            let w = if avg_weight > 0.0 {
                item.stats.weight.abs() / avg_weight
            } else {
                0.0
            };
            (depth, item.priority, score(w, f, item.stats.avg_time))
        };

        self.filters.sort_by(|a, b| {
            let (d1, p1, s1) = rank(a);
            let (d2, p2, s2) = rank(b);
            d1.cmp(&d2)
                .then_with(|| p2.cmp(&p1))
                .then_with(|| s2.partial_cmp(&s1).unwrap_or(Ordering::Equal))
        });

        debug!("resorted {} filters", self.filters.len());
    }
}

// =============================================================================
// TESTS
// =============================================================================
