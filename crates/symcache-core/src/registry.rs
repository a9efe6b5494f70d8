//! # Symbol Registry
//!
//! The [`Symcache`] owns every registered item in a dense arena, indexes them
//! by id and by symbol name, and keeps the per-stage item lists.
//!
//! Items are registered once and never removed. [`Symcache::init`] runs the
//! one-time resolution pass; after it the cache shape is frozen and only item
//! statistics change.

use crate::config::SymcacheConfig;
use crate::item::CacheItem;
use crate::scheduler::Stage;
use crate::stats::ItemStats;
use crate::storage::LoadSummary;
use crate::types::{ConditionRef, ItemId, ResolutionError, SymbolFlags, SymcacheError};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Flags that select one of the four ordered execution stages.
const STAGE_FLAGS: SymbolFlags = SymbolFlags::CONNFILTER
    .union(SymbolFlags::PREFILTER)
    .union(SymbolFlags::POSTFILTER)
    .union(SymbolFlags::IDEMPOTENT);

// =============================================================================
// REGISTRATION INPUT
// =============================================================================

/// Registration request for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSpec {
    pub symbol: String,
    pub flags: SymbolFlags,
    pub priority: i32,
    /// Configured weight, before the scoring table is applied.
    pub weight: f64,
}

impl SymbolSpec {
    #[must_use]
    pub fn new(symbol: impl Into<String>, flags: SymbolFlags) -> Self {
        Self {
            symbol: symbol.into(),
            flags,
            priority: 0,
            weight: 0.0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DelayedDependency {
    pub(crate) from: String,
    pub(crate) to: String,
}

#[derive(Debug, Clone)]
pub(crate) struct DelayedCondition {
    pub(crate) sym: String,
    pub(crate) condition: ConditionRef,
}

/// Outcome of [`Symcache::init`].
#[derive(Debug, Default)]
pub struct InitReport {
    /// Statistics merged from the stats file, if one was usable.
    pub stats: Option<LoadSummary>,
    /// Every dependency or parent reference that was dropped.
    pub errors: Vec<ResolutionError>,
    /// Scoring table entries with no registered symbol.
    pub unmatched_scores: Vec<String>,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The symbol cache.
#[derive(Debug)]
pub struct Symcache {
    pub(crate) config: SymcacheConfig,
    pub(crate) items_by_id: Vec<CacheItem>,
    pub(crate) items_by_symbol: BTreeMap<String, ItemId>,
    pub(crate) virtual_symbols: Vec<ItemId>,
    pub(crate) filters: Vec<ItemId>,
    pub(crate) connfilters: Vec<ItemId>,
    pub(crate) prefilters: Vec<ItemId>,
    pub(crate) postfilters: Vec<ItemId>,
    pub(crate) idempotent: Vec<ItemId>,
    pub(crate) composites: Vec<ItemId>,
    pub(crate) classifiers: Vec<ItemId>,
    pub(crate) delayed_deps: Vec<DelayedDependency>,
    pub(crate) delayed_conditions: Vec<DelayedCondition>,
    pub(crate) total_weight: f64,
    pub(crate) total_hits: u64,
    pub(crate) span: tracing::Span,
    initialized: bool,
}

impl Symcache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: SymcacheConfig) -> Self {
        Self::with_tag(config, "symcache")
    }

    /// Create an empty cache whose log records carry `tag`.
    #[must_use]
    pub fn with_tag(config: SymcacheConfig, tag: &str) -> Self {
        Self {
            config,
            items_by_id: Vec::new(),
            items_by_symbol: BTreeMap::new(),
            virtual_symbols: Vec::new(),
            filters: Vec::new(),
            connfilters: Vec::new(),
            prefilters: Vec::new(),
            postfilters: Vec::new(),
            idempotent: Vec::new(),
            composites: Vec::new(),
            classifiers: Vec::new(),
            delayed_deps: Vec::new(),
            delayed_conditions: Vec::new(),
            total_weight: 0.0,
            total_hits: 0,
            span: tracing::info_span!("symcache", tag = %tag),
            initialized: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SymcacheConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn ensure_mutable_shape(&self) -> Result<(), SymcacheError> {
        if self.initialized {
            return Err(SymcacheError::AlreadyInitialized);
        }
        Ok(())
    }

    fn next_id(&self, symbol: &str) -> Result<ItemId, SymcacheError> {
        if self.items_by_symbol.contains_key(symbol) {
            return Err(SymcacheError::DuplicateSymbol(symbol.to_string()));
        }
        let id = u32::try_from(self.items_by_id.len())
            .map_err(|_| SymcacheError::Config("too many symbols".to_string()))?;
        Ok(ItemId(id))
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a real symbol and place it into its stage list.
    pub fn add_symbol(&mut self, spec: SymbolSpec) -> Result<ItemId, SymcacheError> {
        let _span = self.span.clone().entered();
        self.ensure_mutable_shape()?;

        if spec.symbol.is_empty() {
            return Err(SymcacheError::Config("empty symbol name".to_string()));
        }
        if spec.flags.intersection(STAGE_FLAGS).bits().count_ones() > 1 {
            return Err(SymcacheError::Config(format!(
                "symbol {} has more than one stage flag",
                spec.symbol
            )));
        }

        let id = self.next_id(&spec.symbol)?;
        let mut item = CacheItem::new_real(id, spec.symbol.clone(), spec.flags, spec.priority);
        item.stats = ItemStats::with_weight(spec.weight);

        let flags = item.flags;
        let list = if flags.contains(SymbolFlags::CONNFILTER) {
            &mut self.connfilters
        } else if flags.contains(SymbolFlags::PREFILTER) {
            &mut self.prefilters
        } else if flags.contains(SymbolFlags::POSTFILTER) {
            &mut self.postfilters
        } else if flags.contains(SymbolFlags::IDEMPOTENT) {
            &mut self.idempotent
        } else if flags.contains(SymbolFlags::COMPOSITE) {
            &mut self.composites
        } else if flags.contains(SymbolFlags::CLASSIFIER) {
            &mut self.classifiers
        } else {
            &mut self.filters
        };
        list.push(id);

        debug!(
            "added symbol {} with id {}, priority {}",
            spec.symbol, id, spec.priority
        );
        self.items_by_symbol.insert(spec.symbol, id);
        self.items_by_id.push(item);
        Ok(id)
    }

    /// Register a virtual symbol aliasing `parent`.
    ///
    /// The parent may be registered later; it is linked by name during
    /// `init`. Ghost symbols may pass an empty parent name.
    pub fn add_virtual_symbol(
        &mut self,
        spec: SymbolSpec,
        parent: &str,
    ) -> Result<ItemId, SymcacheError> {
        let _span = self.span.clone().entered();
        self.ensure_mutable_shape()?;

        if spec.symbol.is_empty() {
            return Err(SymcacheError::Config("empty symbol name".to_string()));
        }
        let ghost = spec.flags.contains(SymbolFlags::GHOST);
        if parent.is_empty() && !ghost {
            return Err(SymcacheError::Config(format!(
                "virtual symbol {} has no parent",
                spec.symbol
            )));
        }

        let parent_id = match self.items_by_symbol.get(parent) {
            Some(&pid) => {
                if self.items_by_id.get(pid.index()).is_some_and(CacheItem::is_virtual) {
                    return Err(SymcacheError::Config(format!(
                        "parent {} of virtual symbol {} is virtual",
                        parent, spec.symbol
                    )));
                }
                Some(pid)
            }
            None => None,
        };

        let id = self.next_id(&spec.symbol)?;
        let parent_symbol = (!parent.is_empty()).then(|| parent.to_string());
        let mut item = CacheItem::new_virtual(
            id,
            spec.symbol.clone(),
            spec.flags,
            spec.priority,
            parent_id,
            parent_symbol,
        );
        item.stats = ItemStats::with_weight(spec.weight);

        debug!(
            "added virtual symbol {} with id {}, parent {}",
            spec.symbol, id, parent
        );
        self.items_by_symbol.insert(spec.symbol, id);
        self.items_by_id.push(item);
        self.virtual_symbols.push(id);
        Ok(id)
    }

    /// Replace the settings ids allowed for `name`.
    pub fn set_allowed_ids(
        &mut self,
        name: &str,
        ids: impl IntoIterator<Item = u32>,
    ) -> Result<(), SymcacheError> {
        self.ensure_mutable_shape()?;
        let item = self
            .item_by_name_mut(name)
            .ok_or_else(|| SymcacheError::UnknownSymbol(name.to_string()))?;
        item.allowed_ids.set_ids(ids);
        Ok(())
    }

    /// Replace the settings ids forbidden for `name`.
    pub fn set_forbidden_ids(
        &mut self,
        name: &str,
        ids: impl IntoIterator<Item = u32>,
    ) -> Result<(), SymcacheError> {
        self.ensure_mutable_shape()?;
        let item = self
            .item_by_name_mut(name)
            .ok_or_else(|| SymcacheError::UnknownSymbol(name.to_string()))?;
        item.forbidden_ids.set_ids(ids);
        Ok(())
    }

    /// Queue a dependency between two symbols that may not exist yet.
    pub fn add_delayed_dependency(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<(), SymcacheError> {
        self.ensure_mutable_shape()?;
        self.delayed_deps.push(DelayedDependency {
            from: from.into(),
            to: to.into(),
        });
        Ok(())
    }

    /// Queue a condition callback for a symbol that may not exist yet.
    pub fn add_delayed_condition(
        &mut self,
        sym: impl Into<String>,
        condition: ConditionRef,
    ) -> Result<(), SymcacheError> {
        self.ensure_mutable_shape()?;
        self.delayed_conditions.push(DelayedCondition {
            sym: sym.into(),
            condition,
        });
        Ok(())
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Run the one-time resolution pass.
    ///
    /// Loads prior statistics, links virtual parents, drains the delayed
    /// queues, resolves every declared dependency, sorts the stages and
    /// cross-links the scoring table. Resolution problems are collected in
    /// the report; the only error returned is a fatal configuration error.
    pub fn init(&mut self) -> Result<InitReport, SymcacheError> {
        let _span = self.span.clone().entered();
        self.ensure_mutable_shape()?;

        let mut report = InitReport::default();

        self.link_virtual_parents(&mut report.errors);

        if self.config.cache_filename.is_some() {
            // Failures are already logged; the cache starts with zero stats.
            report.stats = self.load_items().ok();
        }

        self.process_delayed_dependencies(&mut report.errors);
        self.process_delayed_conditions(&mut report.errors)?;
        self.process_all_deps(&mut report.errors);

        self.sort_stages();
        self.resort(&mut report.errors);

        let scores = self.config.scores.clone();
        report.unmatched_scores = self.connect_scores(&scores);

        self.initialized = true;
        info!(
            "initialized {} symbols ({} virtual), {} resolution errors",
            self.items_by_id.len(),
            self.virtual_symbols.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Set the weight of every registered symbol named in `scores`.
    ///
    /// Returns the names that matched no symbol.
    pub fn connect_scores(&mut self, scores: &BTreeMap<String, f64>) -> Vec<String> {
        let mut unmatched = Vec::new();
        for (name, &score) in scores {
            match self.item_by_name_mut(name) {
                Some(item) => item.stats.weight = score,
                None => {
                    warn!("symbol {} has a score but is not registered", name);
                    unmatched.push(name.clone());
                }
            }
        }
        unmatched
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    /// Look up an item by id, optionally following a virtual item to its parent.
    #[must_use]
    pub fn get_item_by_id(&self, id: ItemId, resolve_parent: bool) -> Option<&CacheItem> {
        let Some(item) = self.items_by_id.get(id.index()) else {
            error!(
                "internal error: requested item with id {}, when we have just {} items in the cache",
                id,
                self.items_by_id.len()
            );
            return None;
        };

        if resolve_parent && item.is_virtual() {
            return item.get_parent(self);
        }

        Some(item)
    }

    /// Look up an item by symbol name, optionally following a virtual item to
    /// its parent.
    #[must_use]
    pub fn get_item_by_name(&self, name: &str, resolve_parent: bool) -> Option<&CacheItem> {
        let item = self.items_by_id.get(self.items_by_symbol.get(name)?.index())?;

        if resolve_parent && item.is_virtual() {
            return item.get_parent(self);
        }

        Some(item)
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> Option<&mut CacheItem> {
        self.items_by_id.get_mut(id.index())
    }

    fn item_by_name_mut(&mut self, name: &str) -> Option<&mut CacheItem> {
        let id = *self.items_by_symbol.get(name)?;
        self.item_mut(id)
    }

    // =========================================================================
    // RUNTIME STATISTICS
    // =========================================================================

    /// Replace the runtime statistics of one item.
    ///
    /// Aliases are timed as their parent: recording a virtual item keeps the
    /// parent's mean time, recording a real item copies its mean time onto
    /// every alias of it. Allowed after `init`; only the shape is frozen.
    pub fn record_stats(&mut self, id: ItemId, mut stats: ItemStats) -> Result<(), SymcacheError> {
        let item = self
            .items_by_id
            .get(id.index())
            .ok_or(SymcacheError::InvalidItem {
                id,
                reason: "no such item",
            })?;

        let is_virtual = item.is_virtual();
        if is_virtual {
            if let Some(parent) = item.get_parent(self) {
                stats.avg_time = parent.stats.avg_time;
            }
        }

        let aliases: Vec<ItemId> = if is_virtual {
            Vec::new()
        } else {
            self.virtual_symbols
                .iter()
                .copied()
                .filter(|vid| {
                    self.items_by_id
                        .get(vid.index())
                        .and_then(|alias| alias.get_parent(self))
                        .is_some_and(|parent| parent.id == id)
                })
                .collect()
        };

        let avg_time = stats.avg_time;
        if let Some(item) = self.item_mut(id) {
            item.stats = stats;
        }
        for vid in aliases {
            if let Some(alias) = self.item_mut(vid) {
                alias.stats.avg_time = avg_time;
            }
        }
        Ok(())
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &CacheItem> {
        self.items_by_id.iter()
    }

    /// Registered symbol names with their ids, in name order.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, ItemId)> {
        self.items_by_symbol
            .iter()
            .map(|(name, &id)| (name.as_str(), id))
    }

    /// Visit every item, e.g. to cross-link an external table by name.
    pub fn for_each_item(&self, mut f: impl FnMut(&CacheItem)) {
        for item in &self.items_by_id {
            f(item);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items_by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items_by_id.is_empty()
    }

    /// Ids of all virtual items in registration order.
    #[must_use]
    pub fn virtual_symbols(&self) -> &[ItemId] {
        &self.virtual_symbols
    }

    /// Ordered item ids of one execution stage.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> &[ItemId] {
        match stage {
            Stage::Connection => &self.connfilters,
            Stage::Prefilter => &self.prefilters,
            Stage::Filter => &self.filters,
            Stage::Postfilter => &self.postfilters,
            Stage::Idempotent => &self.idempotent,
        }
    }

    #[must_use]
    pub fn connfilters(&self) -> &[ItemId] {
        &self.connfilters
    }

    #[must_use]
    pub fn prefilters(&self) -> &[ItemId] {
        &self.prefilters
    }

    #[must_use]
    pub fn filters(&self) -> &[ItemId] {
        &self.filters
    }

    #[must_use]
    pub fn postfilters(&self) -> &[ItemId] {
        &self.postfilters
    }

    #[must_use]
    pub fn idempotent(&self) -> &[ItemId] {
        &self.idempotent
    }

    #[must_use]
    pub fn composites(&self) -> &[ItemId] {
        &self.composites
    }

    #[must_use]
    pub fn classifiers(&self) -> &[ItemId] {
        &self.classifiers
    }

    /// Sum of weight magnitudes over symbols loaded from the stats file.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Sum of hit counts over symbols loaded from the stats file.
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, flags: SymbolFlags, priority: i32) -> SymbolSpec {
        SymbolSpec::new(name, flags).with_priority(priority)
    }

    #[test]
    fn ids_are_dense() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        let a = cache.add_symbol(spec("A", SymbolFlags::NORMAL, 0)).expect("add");
        let b = cache
            .add_virtual_symbol(spec("B", SymbolFlags::NORMAL, 0), "A")
            .expect("add");
        let c = cache.add_symbol(spec("C", SymbolFlags::PREFILTER, 0)).expect("add");

        assert_eq!((a, b, c), (ItemId(0), ItemId(1), ItemId(2)));
        for item in cache.items() {
            assert_eq!(cache.items_by_id[item.id.index()].id, item.id);
        }
    }

    #[test]
    fn duplicate_symbol_rejected() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        cache.add_symbol(spec("A", SymbolFlags::NORMAL, 0)).expect("add");
        let result = cache.add_symbol(spec("A", SymbolFlags::PREFILTER, 0));
        assert!(matches!(result, Err(SymcacheError::DuplicateSymbol(ref s)) if s == "A"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn symbols_land_in_their_stage() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        let conn = cache.add_symbol(spec("CONN", SymbolFlags::CONNFILTER, 0)).expect("add");
        let pre = cache.add_symbol(spec("PRE", SymbolFlags::PREFILTER, 0)).expect("add");
        let filter = cache.add_symbol(spec("F", SymbolFlags::NORMAL, 0)).expect("add");
        let post = cache.add_symbol(spec("POST", SymbolFlags::POSTFILTER, 0)).expect("add");
        let idem = cache.add_symbol(spec("IDEM", SymbolFlags::IDEMPOTENT, 0)).expect("add");
        let comp = cache.add_symbol(spec("COMP", SymbolFlags::COMPOSITE, 0)).expect("add");
        cache
            .add_virtual_symbol(spec("V", SymbolFlags::NORMAL, 0), "F")
            .expect("add");

        assert_eq!(cache.connfilters(), &[conn]);
        assert_eq!(cache.prefilters(), &[pre]);
        assert_eq!(cache.filters(), &[filter]);
        assert_eq!(cache.postfilters(), &[post]);
        assert_eq!(cache.idempotent(), &[idem]);
        assert_eq!(cache.composites(), &[comp]);
        assert_eq!(cache.virtual_symbols().len(), 1);
    }

    #[test]
    fn multiple_stage_flags_rejected() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        let result = cache.add_symbol(spec(
            "BAD",
            SymbolFlags::PREFILTER | SymbolFlags::POSTFILTER,
            0,
        ));
        assert!(matches!(result, Err(SymcacheError::Config(_))));
    }

    #[test]
    fn lookups_resolve_parents() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        let parent = cache.add_symbol(spec("P", SymbolFlags::NORMAL, 0)).expect("add");
        let virt = cache
            .add_virtual_symbol(spec("V", SymbolFlags::NORMAL, 0), "P")
            .expect("add");

        assert_eq!(cache.get_item_by_name("V", false).map(|i| i.id), Some(virt));
        assert_eq!(cache.get_item_by_name("V", true).map(|i| i.id), Some(parent));
        assert_eq!(cache.get_item_by_id(virt, true).map(|i| i.id), Some(parent));
        assert!(cache.get_item_by_id(ItemId(99), false).is_none());
        assert!(cache.get_item_by_name("missing", true).is_none());
    }

    #[test]
    fn virtual_parent_must_be_real() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        cache.add_symbol(spec("P", SymbolFlags::NORMAL, 0)).expect("add");
        cache
            .add_virtual_symbol(spec("V", SymbolFlags::NORMAL, 0), "P")
            .expect("add");
        let result = cache.add_virtual_symbol(spec("W", SymbolFlags::NORMAL, 0), "V");
        assert!(matches!(result, Err(SymcacheError::Config(_))));
    }

    #[test]
    fn shape_is_frozen_after_init() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        cache.add_symbol(spec("A", SymbolFlags::NORMAL, 0)).expect("add");
        cache.init().expect("init");

        assert!(cache.is_initialized());
        assert!(matches!(
            cache.add_symbol(spec("B", SymbolFlags::NORMAL, 0)),
            Err(SymcacheError::AlreadyInitialized)
        ));
        assert!(matches!(cache.init(), Err(SymcacheError::AlreadyInitialized)));
    }

    #[test]
    fn recorded_time_follows_parent() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        let parent = cache.add_symbol(spec("P", SymbolFlags::NORMAL, 0)).expect("add");
        let alias = cache
            .add_virtual_symbol(spec("V", SymbolFlags::NORMAL, 0), "P")
            .expect("add");
        cache.init().expect("init");

        let mut stats = ItemStats::with_weight(2.0);
        stats.avg_time = 0.25;
        stats.total_hits = 10;
        cache.record_stats(parent, stats).expect("record");

        let v = cache.get_item_by_id(alias, false).expect("V");
        assert_eq!(v.stats.avg_time, 0.25);
        assert_eq!(v.stats.total_hits, 0);

        let mut alias_stats = ItemStats::with_weight(1.0);
        alias_stats.avg_time = 9.0;
        alias_stats.total_hits = 4;
        cache.record_stats(alias, alias_stats).expect("record");

        let v = cache.get_item_by_id(alias, false).expect("V");
        assert_eq!(v.stats.avg_time, 0.25);
        assert_eq!(v.stats.total_hits, 4);
        assert!(matches!(
            cache.record_stats(ItemId(7), ItemStats::default()),
            Err(SymcacheError::InvalidItem { .. })
        ));
    }

    #[test]
    fn scores_set_weights() {
        let config = SymcacheConfig::default()
            .with_score("A", 2.5)
            .with_score("UNKNOWN", 1.0);
        let mut cache = Symcache::new(config);
        cache
            .add_symbol(spec("A", SymbolFlags::NORMAL, 0).with_weight(1.0))
            .expect("add");

        let report = cache.init().expect("init");
        assert_eq!(report.unmatched_scores, vec!["UNKNOWN".to_string()]);
        assert_eq!(
            cache.get_item_by_name("A", false).map(|i| i.stats.weight),
            Some(2.5)
        );
    }

    #[test]
    fn for_each_item_visits_all() {
        let mut cache = Symcache::new(SymcacheConfig::default());
        cache.add_symbol(spec("A", SymbolFlags::NORMAL, 0)).expect("add");
        cache.add_symbol(spec("B", SymbolFlags::PREFILTER, 0)).expect("add");
        let mut names = Vec::new();
        cache.for_each_item(|item| names.push(item.symbol.clone()));
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
