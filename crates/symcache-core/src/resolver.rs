//! # Dependency Resolver
//!
//! Turns declared dependencies (possibly forward references, possibly made
//! through virtual aliases) into concrete edges between items.
//!
//! Legal edges by the dependent's stage:
//!
//! | Dependent    | Accepted targets                                   |
//! |--------------|----------------------------------------------------|
//! | filter       | filter, prefilter                                  |
//! | postfilter   | prefilter                                          |
//! | idempotent   | prefilter, postfilter                              |
//! | prefilter    | prefilter with a strictly higher priority          |
//! | anything else| none                                               |
//!
//! Rejected edges are logged, reported and dropped; resolution continues.

use crate::item::{CacheDependency, CacheItem, IdList, ItemKind};
use crate::registry::{DelayedCondition, DelayedDependency, Symcache};
use crate::types::{ItemId, ResolutionError, SymbolFlags, SymcacheError};
use tracing::{debug, error, trace};

/// Whether an item running in `stage` with `priority` may depend on `target`.
fn dependency_allowed(stage: SymbolFlags, priority: i32, target: &CacheItem) -> bool {
    let target_pre = target.flags.contains(SymbolFlags::PREFILTER);

    if !stage.intersects(SymbolFlags::NON_FILTER) {
        target.is_filter() || target_pre
    } else if stage.contains(SymbolFlags::POSTFILTER) {
        target_pre
    } else if stage.contains(SymbolFlags::IDEMPOTENT) {
        target_pre || target.flags.contains(SymbolFlags::POSTFILTER)
    } else if stage.contains(SymbolFlags::PREFILTER) {
        target_pre && priority < target.priority
    } else {
        false
    }
}

fn report(errors: &mut Vec<ResolutionError>, err: ResolutionError) {
    error!("{}", err);
    errors.push(err);
}

impl Symcache {
    /// Declare that `id_from` depends on the symbol `to`.
    ///
    /// When the dependency was declared through a virtual alias, pass its id
    /// as `virtual_id_from`: the alias gets its own edge so settings ids can
    /// be propagated to it during resolution.
    pub fn add_dependency(
        &mut self,
        id_from: ItemId,
        to: &str,
        virtual_id_from: Option<ItemId>,
    ) -> Result<(), SymcacheError> {
        self.ensure_mutable_shape()?;

        match self.items_by_id.get(id_from.index()) {
            Some(item) if !item.is_virtual() => {}
            Some(_) => {
                return Err(SymcacheError::InvalidItem {
                    id: id_from,
                    reason: "dependency source must be a real symbol",
                });
            }
            None => {
                return Err(SymcacheError::InvalidItem {
                    id: id_from,
                    reason: "no such item",
                });
            }
        }

        if let Some(vid) = virtual_id_from {
            if !self
                .items_by_id
                .get(vid.index())
                .is_some_and(CacheItem::is_virtual)
            {
                return Err(SymcacheError::InvalidItem {
                    id: vid,
                    reason: "virtual dependency source must be a virtual symbol",
                });
            }
        }

        if let Some(source) = self.item_mut(id_from) {
            source.deps.push(CacheDependency::from_real(to, id_from));
        }

        if let Some(vid) = virtual_id_from {
            if let Some(vsource) = self.item_mut(vid) {
                vsource.deps.push(CacheDependency::from_virtual(to, vid));
            }
        }

        Ok(())
    }

    /// Cache the direct parent reference of every virtual item declared by name.
    pub(crate) fn link_virtual_parents(&mut self, errors: &mut Vec<ResolutionError>) {
        for vid in self.virtual_symbols.clone() {
            let Some(item) = self.items_by_id.get(vid.index()) else {
                continue;
            };
            let ItemKind::Virtual { parent_symbol, .. } = &item.kind else {
                continue;
            };

            let parent = parent_symbol.as_deref().and_then(|name| {
                self.items_by_symbol
                    .get(name)
                    .copied()
                    .filter(|pid| {
                        self.items_by_id
                            .get(pid.index())
                            .is_some_and(|p| !p.is_virtual())
                    })
            });

            match parent {
                Some(pid) => {
                    trace!("link virtual symbol {} to parent {}", item.symbol, pid);
                    if let Some(ItemKind::Virtual { parent, .. }) =
                        self.item_mut(vid).map(|item| &mut item.kind)
                    {
                        *parent = Some(pid);
                    }
                }
                None if item.is_ghost() => {}
                None => {
                    let err = ResolutionError::MissingParent {
                        symbol: item.symbol.clone(),
                        parent: parent_symbol.clone().unwrap_or_default(),
                    };
                    report(errors, err);
                }
            }
        }
    }

    /// Turn the queued delayed dependencies into ordinary declarations.
    pub(crate) fn process_delayed_dependencies(&mut self, errors: &mut Vec<ResolutionError>) {
        for DelayedDependency { from, to } in std::mem::take(&mut self.delayed_deps) {
            let virt = self.get_item_by_name(&from, false).map(|item| item.id);
            let real = self.get_item_by_name(&from, true).map(|item| item.id);

            let (Some(virt), Some(real)) = (virt, real) else {
                report(errors, ResolutionError::MissingDelayedSource { from, to });
                continue;
            };

            debug!(
                "delayed between {}({}:{}) -> {}",
                from, real, virt, to
            );
            let virtual_id = (virt != real).then_some(virt);
            if let Err(e) = self.add_dependency(real, &to, virtual_id) {
                error!("cannot add delayed dependency {} -> {}: {}", from, to, e);
            }
        }
    }

    /// Attach queued condition callbacks.
    ///
    /// A condition naming a virtual symbol is a fatal configuration error.
    pub(crate) fn process_delayed_conditions(
        &mut self,
        errors: &mut Vec<ResolutionError>,
    ) -> Result<(), SymcacheError> {
        for DelayedCondition { sym, condition } in std::mem::take(&mut self.delayed_conditions) {
            let Some(id) = self.items_by_symbol.get(&sym).copied() else {
                report(errors, ResolutionError::MissingConditionTarget { symbol: sym });
                continue;
            };

            if let Some(item) = self.item_mut(id) {
                if let Err(e) = item.add_condition(condition) {
                    error!(
                        "cannot register delayed condition for {}: virtual parent; qed",
                        sym
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Resolve the declared dependencies of every real item, then every
    /// virtual item.
    pub(crate) fn process_all_deps(&mut self, errors: &mut Vec<ResolutionError>) {
        let real: Vec<ItemId> = self
            .items_by_id
            .iter()
            .filter(|item| !item.is_virtual())
            .map(|item| item.id)
            .collect();

        for id in real {
            self.process_deps(id, errors);
        }
        for id in self.virtual_symbols.clone() {
            self.process_deps(id, errors);
        }
    }

    /// Resolve the declared dependencies of one item.
    ///
    /// Accepted edges get their target id and a reverse edge on the target;
    /// everything that did not resolve is pruned from `deps`.
    pub fn process_deps(&mut self, id: ItemId, errors: &mut Vec<ResolutionError>) {
        let Some(current) = self.items_by_id.get(id.index()) else {
            return;
        };

        let symbol = current.symbol.clone();
        let priority = current.priority;
        let stage = current.stage_flags(self);
        let mut deps = current.deps.clone();

        let mut allowed: Option<IdList> = None;
        let mut forbidden: Option<IdList> = None;
        let mut reverse = Vec::new();

        for dep in deps.iter_mut().filter(|dep| !dep.is_resolved()) {
            trace!("process dependency {} on {}", symbol, dep.sym);
            let target = self.get_item_by_name(&dep.sym, true);

            if dep.source_virtual_id.is_some() {
                let vdit = self.get_item_by_name(&dep.sym, false);
                if vdit.is_none() && target.is_some() {
                    error!(
                        "cannot find virtual dependency {} for symbol {}",
                        dep.sym, symbol
                    );
                }
                if let (Some(vdit), Some(dit)) = (vdit, target) {
                    debug!(
                        "process virtual dependency {}({}) on {}({})",
                        symbol, id, vdit.symbol, vdit.id
                    );
                    if !dit.allowed_ids.is_empty() {
                        debug!("propagate allowed ids from {} to {}", dit.symbol, symbol);
                        allowed = Some(dit.allowed_ids.clone());
                    }
                    if !dit.forbidden_ids.is_empty() {
                        debug!("propagate forbidden ids from {} to {}", dit.symbol, symbol);
                        forbidden = Some(dit.forbidden_ids.clone());
                    }
                }
            }

            let Some(target) = target else {
                if dep.source_real_id.is_some() {
                    report(
                        errors,
                        ResolutionError::MissingDependency {
                            symbol: symbol.clone(),
                            dependency: dep.sym.clone(),
                        },
                    );
                }
                continue;
            };

            if target.id == id {
                report(
                    errors,
                    ResolutionError::SelfDependency {
                        symbol: symbol.clone(),
                        dependency: dep.sym.clone(),
                        resolved: target.symbol.clone(),
                    },
                );
                continue;
            }

            if !dependency_allowed(stage, priority, target) {
                report(
                    errors,
                    ResolutionError::InvalidStage {
                        symbol: symbol.clone(),
                        dependency: dep.sym.clone(),
                    },
                );
                continue;
            }

            debug!("add dependency from {} on {}", id, target.id);
            reverse.push((target.id, CacheDependency::reverse(symbol.clone(), id)));
            dep.item = Some(target.id);
            dep.id = Some(target.id);
        }

        for (target, edge) in reverse {
            if let Some(target) = self.item_mut(target) {
                target.rdeps.push(edge);
            }
        }

        if let Some(current) = self.item_mut(id) {
            if let Some(ids) = allowed {
                current.allowed_ids = ids;
            }
            if let Some(ids) = forbidden {
                current.forbidden_ids = ids;
            }
            current.deps = deps.into_iter().filter(CacheDependency::is_resolved).collect();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
