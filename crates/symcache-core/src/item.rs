//! # Item Model
//!
//! Nodes of the symbol graph. A [`CacheItem`] is either real (owns its check,
//! conditions and statistics) or virtual (an alias that delegates to a real
//! parent). Both kinds live in the same arena and are addressed by [`ItemId`].

use crate::registry::Symcache;
use crate::stats::ItemStats;
use crate::types::{ConditionRef, ItemId, SymbolFlags, SymcacheError};
use std::collections::BTreeSet;

// =============================================================================
// IDENTIFIER LISTS
// =============================================================================

/// Sorted set of settings identifiers allowed or forbidden for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList {
    ids: BTreeSet<u32>,
}

impl IdList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of the list.
    pub fn set_ids(&mut self, ids: impl IntoIterator<Item = u32>) {
        self.ids = ids.into_iter().collect();
    }

    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Identifiers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<u32> for IdList {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// DEPENDENCY EDGES
// =============================================================================

/// A dependency edge, forward (in `deps`) or reverse (in `rdeps`).
///
/// Exactly one of `source_real_id` / `source_virtual_id` is set. `item` stays
/// `None` until the resolver accepts the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDependency {
    /// Resolved item on the other end of the edge.
    pub item: Option<ItemId>,
    /// Numeric id of the resolved item.
    pub id: Option<ItemId>,
    /// Symbol name as declared.
    pub sym: String,
    pub source_real_id: Option<ItemId>,
    pub source_virtual_id: Option<ItemId>,
}

impl CacheDependency {
    /// Unresolved edge declared by a real item.
    #[must_use]
    pub fn from_real(sym: impl Into<String>, source: ItemId) -> Self {
        Self {
            item: None,
            id: None,
            sym: sym.into(),
            source_real_id: Some(source),
            source_virtual_id: None,
        }
    }

    /// Unresolved edge declared through a virtual alias.
    #[must_use]
    pub fn from_virtual(sym: impl Into<String>, source: ItemId) -> Self {
        Self {
            item: None,
            id: None,
            sym: sym.into(),
            source_real_id: None,
            source_virtual_id: Some(source),
        }
    }

    /// Reverse edge pointing back at a dependent item.
    #[must_use]
    pub fn reverse(sym: impl Into<String>, dependent: ItemId) -> Self {
        Self {
            item: Some(dependent),
            id: Some(dependent),
            sym: sym.into(),
            source_real_id: Some(dependent),
            source_virtual_id: None,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.item.is_some()
    }
}

// =============================================================================
// ITEM
// =============================================================================

/// Kind-specific part of an item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Real {
        conditions: Vec<ConditionRef>,
    },
    Virtual {
        /// Direct parent reference, cached once the parent name resolves.
        parent: Option<ItemId>,
        /// Parent index known at registration time.
        parent_id: Option<ItemId>,
        /// Parent name as declared.
        parent_symbol: Option<String>,
    },
}

/// A registered symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    pub id: ItemId,
    pub symbol: String,
    pub flags: SymbolFlags,
    pub priority: i32,
    pub stats: ItemStats,
    pub deps: Vec<CacheDependency>,
    pub rdeps: Vec<CacheDependency>,
    pub allowed_ids: IdList,
    pub forbidden_ids: IdList,
    pub kind: ItemKind,
}

impl CacheItem {
    /// Create a real item.
    #[must_use]
    pub fn new_real(id: ItemId, symbol: String, flags: SymbolFlags, priority: i32) -> Self {
        Self {
            id,
            symbol,
            flags: flags - SymbolFlags::VIRTUAL,
            priority,
            stats: ItemStats::default(),
            deps: Vec::new(),
            rdeps: Vec::new(),
            allowed_ids: IdList::new(),
            forbidden_ids: IdList::new(),
            kind: ItemKind::Real {
                conditions: Vec::new(),
            },
        }
    }

    /// Create a virtual item. `parent_id` may be unknown until `init`.
    #[must_use]
    pub fn new_virtual(
        id: ItemId,
        symbol: String,
        flags: SymbolFlags,
        priority: i32,
        parent_id: Option<ItemId>,
        parent_symbol: Option<String>,
    ) -> Self {
        Self {
            id,
            symbol,
            flags: flags | SymbolFlags::VIRTUAL,
            priority,
            stats: ItemStats::default(),
            deps: Vec::new(),
            rdeps: Vec::new(),
            allowed_ids: IdList::new(),
            forbidden_ids: IdList::new(),
            kind: ItemKind::Virtual {
                parent: None,
                parent_id,
                parent_symbol,
            },
        }
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, ItemKind::Virtual { .. })
    }

    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.flags.contains(SymbolFlags::GHOST)
    }

    /// Whether the item's own flags place it in the main filter stage.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        !self.flags.intersects(SymbolFlags::NON_FILTER)
    }

    /// Resolve the real parent of a virtual item.
    ///
    /// The cached direct reference wins; otherwise the registration-time
    /// `parent_id` is looked up in the registry. Real items have no parent.
    #[must_use]
    pub fn get_parent<'a>(&self, cache: &'a Symcache) -> Option<&'a CacheItem> {
        match &self.kind {
            ItemKind::Real { .. } => None,
            ItemKind::Virtual {
                parent, parent_id, ..
            } => {
                let id = parent.or(*parent_id)?;
                cache
                    .get_item_by_id(id, false)
                    .filter(|parent| !parent.is_virtual())
            }
        }
    }

    /// Flags deciding the item's stage: a virtual item runs with its parent.
    #[must_use]
    pub fn stage_flags(&self, cache: &Symcache) -> SymbolFlags {
        match self.get_parent(cache) {
            Some(parent) => parent.flags,
            None => self.flags,
        }
    }

    /// Attach a condition callback. Only real items accept conditions.
    pub fn add_condition(&mut self, condition: ConditionRef) -> Result<(), SymcacheError> {
        match &mut self.kind {
            ItemKind::Real { conditions } => {
                conditions.push(condition);
                Ok(())
            }
            ItemKind::Virtual { .. } => Err(SymcacheError::ConditionOnVirtual(self.symbol.clone())),
        }
    }

    /// Condition handles attached to this item.
    #[must_use]
    pub fn conditions(&self) -> &[ConditionRef] {
        match &self.kind {
            ItemKind::Real { conditions } => conditions,
            ItemKind::Virtual { .. } => &[],
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
