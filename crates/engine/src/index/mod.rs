//! Secondary index definitions
//!
//! Two index kinds share one maintenance contract ([`IndexMaintenance`]):
//! - [`FilterIndex`]: exact-match and range queries over a projected value
//! - [`SearchIndex`]: tokenized full-text lookup over projected text
//!
//! [`IndexDefinition`] is the tagged variant a collection is declared with.
//! Each definition owns one secondary store named
//! `<primary>/filter/<index>` or `<primary>/search/<index>`.

pub mod filter;
pub mod posting;
pub mod search;
pub mod tokenizer;
pub mod value;

pub use filter::{FilterIndex, FilterKeys};
pub use posting::PostingList;
pub use search::SearchIndex;
pub use tokenizer::{tokenize, tokenize_str};
pub use value::{FilterValue, OrderedF64, PropertyTable, NULL_SENTINEL};

use keyspan_core::{OpOptions, Result};
use keyspan_storage::{StoreKey, StoreRegistry, StoreValue, Transaction};
use std::any::Any;
use std::sync::Arc;

/// Kind of a declared index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Exact/range filter index
    Filter,
    /// Full-text search index
    Search,
}

impl IndexKind {
    /// Path segment used in secondary store names
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Filter => "filter",
            IndexKind::Search => "search",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the secondary store for index `index` of kind `kind`
///
/// Trailing `/` on the primary name is ignored.
pub fn index_store_name(primary: &str, kind: IndexKind, index: &str) -> String {
    format!("{}/{}/{}", primary.trim_end_matches('/'), kind, index)
}

/// Maintenance contract every index kind implements
///
/// Hooks run inside the caller's transaction after the primary collection
/// changed. They never commit or abort.
pub trait IndexMaintenance<K, V>: Send + Sync {
    /// Index name, unique within one collection
    fn name(&self) -> &str;

    /// Index kind
    fn kind(&self) -> IndexKind;

    /// `key` was added with `value`
    fn on_add(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()>;

    /// `key` changed from `old` to `new`
    fn on_update(&self, tx: &mut Transaction, key: &K, old: &V, new: &V, opts: &OpOptions)
        -> Result<()>;

    /// `key` was removed; `value` is what it held
    fn on_remove(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()>;

    /// The primary collection was cleared
    fn on_clear(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<()>;
}

/// Type-erased filter index, so filters over different value types can be
/// declared together
pub trait FilterDefinition<K, V>: IndexMaintenance<K, V> {
    /// Name of the projected value type
    fn value_type(&self) -> &'static str;

    /// Bind to the secondary store, creating it if absent
    fn open(&self, registry: &StoreRegistry, primary: &str) -> Result<Arc<dyn FilterDefinition<K, V>>>;

    /// Bind to an existing secondary store
    fn load(
        &self,
        registry: &StoreRegistry,
        primary: &str,
    ) -> Result<Option<Arc<dyn FilterDefinition<K, V>>>>;

    /// Delete the secondary store; returns whether it existed
    fn remove(&self, registry: &StoreRegistry, primary: &str) -> bool;

    /// Downcast support for typed queries
    fn as_any(&self) -> &dyn Any;
}

/// A declared index: filter or search
pub enum IndexDefinition<K, V> {
    /// Filter index over some value type
    Filter(Arc<dyn FilterDefinition<K, V>>),
    /// Search index
    Search(SearchIndex<K, V>),
}

impl<K, V> Clone for IndexDefinition<K, V> {
    fn clone(&self) -> Self {
        match self {
            IndexDefinition::Filter(f) => IndexDefinition::Filter(Arc::clone(f)),
            IndexDefinition::Search(s) => IndexDefinition::Search(s.clone()),
        }
    }
}

impl<K: StoreKey, V: StoreValue> IndexDefinition<K, V> {
    /// Index name
    pub fn name(&self) -> &str {
        match self {
            IndexDefinition::Filter(f) => f.name(),
            IndexDefinition::Search(s) => s.name(),
        }
    }

    /// Index kind
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexDefinition::Filter(_) => IndexKind::Filter,
            IndexDefinition::Search(_) => IndexKind::Search,
        }
    }

    /// Name of this index's secondary store under `primary`
    pub fn store_name(&self, primary: &str) -> String {
        index_store_name(primary, self.kind(), self.name())
    }

    pub(crate) fn open(&self, registry: &StoreRegistry, primary: &str) -> Result<Self> {
        Ok(match self {
            IndexDefinition::Filter(f) => IndexDefinition::Filter(f.open(registry, primary)?),
            IndexDefinition::Search(s) => IndexDefinition::Search(s.open(registry, primary)?),
        })
    }

    pub(crate) fn load(&self, registry: &StoreRegistry, primary: &str) -> Result<Option<Self>> {
        Ok(match self {
            IndexDefinition::Filter(f) => f.load(registry, primary)?.map(IndexDefinition::Filter),
            IndexDefinition::Search(s) => s.load(registry, primary)?.map(IndexDefinition::Search),
        })
    }

    pub(crate) fn remove(&self, registry: &StoreRegistry, primary: &str) -> bool {
        match self {
            IndexDefinition::Filter(f) => f.remove(registry, primary),
            IndexDefinition::Search(s) => s.remove(registry, primary),
        }
    }
}

impl<K: StoreKey, V: StoreValue> IndexMaintenance<K, V> for IndexDefinition<K, V> {
    fn name(&self) -> &str {
        IndexDefinition::name(self)
    }

    fn kind(&self) -> IndexKind {
        IndexDefinition::kind(self)
    }

    fn on_add(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        match self {
            IndexDefinition::Filter(f) => f.on_add(tx, key, value, opts),
            IndexDefinition::Search(s) => s.on_add(tx, key, value, opts),
        }
    }

    fn on_update(
        &self,
        tx: &mut Transaction,
        key: &K,
        old: &V,
        new: &V,
        opts: &OpOptions,
    ) -> Result<()> {
        match self {
            IndexDefinition::Filter(f) => f.on_update(tx, key, old, new, opts),
            IndexDefinition::Search(s) => s.on_update(tx, key, old, new, opts),
        }
    }

    fn on_remove(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        match self {
            IndexDefinition::Filter(f) => f.on_remove(tx, key, value, opts),
            IndexDefinition::Search(s) => s.on_remove(tx, key, value, opts),
        }
    }

    fn on_clear(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<()> {
        match self {
            IndexDefinition::Filter(f) => f.on_clear(tx, opts),
            IndexDefinition::Search(s) => s.on_clear(tx, opts),
        }
    }
}

impl<K: StoreKey, V: StoreValue, F: FilterValue> From<FilterIndex<K, V, F>> for IndexDefinition<K, V> {
    fn from(index: FilterIndex<K, V, F>) -> Self {
        IndexDefinition::Filter(Arc::new(index))
    }
}

impl<K: StoreKey, V: StoreValue> From<SearchIndex<K, V>> for IndexDefinition<K, V> {
    fn from(index: SearchIndex<K, V>) -> Self {
        IndexDefinition::Search(index)
    }
}

impl<K: StoreKey, V: StoreValue> std::fmt::Debug for IndexDefinition<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexDefinition::Filter(filter) => f
                .debug_struct("Filter")
                .field("name", &filter.name())
                .field("value_type", &filter.value_type())
                .finish(),
            IndexDefinition::Search(search) => search.fmt(f),
        }
    }
}
