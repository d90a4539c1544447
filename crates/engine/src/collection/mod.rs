//! Indexed collection facade
//!
//! [`IndexedCollection`] wraps a primary [`OrderedStore`] and its declared
//! indexes. Every mutation goes to the primary first; when the primary
//! actually changed, each index's maintenance hook runs in declaration order
//! inside the same transaction. Queries go to an index for keys and, unless
//! the keys-only variant is used, through a [`KeyValueJoin`] for values.
//!
//! Every operation has a default overload using the collection's configured
//! timeout and a `_with` overload taking explicit [`OpOptions`].

pub mod join;

pub use join::{KeySource, KeyValueJoin};

use crate::index::{
    FilterDefinition, FilterIndex, FilterKeys, FilterValue, IndexDefinition, IndexKind,
    IndexMaintenance, SearchIndex,
};
use keyspan_core::{EnumerationMode, Error, LockMode, OpOptions, RangeBound, Result};
use keyspan_storage::{
    ChangeEvent, GetOrAdded, OrderedStore, RangeScan, StoreKey, StoreValue, SubscriptionId,
    Transaction, Upserted,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A primary collection kept in sync with its secondary indexes
pub struct IndexedCollection<K, V> {
    name: String,
    primary: Arc<OrderedStore<K, V>>,
    /// Declaration order; maintenance runs in this order
    indexes: Vec<IndexDefinition<K, V>>,
    filters: BTreeMap<String, Arc<dyn FilterDefinition<K, V>>>,
    searches: Vec<SearchIndex<K, V>>,
    default_timeout: Duration,
}

impl<K: StoreKey, V: StoreValue> IndexedCollection<K, V> {
    /// Compose an opened primary store with opened indexes
    ///
    /// # Errors
    ///
    /// `Construction` if two indexes share a name.
    pub fn new(
        name: impl Into<String>,
        primary: Arc<OrderedStore<K, V>>,
        indexes: Vec<IndexDefinition<K, V>>,
        default_timeout: Duration,
    ) -> Result<Self> {
        ensure_unique_names(&indexes)?;
        let mut filters = BTreeMap::new();
        let mut searches = Vec::new();
        for index in &indexes {
            match index {
                IndexDefinition::Filter(f) => {
                    filters.insert(f.name().to_string(), Arc::clone(f));
                }
                IndexDefinition::Search(s) => searches.push(s.clone()),
            }
        }
        Ok(Self {
            name: name.into(),
            primary,
            indexes,
            filters,
            searches,
            default_timeout,
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primary store
    pub fn primary(&self) -> &Arc<OrderedStore<K, V>> {
        &self.primary
    }

    /// Declared indexes in declaration order
    pub fn indexes(&self) -> &[IndexDefinition<K, V>] {
        &self.indexes
    }

    /// Options used by the default overloads
    pub fn default_options(&self) -> OpOptions {
        OpOptions::new(self.default_timeout)
    }

    /// Register `listener` for committed changes to the primary collection
    ///
    /// Index stores do not notify; each event describes a primary entry.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(u64, &ChangeEvent<K, V>) + Send + Sync + 'static,
    {
        self.primary.subscribe(listener)
    }

    /// Remove a listener registered with [`subscribe`](Self::subscribe)
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.primary.unsubscribe(id)
    }

    // === Maintenance ===

    fn on_add(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        for index in &self.indexes {
            index.on_add(tx, key, value, opts)?;
        }
        Ok(())
    }

    fn on_update(&self, tx: &mut Transaction, key: &K, old: &V, new: &V, opts: &OpOptions) -> Result<()> {
        for index in &self.indexes {
            index.on_update(tx, key, old, new, opts)?;
        }
        Ok(())
    }

    fn on_remove(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        for index in &self.indexes {
            index.on_remove(tx, key, value, opts)?;
        }
        Ok(())
    }

    // === CRUD ===

    /// Add a new entry; fails with `KeyExists` if `key` is present
    pub fn add(&self, tx: &mut Transaction, key: K, value: V) -> Result<()> {
        self.add_with(tx, key, value, &self.default_options())
    }

    /// [`add`](Self::add) with explicit options
    pub fn add_with(&self, tx: &mut Transaction, key: K, value: V, opts: &OpOptions) -> Result<()> {
        self.primary.add(tx, key.clone(), value.clone(), opts)?;
        self.on_add(tx, &key, &value, opts)
    }

    /// Add or replace an entry
    pub fn set(&self, tx: &mut Transaction, key: K, value: V) -> Result<()> {
        self.set_with(tx, key, value, &self.default_options())
    }

    /// [`set`](Self::set) with explicit options
    pub fn set_with(&self, tx: &mut Transaction, key: K, value: V, opts: &OpOptions) -> Result<()> {
        match self.primary.set(tx, key.clone(), value.clone(), opts)? {
            Some(old) => self.on_update(tx, &key, &old, &value, opts),
            None => self.on_add(tx, &key, &value, opts),
        }
    }

    /// Return the present value, or add `value`
    pub fn get_or_add(&self, tx: &mut Transaction, key: K, value: V) -> Result<V> {
        self.get_or_add_with(tx, key, value, &self.default_options())
    }

    /// [`get_or_add`](Self::get_or_add) with explicit options
    pub fn get_or_add_with(&self, tx: &mut Transaction, key: K, value: V, opts: &OpOptions) -> Result<V> {
        self.get_or_add_by_with(tx, key, move |_| value, opts)
    }

    /// Return the present value, or add the one produced by `factory`
    pub fn get_or_add_by<A>(&self, tx: &mut Transaction, key: K, factory: A) -> Result<V>
    where
        A: FnOnce(&K) -> V,
    {
        self.get_or_add_by_with(tx, key, factory, &self.default_options())
    }

    /// [`get_or_add_by`](Self::get_or_add_by) with explicit options
    pub fn get_or_add_by_with<A>(&self, tx: &mut Transaction, key: K, factory: A, opts: &OpOptions) -> Result<V>
    where
        A: FnOnce(&K) -> V,
    {
        match self.primary.get_or_add(tx, key.clone(), factory, opts)? {
            GetOrAdded::Existing(value) => Ok(value),
            GetOrAdded::Added(value) => {
                self.on_add(tx, &key, &value, opts)?;
                Ok(value)
            }
        }
    }

    /// Add `add_value` when absent, otherwise replace via `update`
    ///
    /// Returns the value now stored.
    pub fn add_or_update<U>(&self, tx: &mut Transaction, key: K, add_value: V, update: U) -> Result<V>
    where
        U: FnOnce(&K, &V) -> V,
    {
        self.add_or_update_with(tx, key, add_value, update, &self.default_options())
    }

    /// [`add_or_update`](Self::add_or_update) with explicit options
    pub fn add_or_update_with<U>(
        &self,
        tx: &mut Transaction,
        key: K,
        add_value: V,
        update: U,
        opts: &OpOptions,
    ) -> Result<V>
    where
        U: FnOnce(&K, &V) -> V,
    {
        self.add_or_update_by_with(tx, key, move |_| add_value, update, opts)
    }

    /// Add the value produced by `add` when absent, otherwise replace via `update`
    pub fn add_or_update_by<A, U>(&self, tx: &mut Transaction, key: K, add: A, update: U) -> Result<V>
    where
        A: FnOnce(&K) -> V,
        U: FnOnce(&K, &V) -> V,
    {
        self.add_or_update_by_with(tx, key, add, update, &self.default_options())
    }

    /// [`add_or_update_by`](Self::add_or_update_by) with explicit options
    pub fn add_or_update_by_with<A, U>(
        &self,
        tx: &mut Transaction,
        key: K,
        add: A,
        update: U,
        opts: &OpOptions,
    ) -> Result<V>
    where
        A: FnOnce(&K) -> V,
        U: FnOnce(&K, &V) -> V,
    {
        let outcome = self.primary.add_or_update(tx, key.clone(), add, update, opts)?;
        match &outcome {
            Upserted::Added(value) => self.on_add(tx, &key, value, opts)?,
            Upserted::Updated { old, new } => self.on_update(tx, &key, old, new, opts)?,
        }
        Ok(outcome.into_value())
    }

    /// Add a new entry; returns false when `key` is present
    pub fn try_add(&self, tx: &mut Transaction, key: K, value: V) -> Result<bool> {
        self.try_add_with(tx, key, value, &self.default_options())
    }

    /// [`try_add`](Self::try_add) with explicit options
    pub fn try_add_with(&self, tx: &mut Transaction, key: K, value: V, opts: &OpOptions) -> Result<bool> {
        if !self.primary.try_add(tx, key.clone(), value.clone(), opts)? {
            return Ok(false);
        }
        self.on_add(tx, &key, &value, opts)?;
        Ok(true)
    }

    /// Remove an entry, returning its value
    pub fn try_remove(&self, tx: &mut Transaction, key: &K) -> Result<Option<V>> {
        self.try_remove_with(tx, key, &self.default_options())
    }

    /// [`try_remove`](Self::try_remove) with explicit options
    pub fn try_remove_with(&self, tx: &mut Transaction, key: &K, opts: &OpOptions) -> Result<Option<V>> {
        let removed = self.primary.try_remove(tx, key, opts)?;
        if let Some(value) = &removed {
            self.on_remove(tx, key, value, opts)?;
        }
        Ok(removed)
    }

    /// Remove every entry from the primary and every index
    pub fn clear(&self, tx: &mut Transaction) -> Result<()> {
        self.clear_with(tx, &self.default_options())
    }

    /// [`clear`](Self::clear) with explicit options
    pub fn clear_with(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<()> {
        self.primary.clear(tx, opts)?;
        for index in &self.indexes {
            index.on_clear(tx, opts)?;
        }
        debug!(target: "keyspan::collection", collection = %self.name, txn_id = tx.id(), "clear");
        Ok(())
    }

    // === Primary reads ===

    /// Point read under `LockMode::Default`
    pub fn try_get(&self, tx: &mut Transaction, key: &K) -> Result<Option<V>> {
        self.try_get_with(tx, key, LockMode::Default, &self.default_options())
    }

    /// Point read with a lock hint
    pub fn try_get_with_lock(&self, tx: &mut Transaction, key: &K, mode: LockMode) -> Result<Option<V>> {
        self.try_get_with(tx, key, mode, &self.default_options())
    }

    /// Point read with a lock hint and explicit options
    pub fn try_get_with(&self, tx: &mut Transaction, key: &K, mode: LockMode, opts: &OpOptions) -> Result<Option<V>> {
        self.primary.get(tx, key, mode, opts)
    }

    /// Check whether `key` is present
    pub fn contains_key(&self, tx: &mut Transaction, key: &K) -> Result<bool> {
        self.contains_key_with(tx, key, LockMode::Default, &self.default_options())
    }

    /// [`contains_key`](Self::contains_key) with a lock hint and explicit options
    pub fn contains_key_with(&self, tx: &mut Transaction, key: &K, mode: LockMode, opts: &OpOptions) -> Result<bool> {
        self.primary.contains_key(tx, key, mode, opts)
    }

    /// Number of entries visible to `tx`
    pub fn count(&self, tx: &mut Transaction) -> Result<usize> {
        self.count_with(tx, &self.default_options())
    }

    /// [`count`](Self::count) with explicit options
    pub fn count_with(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<usize> {
        self.primary.count(tx, opts)
    }

    /// All primary keys
    pub fn keys(&self, tx: &mut Transaction, mode: EnumerationMode) -> Result<Vec<K>> {
        self.keys_with(tx, mode, &self.default_options())
    }

    /// [`keys`](Self::keys) with explicit options
    pub fn keys_with(&self, tx: &mut Transaction, mode: EnumerationMode, opts: &OpOptions) -> Result<Vec<K>> {
        self.primary.keys(tx, mode, opts)
    }

    /// All primary entries
    pub fn entries(&self, tx: &mut Transaction, mode: EnumerationMode) -> Result<RangeScan<K, V>> {
        self.entries_with(tx, mode, &self.default_options())
    }

    /// [`entries`](Self::entries) with explicit options
    pub fn entries_with(&self, tx: &mut Transaction, mode: EnumerationMode, opts: &OpOptions) -> Result<RangeScan<K, V>> {
        self.primary.range_scan(tx, .., mode, LockMode::Default, opts)
    }

    // === Index lookup ===

    /// The filter index `name` with value type `F`
    ///
    /// # Errors
    ///
    /// - `IndexNotFound` if no index is named `name`
    /// - `IndexTypeMismatch` if it is a search index or filters another type
    pub fn filter_index<F: FilterValue>(&self, name: &str) -> Result<&FilterIndex<K, V, F>> {
        let requested = format!("{} over {}", IndexKind::Filter, F::type_name());
        match self.filters.get(name) {
            Some(index) => index
                .as_any()
                .downcast_ref::<FilterIndex<K, V, F>>()
                .ok_or_else(|| Error::IndexTypeMismatch {
                    name: name.to_string(),
                    declared: format!("{} over {}", IndexKind::Filter, index.value_type()),
                    requested,
                }),
            None if self.searches.iter().any(|s| s.name() == name) => Err(Error::IndexTypeMismatch {
                name: name.to_string(),
                declared: IndexKind::Search.to_string(),
                requested,
            }),
            None => Err(Error::IndexNotFound {
                name: name.to_string(),
            }),
        }
    }

    fn join<'a>(&self, tx: &'a mut Transaction, keys: KeySource<K>, opts: &OpOptions) -> KeyValueJoin<'a, K, V> {
        KeyValueJoin::new(Arc::clone(&self.primary), keys, tx, opts.clone())
    }

    // === Filter queries ===

    /// Entries whose `index` projection equals `value`, in key order
    pub fn filter<'a, F: FilterValue>(&self, tx: &'a mut Transaction, index: &str, value: F) -> Result<KeyValueJoin<'a, K, V>> {
        self.filter_with(tx, index, value, &self.default_options())
    }

    /// [`filter`](Self::filter) with explicit options
    pub fn filter_with<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        value: F,
        opts: &OpOptions,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        let keys = self.filter_keys_with(tx, index, value, opts)?;
        Ok(self.join(tx, Box::new(keys.into_iter().map(Ok)), opts))
    }

    /// Keys whose `index` projection equals `value`, in key order
    pub fn filter_keys<F: FilterValue>(&self, tx: &mut Transaction, index: &str, value: F) -> Result<Vec<K>> {
        self.filter_keys_with(tx, index, value, &self.default_options())
    }

    /// [`filter_keys`](Self::filter_keys) with explicit options
    pub fn filter_keys_with<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        value: F,
        opts: &OpOptions,
    ) -> Result<Vec<K>> {
        trace!(target: "keyspan::collection", collection = %self.name, index, "filter");
        self.filter_index::<F>(index)?.filter(tx, value, opts)
    }

    /// Entries whose `index` projection lies between `start` and `end`
    ///
    /// Ordered by filter value, then key.
    pub fn range_filter<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        end: F,
        end_bound: RangeBound,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        self.range_filter_with(tx, index, start, start_bound, end, end_bound, &self.default_options())
    }

    /// [`range_filter`](Self::range_filter) with explicit options
    #[allow(clippy::too_many_arguments)]
    pub fn range_filter_with<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        let keys = self.range_filter_keys_with(tx, index, start, start_bound, end, end_bound, opts)?;
        Ok(self.join(tx, Box::new(keys), opts))
    }

    /// Keys whose `index` projection lies between `start` and `end`
    pub fn range_filter_keys<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        end: F,
        end_bound: RangeBound,
    ) -> Result<FilterKeys<F, K>> {
        self.range_filter_keys_with(tx, index, start, start_bound, end, end_bound, &self.default_options())
    }

    /// [`range_filter_keys`](Self::range_filter_keys) with explicit options
    #[allow(clippy::too_many_arguments)]
    pub fn range_filter_keys_with<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        trace!(target: "keyspan::collection", collection = %self.name, index, "range filter");
        self.filter_index::<F>(index)?
            .range_filter(tx, start, start_bound, end, end_bound, opts)
    }

    /// Entries whose `index` projection is above `start`
    pub fn range_from_filter<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        self.range_from_filter_with(tx, index, start, start_bound, &self.default_options())
    }

    /// [`range_from_filter`](Self::range_from_filter) with explicit options
    pub fn range_from_filter_with<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        let keys = self.range_from_filter_keys_with(tx, index, start, start_bound, opts)?;
        Ok(self.join(tx, Box::new(keys), opts))
    }

    /// Keys whose `index` projection is above `start`
    pub fn range_from_filter_keys<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
    ) -> Result<FilterKeys<F, K>> {
        self.range_from_filter_keys_with(tx, index, start, start_bound, &self.default_options())
    }

    /// [`range_from_filter_keys`](Self::range_from_filter_keys) with explicit options
    pub fn range_from_filter_keys_with<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        start: F,
        start_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        self.filter_index::<F>(index)?.range_from(tx, start, start_bound, opts)
    }

    /// Entries whose `index` projection is below `end`
    pub fn range_to_filter<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        end: F,
        end_bound: RangeBound,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        self.range_to_filter_with(tx, index, end, end_bound, &self.default_options())
    }

    /// [`range_to_filter`](Self::range_to_filter) with explicit options
    pub fn range_to_filter_with<'a, F: FilterValue>(
        &self,
        tx: &'a mut Transaction,
        index: &str,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        let keys = self.range_to_filter_keys_with(tx, index, end, end_bound, opts)?;
        Ok(self.join(tx, Box::new(keys), opts))
    }

    /// Keys whose `index` projection is below `end`
    pub fn range_to_filter_keys<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        end: F,
        end_bound: RangeBound,
    ) -> Result<FilterKeys<F, K>> {
        self.range_to_filter_keys_with(tx, index, end, end_bound, &self.default_options())
    }

    /// [`range_to_filter_keys`](Self::range_to_filter_keys) with explicit options
    pub fn range_to_filter_keys_with<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        self.filter_index::<F>(index)?.range_to(tx, end, end_bound, opts)
    }

    /// Distinct values currently present in filter index `index`
    pub fn enumerate_index_values<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        mode: EnumerationMode,
    ) -> Result<Vec<F>> {
        self.enumerate_index_values_with(tx, index, mode, &self.default_options())
    }

    /// [`enumerate_index_values`](Self::enumerate_index_values) with explicit options
    pub fn enumerate_index_values_with<F: FilterValue>(
        &self,
        tx: &mut Transaction,
        index: &str,
        mode: EnumerationMode,
        opts: &OpOptions,
    ) -> Result<Vec<F>> {
        self.filter_index::<F>(index)?.distinct_values(tx, mode, opts)
    }

    // === Search queries ===

    /// Entries matching any word of `text` in any search index
    pub fn search<'a>(&self, tx: &'a mut Transaction, text: &str) -> Result<KeyValueJoin<'a, K, V>> {
        self.search_with(tx, text, usize::MAX, &self.default_options())
    }

    /// [`search`](Self::search) returning at most `limit` entries
    pub fn search_limit<'a>(&self, tx: &'a mut Transaction, text: &str, limit: usize) -> Result<KeyValueJoin<'a, K, V>> {
        self.search_with(tx, text, limit, &self.default_options())
    }

    /// [`search_limit`](Self::search_limit) with explicit options
    pub fn search_with<'a>(
        &self,
        tx: &'a mut Transaction,
        text: &str,
        limit: usize,
        opts: &OpOptions,
    ) -> Result<KeyValueJoin<'a, K, V>> {
        let keys = self.search_keys_with(tx, text, limit, opts)?;
        Ok(self.join(tx, Box::new(keys.into_iter().map(Ok)), opts))
    }

    /// Keys matching any word of `text`, at most `limit`, in no particular order
    pub fn search_keys(&self, tx: &mut Transaction, text: &str, limit: usize) -> Result<Vec<K>> {
        self.search_keys_with(tx, text, limit, &self.default_options())
    }

    /// [`search_keys`](Self::search_keys) with explicit options
    ///
    /// # Errors
    ///
    /// `Unsupported` if the collection declares no search index.
    pub fn search_keys_with(&self, tx: &mut Transaction, text: &str, limit: usize, opts: &OpOptions) -> Result<Vec<K>> {
        if self.searches.is_empty() {
            return Err(Error::unsupported(format!(
                "collection '{}' has no search index",
                self.name
            )));
        }
        let mut found = BTreeSet::new();
        for index in &self.searches {
            if found.len() >= limit {
                break;
            }
            index.search_into(tx, text, limit, &mut found, opts)?;
        }
        trace!(target: "keyspan::collection", collection = %self.name, hits = found.len(), "search");
        Ok(found.into_iter().collect())
    }

    /// Join arbitrary keys against the primary, skipping absent ones
    pub fn get_all<'a, I>(&self, tx: &'a mut Transaction, keys: I) -> KeyValueJoin<'a, K, V>
    where
        I: IntoIterator<Item = K>,
        I::IntoIter: Send + 'static,
    {
        self.get_all_with(tx, keys, &self.default_options())
    }

    /// [`get_all`](Self::get_all) with explicit options
    pub fn get_all_with<'a, I>(&self, tx: &'a mut Transaction, keys: I, opts: &OpOptions) -> KeyValueJoin<'a, K, V>
    where
        I: IntoIterator<Item = K>,
        I::IntoIter: Send + 'static,
    {
        self.join(tx, Box::new(keys.into_iter().map(Ok)), opts)
    }
}

impl<K: StoreKey, V: StoreValue + PartialEq> IndexedCollection<K, V> {
    /// Replace the value of `key` only if it currently equals `comparison`
    ///
    /// The current value is read under `LockMode::Update`, so a concurrent
    /// writer of `key` aborts one of the two commits.
    pub fn try_update(&self, tx: &mut Transaction, key: K, new_value: V, comparison: &V) -> Result<bool> {
        self.try_update_with(tx, key, new_value, comparison, &self.default_options())
    }

    /// [`try_update`](Self::try_update) with explicit options
    pub fn try_update_with(
        &self,
        tx: &mut Transaction,
        key: K,
        new_value: V,
        comparison: &V,
        opts: &OpOptions,
    ) -> Result<bool> {
        let Some(old) = self.primary.get(tx, &key, LockMode::Update, opts)? else {
            return Ok(false);
        };
        if !self
            .primary
            .try_update(tx, key.clone(), new_value.clone(), comparison, opts)?
        {
            return Ok(false);
        }
        self.on_update(tx, &key, &old, &new_value, opts)?;
        Ok(true)
    }
}

impl<K: StoreKey, V: StoreValue> std::fmt::Debug for IndexedCollection<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedCollection")
            .field("name", &self.name)
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("searches", &self.searches.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Reject declarations that reuse an index name
pub(crate) fn ensure_unique_names<K: StoreKey, V: StoreValue>(indexes: &[IndexDefinition<K, V>]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for index in indexes {
        if !seen.insert(index.name()) {
            return Err(Error::construction(format!(
                "duplicate index name '{}'",
                index.name()
            )));
        }
    }
    Ok(())
}
