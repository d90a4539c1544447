//! Filter index: exact-match and range queries over one projected value
//!
//! The secondary store maps each distinct filter value to the posting list
//! of primary keys projecting to it. Every key in the primary collection
//! appears in exactly one posting list.

use super::posting::{add_posting, remove_posting, PostingList, PostingStore};
use super::value::{FilterValue, PropertyTable};
use super::{index_store_name, FilterDefinition, IndexKind, IndexMaintenance};
use keyspan_core::{
    CancellationToken, EnumerationMode, Error, LockMode, OpOptions, RangeBound, Result,
};
use keyspan_storage::{RangeScan, StoreKey, StoreRegistry, StoreValue, Transaction};
use std::any::Any;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

type Projection<K, V, F> = Arc<dyn Fn(&K, &V) -> F + Send + Sync>;

/// Exact-match and range index over a projected value `F`
pub struct FilterIndex<K, V, F> {
    name: String,
    projection: Projection<K, V, F>,
    null_substitution: bool,
    store: Option<Arc<PostingStore<F, K>>>,
}

impl<K, V, F> Clone for FilterIndex<K, V, F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            projection: Arc::clone(&self.projection),
            null_substitution: self.null_substitution,
            store: self.store.clone(),
        }
    }
}

impl<K: StoreKey, V: StoreValue, F: FilterValue> FilterIndex<K, V, F> {
    /// Define an index named `name` over `projection`
    ///
    /// The projection must be pure: the same key and value always project to
    /// the same filter value.
    ///
    /// # Errors
    ///
    /// `Construction` if `name` is empty.
    pub fn new<P>(name: impl Into<String>, projection: P) -> Result<Self>
    where
        P: Fn(&K, &V) -> F + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::construction("index name must not be empty"));
        }
        Ok(Self {
            name,
            projection: Arc::new(projection),
            null_substitution: false,
            store: None,
        })
    }

    /// Define an index over the value property `property`, named after it
    ///
    /// # Errors
    ///
    /// `Construction` if `V` has no property `property` of type `F`.
    pub fn for_property(property: &str) -> Result<Self>
    where
        V: PropertyTable<F>,
    {
        let accessor = V::property(property).ok_or_else(|| {
            Error::construction(format!(
                "value type {} has no property '{}' of type {}",
                std::any::type_name::<V>(),
                property,
                F::type_name()
            ))
        })?;
        Self::new(property, move |_: &K, value: &V| accessor(value))
    }

    /// Substitute the null sentinel for null projections and queries
    ///
    /// Only nullable textual value types have a sentinel; for other types
    /// this has no effect.
    pub fn with_null_substitution(mut self, enabled: bool) -> Self {
        self.null_substitution = enabled;
        self
    }

    /// Whether null substitution is enabled
    pub fn null_substitution(&self) -> bool {
        self.null_substitution
    }

    /// Project a key and value to the stored filter value
    pub fn project(&self, key: &K, value: &V) -> F {
        self.substitute((self.projection)(key, value))
    }

    fn substitute(&self, value: F) -> F {
        if self.null_substitution && value.is_null() {
            if let Some(sentinel) = F::null_sentinel() {
                return sentinel;
            }
        }
        value
    }

    fn store(&self) -> Result<&Arc<PostingStore<F, K>>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::unsupported(format!("filter index '{}' is not open", self.name)))
    }

    fn bound(&self, store: Arc<PostingStore<F, K>>) -> Self {
        let mut bound = self.clone();
        bound.store = Some(store);
        bound
    }

    // === Queries ===

    /// Keys whose projection equals `value`, sorted by key
    ///
    /// Returns an empty list when nothing matches.
    pub fn filter(&self, tx: &mut Transaction, value: F, opts: &OpOptions) -> Result<Vec<K>> {
        let value = self.substitute(value);
        let list = self.store()?.get(tx, &value, LockMode::Default, opts)?;
        Ok(list.map(PostingList::into_keys).unwrap_or_default())
    }

    /// Keys whose projection lies between `start` and `end`
    ///
    /// Keys are yielded grouped by ascending filter value, each group in key
    /// order. Bounds are compared as given: null substitution applies to
    /// stored values and exact queries, never to range endpoints, so a `None`
    /// bound sorts below the sentinel.
    pub fn range_filter(
        &self,
        tx: &mut Transaction,
        start: F,
        start_bound: RangeBound,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        let range = (
            start_bound.to_bound(start),
            end_bound.to_bound(end),
        );
        self.scan(tx, range, opts)
    }

    /// Keys whose projection is above `start`
    pub fn range_from(
        &self,
        tx: &mut Transaction,
        start: F,
        start_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        let range = (start_bound.to_bound(start), Bound::Unbounded);
        self.scan(tx, range, opts)
    }

    /// Keys whose projection is below `end`
    pub fn range_to(
        &self,
        tx: &mut Transaction,
        end: F,
        end_bound: RangeBound,
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        let range = (Bound::Unbounded, end_bound.to_bound(end));
        self.scan(tx, range, opts)
    }

    fn scan(
        &self,
        tx: &mut Transaction,
        range: (Bound<F>, Bound<F>),
        opts: &OpOptions,
    ) -> Result<FilterKeys<F, K>> {
        let postings = self.store()?.range_scan(
            tx,
            range,
            EnumerationMode::Ordered,
            LockMode::Default,
            opts,
        )?;
        Ok(FilterKeys::new(postings, opts.cancel.clone()))
    }

    /// Distinct filter values currently present
    pub fn distinct_values(
        &self,
        tx: &mut Transaction,
        mode: EnumerationMode,
        opts: &OpOptions,
    ) -> Result<Vec<F>> {
        self.store()?.keys(tx, mode, opts)
    }
}

impl<K: StoreKey, V: StoreValue, F: FilterValue> IndexMaintenance<K, V> for FilterIndex<K, V, F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Filter
    }

    fn on_add(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        let filter = self.project(key, value);
        debug!(target: "keyspan::index", index = %self.name, ?key, ?filter, "add posting");
        add_posting(self.store()?, tx, filter, key, opts)
    }

    fn on_update(
        &self,
        tx: &mut Transaction,
        key: &K,
        old: &V,
        new: &V,
        opts: &OpOptions,
    ) -> Result<()> {
        let old_filter = self.project(key, old);
        let new_filter = self.project(key, new);
        if old_filter == new_filter {
            return Ok(());
        }
        let store = self.store()?;
        debug!(target: "keyspan::index", index = %self.name, ?key, ?old_filter, ?new_filter, "move posting");
        remove_posting(store, tx, &self.name, old_filter, key, opts)?;
        add_posting(store, tx, new_filter, key, opts)
    }

    fn on_remove(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        let filter = self.project(key, value);
        debug!(target: "keyspan::index", index = %self.name, ?key, ?filter, "remove posting");
        remove_posting(self.store()?, tx, &self.name, filter, key, opts)
    }

    fn on_clear(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<()> {
        self.store()?.clear(tx, opts)
    }
}

impl<K: StoreKey, V: StoreValue, F: FilterValue> FilterDefinition<K, V> for FilterIndex<K, V, F> {
    fn value_type(&self) -> &'static str {
        F::type_name()
    }

    fn open(&self, registry: &StoreRegistry, primary: &str) -> Result<Arc<dyn FilterDefinition<K, V>>> {
        let name = index_store_name(primary, IndexKind::Filter, &self.name);
        let store = registry.open_or_create::<F, PostingList<K>>(&name)?;
        Ok(Arc::new(self.bound(store)))
    }

    fn load(
        &self,
        registry: &StoreRegistry,
        primary: &str,
    ) -> Result<Option<Arc<dyn FilterDefinition<K, V>>>> {
        let name = index_store_name(primary, IndexKind::Filter, &self.name);
        Ok(registry
            .open_existing::<F, PostingList<K>>(&name)?
            .map(|store| Arc::new(self.bound(store)) as Arc<dyn FilterDefinition<K, V>>))
    }

    fn remove(&self, registry: &StoreRegistry, primary: &str) -> bool {
        registry.remove(&index_store_name(primary, IndexKind::Filter, &self.name))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<K, V, F> std::fmt::Debug for FilterIndex<K, V, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterIndex")
            .field("name", &self.name)
            .field("value_type", &std::any::type_name::<F>())
            .field("null_substitution", &self.null_substitution)
            .field("open", &self.store.is_some())
            .finish()
    }
}

/// Lazy key sequence produced by filter range queries
///
/// Flattens posting lists in filter-value order. The postings in range are
/// collected under the index store's read lock when the query is issued,
/// so memory grows with the number of matching filter values. Cancellation
/// is checked before every key; after an error the sequence is exhausted.
pub struct FilterKeys<F, K> {
    postings: RangeScan<F, PostingList<K>>,
    current: std::vec::IntoIter<K>,
    cancel: CancellationToken,
    done: bool,
}

impl<F, K> FilterKeys<F, K> {
    fn new(postings: RangeScan<F, PostingList<K>>, cancel: CancellationToken) -> Self {
        Self {
            postings,
            current: Vec::new().into_iter(),
            cancel,
            done: false,
        }
    }
}

impl<F, K: Ord> Iterator for FilterKeys<F, K> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Err(e) = self.cancel.check() {
                self.done = true;
                return Some(Err(e));
            }
            if let Some(key) = self.current.next() {
                return Some(Ok(key));
            }
            match self.postings.next() {
                Some(Ok((_, list))) => self.current = list.into_keys().into_iter(),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl<F, K> std::fmt::Debug for FilterKeys<F, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterKeys")
            .field("remaining_values", &self.postings.remaining())
            .field("done", &self.done)
            .finish()
    }
}
