//! Ordered transactional key-value store
//!
//! `OrderedStore<K, V>` holds the committed state of one named collection in
//! a `BTreeMap` under a `parking_lot::RwLock`. Every operation is scoped to a
//! caller-supplied [`Transaction`]: writes are buffered in the transaction and
//! applied by the commit protocol, reads see the transaction's own writes first.
//!
//! ## Lock modes
//!
//! - `LockMode::Default` reads are read-committed and are not validated.
//! - `LockMode::Update` reads, and the read performed by every conditional
//!   mutation, record the observed version in the transaction's read set.
//!   Commit fails if any of those versions changed (first-committer-wins).
//!
//! ## Timeouts
//!
//! Store locks are acquired with `try_read_for`, bounded by the operation's
//! deadline. Cancellation is checked before any lock is taken.

use crate::events::{ChangeEvent, ChangeListeners, Notification, SubscriptionId};
use crate::scan::RangeScan;
use crate::transaction::Transaction;
use keyspan_core::{Deadline, EnumerationMode, Error, LockMode, OpOptions, Result};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Unique identifier of one store instance
pub type StoreId = u64;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Bounds required of store keys
pub trait StoreKey: Ord + Clone + Debug + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Ord + Clone + Debug + Send + Sync + 'static {}

/// Bounds required of store values
pub trait StoreValue: Clone + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Send + Sync + 'static {}

/// A committed value and the commit version that wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<V> {
    /// Stored value
    pub value: V,
    /// Commit version (always > 0)
    pub version: u64,
}

/// Outcome of [`OrderedStore::add_or_update`]
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted<V> {
    /// Key was absent; `add` produced this value
    Added(V),
    /// Key was present; `update` replaced `old` with `new`
    Updated {
        /// Previous value
        old: V,
        /// Value now stored
        new: V,
    },
}

impl<V> Upserted<V> {
    /// The value now stored
    pub fn value(&self) -> &V {
        match self {
            Upserted::Added(v) => v,
            Upserted::Updated { new, .. } => new,
        }
    }

    /// Consume, returning the value now stored
    pub fn into_value(self) -> V {
        match self {
            Upserted::Added(v) => v,
            Upserted::Updated { new, .. } => new,
        }
    }
}

/// Outcome of [`OrderedStore::get_or_add`]
#[derive(Debug, Clone, PartialEq)]
pub enum GetOrAdded<V> {
    /// Key was present with this value
    Existing(V),
    /// Key was absent; this value was added
    Added(V),
}

impl<V> GetOrAdded<V> {
    /// Consume, returning the value now stored
    pub fn into_value(self) -> V {
        match self {
            GetOrAdded::Existing(v) | GetOrAdded::Added(v) => v,
        }
    }
}

type Entries<K, V> = BTreeMap<K, Versioned<V>>;

/// Ordered transactional key-value store
pub struct OrderedStore<K, V> {
    id: StoreId,
    name: String,
    entries: RwLock<Entries<K, V>>,
    listeners: Arc<ChangeListeners<K, V>>,
}

impl<K: StoreKey, V: StoreValue> OrderedStore<K, V> {
    /// Create an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            listeners: Arc::new(ChangeListeners::new()),
        }
    }

    /// Unique id of this instance
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Registry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of committed entries, ignoring any open transaction
    pub fn committed_len(&self) -> usize {
        self.entries.read().len()
    }

    /// Register `listener` for every change this store commits
    ///
    /// The listener receives the commit version and one event per changed
    /// key, after the commit is applied. It runs on the committing thread.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(u64, &ChangeEvent<K, V>) + Send + Sync + 'static,
    {
        let id = self.listeners.subscribe(Arc::new(listener));
        trace!(target: "keyspan::store", store = %self.name, subscription = id, "subscribe");
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // === Read Operations ===

    /// Get a value
    ///
    /// With `LockMode::Update` the observed version is validated at commit.
    pub fn get(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: &K,
        mode: LockMode,
        opts: &OpOptions,
    ) -> Result<Option<V>> {
        let deadline = self.begin_op(tx, opts, "get")?;
        self.lookup(tx, key, mode == LockMode::Update, &deadline)
    }

    /// Check whether a key is present
    pub fn contains_key(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: &K,
        mode: LockMode,
        opts: &OpOptions,
    ) -> Result<bool> {
        Ok(self.get(tx, key, mode, opts)?.is_some())
    }

    /// Number of entries visible to `tx`
    pub fn count(self: &Arc<Self>, tx: &mut Transaction, opts: &OpOptions) -> Result<usize> {
        let deadline = self.begin_op(tx, opts, "count")?;
        let pending = tx.pending(self);
        if let Some(p) = pending.filter(|p| p.cleared) {
            return Ok(p.writes.values().filter(|w| w.is_some()).count());
        }

        let guard = self.read_lock(&deadline)?;
        let mut count = guard.len();
        if let Some(p) = pending {
            for (key, write) in &p.writes {
                match (write.is_some(), guard.contains_key(key)) {
                    (true, false) => count += 1,
                    (false, true) => count -= 1,
                    _ => {}
                }
            }
        }
        Ok(count)
    }

    /// Enumerate the entries within `range`
    ///
    /// The whole range is collected under the read lock when called, costing
    /// memory proportional to the number of matches. Items are then yielded
    /// lazily and the iterator checks the cancellation token before each one.
    ///
    /// `EnumerationMode::Ordered` yields ascending key order. `Unordered`
    /// yields committed entries first and this transaction's pending
    /// additions after them, skipping the merge sort.
    pub fn range_scan<R: RangeBounds<K>>(
        self: &Arc<Self>,
        tx: &mut Transaction,
        range: R,
        order: EnumerationMode,
        mode: LockMode,
        opts: &OpOptions,
    ) -> Result<RangeScan<K, V>> {
        let deadline = self.begin_op(tx, opts, "range_scan")?;
        let bounds = (range.start_bound(), range.end_bound());
        if is_empty_range(bounds) {
            return Ok(RangeScan::new(Vec::new(), opts.cancel.clone()));
        }

        let pending = tx.pending(self);
        let cleared = pending.is_some_and(|p| p.cleared);
        let committed: Vec<(K, Versioned<V>)> = if cleared {
            Vec::new()
        } else {
            let guard = self.read_lock(&deadline)?;
            guard
                .range::<K, _>(bounds)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        let mut tracked = Vec::new();
        let items: Vec<(K, V)> = match pending {
            None => {
                tracked.extend(committed.iter().map(|(k, v)| (k.clone(), v.version)));
                committed.into_iter().map(|(k, v)| (k, v.value)).collect()
            }
            Some(p) => {
                let overlay = p.writes.range::<K, _>(bounds);
                match order {
                    EnumerationMode::Ordered => {
                        let mut merged: BTreeMap<K, V> = BTreeMap::new();
                        for (k, v) in committed {
                            tracked.push((k.clone(), v.version));
                            merged.insert(k, v.value);
                        }
                        for (k, w) in overlay {
                            match w {
                                Some(v) => merged.insert(k.clone(), v.clone()),
                                None => merged.remove(k),
                            };
                        }
                        merged.into_iter().collect()
                    }
                    EnumerationMode::Unordered => {
                        let mut items: Vec<(K, V)> = Vec::with_capacity(committed.len());
                        for (k, v) in committed {
                            if !p.writes.contains_key(&k) {
                                tracked.push((k.clone(), v.version));
                                items.push((k, v.value));
                            }
                        }
                        items.extend(
                            overlay.filter_map(|(k, w)| w.clone().map(|v| (k.clone(), v))),
                        );
                        items
                    }
                }
            }
        };

        if mode == LockMode::Update {
            let state = tx.pending_mut(self);
            for (k, version) in tracked {
                state.reads.entry(k).or_insert(version);
            }
        }

        trace!(target: "keyspan::store", store = %self.name, items = items.len(), "range scan");
        Ok(RangeScan::new(items, opts.cancel.clone()))
    }

    /// Enumerate all keys
    pub fn keys(
        self: &Arc<Self>,
        tx: &mut Transaction,
        order: EnumerationMode,
        opts: &OpOptions,
    ) -> Result<Vec<K>> {
        self.range_scan(tx, .., order, LockMode::Default, opts)?
            .map(|item| item.map(|(k, _)| k))
            .collect()
    }

    // === Write Operations ===

    /// Store a value unconditionally, returning the previous value
    pub fn set(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: K,
        value: V,
        opts: &OpOptions,
    ) -> Result<Option<V>> {
        let deadline = self.begin_op(tx, opts, "set")?;
        let previous = self.lookup(tx, &key, true, &deadline)?;
        self.write(tx, key, Some(value));
        Ok(previous)
    }

    /// Add a new key, failing with [`Error::KeyExists`] if it is present
    pub fn add(self: &Arc<Self>, tx: &mut Transaction, key: K, value: V, opts: &OpOptions) -> Result<()> {
        if self.try_add(tx, key.clone(), value, opts)? {
            Ok(())
        } else {
            Err(Error::KeyExists(format!("{:?} in store '{}'", key, self.name)))
        }
    }

    /// Add a new key; returns false (and writes nothing) if it is present
    pub fn try_add(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: K,
        value: V,
        opts: &OpOptions,
    ) -> Result<bool> {
        let deadline = self.begin_op(tx, opts, "try_add")?;
        if self.lookup(tx, &key, true, &deadline)?.is_some() {
            return Ok(false);
        }
        self.write(tx, key, Some(value));
        Ok(true)
    }

    /// Insert via `add` when absent, replace via `update` when present
    pub fn add_or_update<A, U>(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: K,
        add: A,
        update: U,
        opts: &OpOptions,
    ) -> Result<Upserted<V>>
    where
        A: FnOnce(&K) -> V,
        U: FnOnce(&K, &V) -> V,
    {
        let deadline = self.begin_op(tx, opts, "add_or_update")?;
        let outcome = match self.lookup(tx, &key, true, &deadline)? {
            None => Upserted::Added(add(&key)),
            Some(old) => {
                let new = update(&key, &old);
                Upserted::Updated { old, new }
            }
        };
        self.write(tx, key, Some(outcome.value().clone()));
        Ok(outcome)
    }

    /// Return the present value, or add the one produced by `add`
    pub fn get_or_add<A>(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: K,
        add: A,
        opts: &OpOptions,
    ) -> Result<GetOrAdded<V>>
    where
        A: FnOnce(&K) -> V,
    {
        let deadline = self.begin_op(tx, opts, "get_or_add")?;
        if let Some(existing) = self.lookup(tx, &key, true, &deadline)? {
            return Ok(GetOrAdded::Existing(existing));
        }
        let value = add(&key);
        self.write(tx, key, Some(value.clone()));
        Ok(GetOrAdded::Added(value))
    }

    /// Remove a key, returning the removed value
    pub fn try_remove(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: &K,
        opts: &OpOptions,
    ) -> Result<Option<V>> {
        let deadline = self.begin_op(tx, opts, "try_remove")?;
        let removed = self.lookup(tx, key, true, &deadline)?;
        if removed.is_some() {
            self.write(tx, key.clone(), None);
        }
        Ok(removed)
    }

    /// Remove a key; returns whether it was present
    pub fn remove(self: &Arc<Self>, tx: &mut Transaction, key: &K, opts: &OpOptions) -> Result<bool> {
        Ok(self.try_remove(tx, key, opts)?.is_some())
    }

    /// Remove every entry
    pub fn clear(self: &Arc<Self>, tx: &mut Transaction, opts: &OpOptions) -> Result<()> {
        self.begin_op(tx, opts, "clear")?;
        let state = tx.pending_mut(self);
        state.cleared = true;
        state.writes.clear();
        Ok(())
    }

    // === Internals ===

    fn begin_op(&self, tx: &Transaction, opts: &OpOptions, operation: &'static str) -> Result<Deadline> {
        opts.check()?;
        tx.ensure_active()?;
        Ok(opts.deadline(operation))
    }

    fn read_lock(&self, deadline: &Deadline) -> Result<RwLockReadGuard<'_, Entries<K, V>>> {
        self.entries
            .try_read_for(deadline.remaining()?)
            .ok_or_else(|| deadline.expired())
    }

    fn lookup(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: &K,
        track: bool,
        deadline: &Deadline,
    ) -> Result<Option<V>> {
        if let Some(p) = tx.pending(self) {
            if let Some(write) = p.writes.get(key) {
                return Ok(write.clone());
            }
            if p.cleared {
                return Ok(None);
            }
        }

        let committed = self.read_lock(deadline)?.get(key).cloned();
        if track {
            let version = committed.as_ref().map_or(0, |v| v.version);
            tx.pending_mut(self)
                .reads
                .entry(key.clone())
                .or_insert(version);
        }
        Ok(committed.map(|v| v.value))
    }

    fn write(self: &Arc<Self>, tx: &mut Transaction, key: K, value: Option<V>) {
        tx.pending_mut(self).writes.insert(key, value);
    }

    /// Check every tracked read against the committed state
    ///
    /// Returns a description of the first conflict found.
    pub(crate) fn validate_reads(
        &self,
        reads: &BTreeMap<K, u64>,
        deadline: &Deadline,
    ) -> Result<Option<String>> {
        if reads.is_empty() {
            return Ok(None);
        }
        let guard = self.read_lock(deadline)?;
        for (key, read_version) in reads {
            let current = guard.get(key).map_or(0, |v| v.version);
            if current != *read_version {
                return Ok(Some(format!(
                    "key {:?} in store '{}' changed (read version {}, now {})",
                    key, self.name, read_version, current
                )));
            }
        }
        Ok(None)
    }

    /// Apply a validated transaction's writes
    ///
    /// Called only under the manager's commit lock; readers hold this lock
    /// briefly, so the blocking `write` cannot stall behind another commit.
    /// Returns the listener delivery to run once the commit lock is released.
    pub(crate) fn apply_writes(
        &self,
        cleared: bool,
        writes: BTreeMap<K, Option<V>>,
        commit_version: u64,
    ) -> Option<Notification> {
        let listening = !self.listeners.is_empty();
        let mut events = Vec::new();
        {
            let mut guard = self.entries.write();
            if cleared {
                guard.clear();
                if listening {
                    events.push(ChangeEvent::Cleared);
                }
            }
            for (key, write) in writes {
                match write {
                    Some(value) => {
                        let event_value = listening.then(|| value.clone());
                        let old = guard.insert(
                            key.clone(),
                            Versioned {
                                value,
                                version: commit_version,
                            },
                        );
                        if let Some(new) = event_value {
                            events.push(match old {
                                Some(old) => ChangeEvent::Updated {
                                    key,
                                    old: old.value,
                                    new,
                                },
                                None => ChangeEvent::Added { key, value: new },
                            });
                        }
                    }
                    None => {
                        if let Some(old) = guard.remove(&key) {
                            if listening {
                                events.push(ChangeEvent::Removed { key, old: old.value });
                            }
                        }
                    }
                }
            }
        }

        if events.is_empty() {
            return None;
        }
        let listeners = Arc::clone(&self.listeners);
        Some(Box::new(move || listeners.notify(commit_version, &events)))
    }
}

impl<V: StoreValue + PartialEq, K: StoreKey> OrderedStore<K, V> {
    /// Replace the value only if it currently equals `comparison`
    pub fn try_update(
        self: &Arc<Self>,
        tx: &mut Transaction,
        key: K,
        new_value: V,
        comparison: &V,
        opts: &OpOptions,
    ) -> Result<bool> {
        let deadline = self.begin_op(tx, opts, "try_update")?;
        match self.lookup(tx, &key, true, &deadline)? {
            Some(current) if current == *comparison => {
                self.write(tx, key, Some(new_value));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl<K, V> std::fmt::Debug for OrderedStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedStore")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// `BTreeMap::range` panics on inverted bounds; such ranges are simply empty
fn is_empty_range<K: Ord>(bounds: (Bound<&K>, Bound<&K>)) -> bool {
    match bounds {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        _ => false,
    }
}
