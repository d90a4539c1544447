//! Posting lists and their transactional maintenance
//!
//! A posting list is the set of primary keys associated with one filter
//! value or one search word. It is never stored empty: removing the last
//! key deletes the secondary-store entry.

use keyspan_core::{Error, LockMode, OpOptions, Result};
use keyspan_storage::{OrderedStore, StoreKey, Transaction};
use std::sync::Arc;
use tracing::warn;

/// Duplicate-free set of primary keys, kept sorted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingList<K> {
    keys: Vec<K>,
}

impl<K: Ord> PostingList<K> {
    /// A list holding one key
    pub fn singleton(key: K) -> Self {
        Self { keys: vec![key] }
    }

    /// Insert a key; returns false if it was already present
    pub fn insert(&mut self, key: K) -> bool {
        match self.keys.binary_search(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.keys.insert(pos, key);
                true
            }
        }
    }

    /// Remove a key; returns false if it was absent
    pub fn remove(&mut self, key: &K) -> bool {
        match self.keys.binary_search(key) {
            Ok(pos) => {
                self.keys.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Check membership
    pub fn contains(&self, key: &K) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in ascending order
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Consume into keys in ascending order
    pub fn into_keys(self) -> Vec<K> {
        self.keys
    }
}

impl<K: Ord> FromIterator<K> for PostingList<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut keys: Vec<K> = iter.into_iter().collect();
        keys.sort();
        keys.dedup();
        Self { keys }
    }
}

/// Secondary store: derived value (filter value or word) to posting list
pub type PostingStore<T, K> = OrderedStore<T, PostingList<K>>;

/// Add `key` under `term`, creating the posting list if absent
pub(crate) fn add_posting<T: StoreKey, K: StoreKey>(
    store: &Arc<PostingStore<T, K>>,
    tx: &mut Transaction,
    term: T,
    key: &K,
    opts: &OpOptions,
) -> Result<()> {
    store.add_or_update(
        tx,
        term,
        |_| PostingList::singleton(key.clone()),
        |_, list| {
            let mut list = list.clone();
            list.insert(key.clone());
            list
        },
        opts,
    )?;
    Ok(())
}

/// Remove `key` from the posting list under `term`
///
/// The list is read under `LockMode::Update`. A missing list, or a list
/// without `key`, means the index no longer matches the primary collection.
pub(crate) fn remove_posting<T: StoreKey, K: StoreKey>(
    store: &Arc<PostingStore<T, K>>,
    tx: &mut Transaction,
    index: &str,
    term: T,
    key: &K,
    opts: &OpOptions,
) -> Result<()> {
    let Some(mut list) = store.get(tx, &term, LockMode::Update, opts)? else {
        warn!(target: "keyspan::index", index, ?term, ?key, "posting list missing");
        return Err(Error::consistency(index, format!("no posting list for {:?}", term)));
    };
    if !list.remove(key) {
        warn!(target: "keyspan::index", index, ?term, ?key, "key missing from posting list");
        return Err(Error::consistency(
            index,
            format!("key {:?} missing from posting list for {:?}", key, term),
        ));
    }

    if list.is_empty() {
        store.try_remove(tx, &term, opts)?;
    } else {
        store.set(tx, term, list, opts)?;
    }
    Ok(())
}
