//! Search index: tokenized inverted index over projected text
//!
//! The secondary store maps each normalized word to the posting list of
//! primary keys whose text contains it. Word sets come from
//! [`tokenize`](super::tokenizer::tokenize) and are always visited in sorted
//! order.

use super::posting::{add_posting, remove_posting, PostingList, PostingStore};
use super::tokenizer::{sorted_difference, tokenize, tokenize_str};
use super::{index_store_name, IndexKind, IndexMaintenance};
use keyspan_core::{Error, LockMode, OpOptions, Result};
use keyspan_storage::{StoreKey, StoreRegistry, StoreValue, Transaction};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

type TextProjection<K, V> = Arc<dyn Fn(&K, &V) -> Option<String> + Send + Sync>;

/// Full-text index over a projected text attribute
pub struct SearchIndex<K, V> {
    name: String,
    projection: TextProjection<K, V>,
    store: Option<Arc<PostingStore<String, K>>>,
}

impl<K, V> Clone for SearchIndex<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            projection: Arc::clone(&self.projection),
            store: self.store.clone(),
        }
    }
}

impl<K: StoreKey, V: StoreValue> SearchIndex<K, V> {
    /// Define a search index named `name` over `projection`
    ///
    /// `None` text indexes no words.
    ///
    /// # Errors
    ///
    /// `Construction` if `name` is empty.
    pub fn new<P>(name: impl Into<String>, projection: P) -> Result<Self>
    where
        P: Fn(&K, &V) -> Option<String> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::construction("index name must not be empty"));
        }
        Ok(Self {
            name,
            projection: Arc::new(projection),
            store: None,
        })
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sorted distinct words of the projected text
    pub fn words(&self, key: &K, value: &V) -> Vec<String> {
        tokenize((self.projection)(key, value).as_deref())
    }

    fn store(&self) -> Result<&Arc<PostingStore<String, K>>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::unsupported(format!("search index '{}' is not open", self.name)))
    }

    /// Bind to the secondary store, creating it if absent
    pub fn open(&self, registry: &StoreRegistry, primary: &str) -> Result<Self> {
        let name = index_store_name(primary, IndexKind::Search, &self.name);
        let store = registry.open_or_create::<String, PostingList<K>>(&name)?;
        Ok(self.bound(store))
    }

    /// Bind to an existing secondary store
    pub fn load(&self, registry: &StoreRegistry, primary: &str) -> Result<Option<Self>> {
        let name = index_store_name(primary, IndexKind::Search, &self.name);
        Ok(registry
            .open_existing::<String, PostingList<K>>(&name)?
            .map(|store| self.bound(store)))
    }

    /// Delete the secondary store; returns whether it existed
    pub fn remove(&self, registry: &StoreRegistry, primary: &str) -> bool {
        registry.remove(&index_store_name(primary, IndexKind::Search, &self.name))
    }

    fn bound(&self, store: Arc<PostingStore<String, K>>) -> Self {
        let mut bound = self.clone();
        bound.store = Some(store);
        bound
    }

    /// Keys whose text contains any word of `text`
    ///
    /// Collects at most `limit` distinct keys, stopping as soon as the limit
    /// is reached. Keys are in no particular order.
    pub fn search(
        &self,
        tx: &mut Transaction,
        text: &str,
        limit: usize,
        opts: &OpOptions,
    ) -> Result<Vec<K>> {
        let mut seen = BTreeSet::new();
        self.search_into(tx, text, limit, &mut seen, opts)?;
        Ok(seen.into_iter().collect())
    }

    /// Add matching keys into `found` until it holds `limit` keys
    pub(crate) fn search_into(
        &self,
        tx: &mut Transaction,
        text: &str,
        limit: usize,
        found: &mut BTreeSet<K>,
        opts: &OpOptions,
    ) -> Result<()> {
        let store = self.store()?;
        for word in tokenize_str(text) {
            if found.len() >= limit {
                break;
            }
            opts.check()?;
            if let Some(list) = store.get(tx, &word, LockMode::Default, opts)? {
                for key in list.into_keys() {
                    if found.len() >= limit {
                        break;
                    }
                    found.insert(key);
                }
            }
        }
        Ok(())
    }

    fn add_words(&self, tx: &mut Transaction, key: &K, words: Vec<String>, opts: &OpOptions) -> Result<()> {
        let store = self.store()?;
        for word in words {
            add_posting(store, tx, word, key, opts)?;
        }
        Ok(())
    }

    fn remove_words(&self, tx: &mut Transaction, key: &K, words: Vec<String>, opts: &OpOptions) -> Result<()> {
        let store = self.store()?;
        for word in words {
            remove_posting(store, tx, &self.name, word, key, opts)?;
        }
        Ok(())
    }
}

impl<K: StoreKey, V: StoreValue> IndexMaintenance<K, V> for SearchIndex<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Search
    }

    fn on_add(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        let words = self.words(key, value);
        debug!(target: "keyspan::index", index = %self.name, ?key, words = words.len(), "index words");
        self.add_words(tx, key, words, opts)
    }

    fn on_update(
        &self,
        tx: &mut Transaction,
        key: &K,
        old: &V,
        new: &V,
        opts: &OpOptions,
    ) -> Result<()> {
        let old_words = self.words(key, old);
        let new_words = self.words(key, new);
        let removed = sorted_difference(&old_words, &new_words);
        let added = sorted_difference(&new_words, &old_words);
        if removed.is_empty() && added.is_empty() {
            return Ok(());
        }
        debug!(
            target: "keyspan::index",
            index = %self.name,
            ?key,
            removed = removed.len(),
            added = added.len(),
            "reindex words"
        );
        // Removals and additions are each sorted, but not merged into one
        // order across both passes.
        self.remove_words(tx, key, removed, opts)?;
        self.add_words(tx, key, added, opts)
    }

    fn on_remove(&self, tx: &mut Transaction, key: &K, value: &V, opts: &OpOptions) -> Result<()> {
        let words = self.words(key, value);
        debug!(target: "keyspan::index", index = %self.name, ?key, words = words.len(), "unindex words");
        self.remove_words(tx, key, words, opts)
    }

    fn on_clear(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<()> {
        self.store()?.clear(tx, opts)
    }
}

impl<K, V> std::fmt::Debug for SearchIndex<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("name", &self.name)
            .field("open", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspan_core::EnumerationMode;
    use keyspan_storage::TransactionManager;
    use std::time::Duration;

    fn opts() -> OpOptions {
        OpOptions::new(Duration::from_secs(5))
    }

    fn name_index(registry: &StoreRegistry) -> SearchIndex<u32, String> {
        SearchIndex::new("name", |_: &u32, name: &String| Some(name.clone()))
            .unwrap()
            .open(registry, "people")
            .unwrap()
    }

    fn words_in_store(index: &SearchIndex<u32, String>, tx: &mut Transaction) -> Vec<String> {
        index
            .store()
            .unwrap()
            .keys(tx, EnumerationMode::Ordered, &opts())
            .unwrap()
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index = name_index(&registry);
        let mut tx = manager.begin();
        index.on_add(&mut tx, &1, &"John Doe".to_string(), &opts()).unwrap();
        index.on_add(&mut tx, &2, &"Jane Doe".to_string(), &opts()).unwrap();

        let mut found = index.search(&mut tx, "doe", usize::MAX, &opts()).unwrap();
        found.sort();
        assert_eq!(found, vec![1, 2]);
        assert_eq!(index.search(&mut tx, "DOE", usize::MAX, &opts()).unwrap().len(), 2);
        assert!(index.search(&mut tx, "xyz", usize::MAX, &opts()).unwrap().is_empty());
        assert_eq!(index.search(&mut tx, "john, jane!", usize::MAX, &opts()).unwrap().len(), 2);
    }

    #[test]
    fn test_search_respects_limit() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index = name_index(&registry);
        let mut tx = manager.begin();
        for key in 0..10 {
            index.on_add(&mut tx, &key, &"common".to_string(), &opts()).unwrap();
        }
        assert_eq!(index.search(&mut tx, "common", 3, &opts()).unwrap().len(), 3);
        assert!(index.search(&mut tx, "common", 0, &opts()).unwrap().is_empty());
    }

    #[test]
    fn test_update_touches_only_changed_words() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index = name_index(&registry);
        let mut tx = manager.begin();
        index.on_add(&mut tx, &1, &"John Doe".to_string(), &opts()).unwrap();
        manager.commit(&mut tx, &opts()).unwrap();

        let mut tx = manager.begin();
        index
            .on_update(&mut tx, &1, &"John Doe".to_string(), &"doe, JOHN".to_string(), &opts())
            .unwrap();
        assert!(tx.pending_operations().is_empty());

        index
            .on_update(&mut tx, &1, &"John Doe".to_string(), &"Jane Doe".to_string(), &opts())
            .unwrap();
        assert_eq!(tx.pending_operations().writes, 2);
        assert_eq!(words_in_store(&index, &mut tx), vec!["doe", "jane"]);
    }

    #[test]
    fn test_remove_drops_empty_posting_lists() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index = name_index(&registry);
        let mut tx = manager.begin();
        index.on_add(&mut tx, &1, &"John Doe".to_string(), &opts()).unwrap();
        index.on_add(&mut tx, &2, &"Jane Doe".to_string(), &opts()).unwrap();
        index.on_remove(&mut tx, &1, &"John Doe".to_string(), &opts()).unwrap();
        assert_eq!(words_in_store(&index, &mut tx), vec!["doe", "jane"]);
    }

    #[test]
    fn test_remove_unindexed_word_fails() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index = name_index(&registry);
        let mut tx = manager.begin();
        let err = index.on_remove(&mut tx, &1, &"ghost".to_string(), &opts()).unwrap_err();
        assert!(matches!(err, Error::ConsistencyViolation { .. }));
    }

    #[test]
    fn test_absent_text_indexes_nothing() {
        let registry = StoreRegistry::new();
        let manager = TransactionManager::default();
        let index: SearchIndex<u32, String> = SearchIndex::new("none", |_: &u32, _: &String| None)
            .unwrap()
            .open(&registry, "people")
            .unwrap();
        let mut tx = manager.begin();
        index.on_add(&mut tx, &1, &"ignored".to_string(), &opts()).unwrap();
        index.on_remove(&mut tx, &1, &"ignored".to_string(), &opts()).unwrap();
        assert!(tx.pending_operations().is_empty());
    }

    #[test]
    fn test_store_naming() {
        let registry = StoreRegistry::new();
        let index = name_index(&registry);
        assert!(registry.contains("people/search/name"));
        assert!(index.remove(&registry, "people"));
        assert!(index.load(&registry, "people").unwrap().is_none());
    }
}
