//! Database: store registry, transaction manager and configuration
//!
//! `Database` is the entry point for opening indexed collections and running
//! transactions against them.
//!
//! ```rust,ignore
//! let db = Database::new();
//! let products = db.open_indexed("products", vec![
//!     FilterIndex::new("category", |_: &String, p: &Product| p.category.clone())?.into(),
//! ])?;
//!
//! db.transaction(|tx| products.add(tx, "sku-0".into(), product))?;
//! ```
//!
//! Opening, loading and removing collections act on the registry directly
//! and are not part of any transaction.

use crate::collection::{ensure_unique_names, IndexedCollection};
use crate::config::IndexConfig;
use crate::index::IndexDefinition;
use keyspan_core::{OpOptions, Result};
use keyspan_storage::{
    OrderedStore, StoreKey, StoreRegistry, StoreValue, Transaction, TransactionManager,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for transaction retry behavior
///
/// Only commit conflicts and timeouts are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a RetryConfig with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        let shift = attempt.min(63);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

// ============================================================================
// Database
// ============================================================================

/// In-memory database of named stores and indexed collections
#[derive(Debug)]
pub struct Database {
    registry: StoreRegistry,
    manager: TransactionManager,
    config: IndexConfig,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Database with the default configuration
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    /// Database with an explicit configuration
    pub fn with_config(config: IndexConfig) -> Self {
        Self {
            registry: StoreRegistry::new(),
            manager: TransactionManager::default(),
            config,
        }
    }

    /// Database configured from a `keyspan.toml` file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = IndexConfig::from_file(path)?;
        info!(target: "keyspan::registry", path = %path.display(), timeout_ms = config.default_timeout_ms, "loaded config");
        Ok(Self::with_config(config))
    }

    /// Active configuration
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// The store registry
    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    /// Options carrying the configured default timeout
    pub fn default_options(&self) -> OpOptions {
        self.config.default_options()
    }

    // === Transactions ===

    /// Begin a transaction for manual control
    ///
    /// Prefer [`transaction`](Self::transaction) for automatic commit/abort.
    pub fn begin(&self) -> Transaction {
        self.manager.begin()
    }

    /// Commit with the default options
    pub fn commit(&self, tx: &mut Transaction) -> Result<u64> {
        self.commit_with(tx, &self.default_options())
    }

    /// Commit with explicit options
    pub fn commit_with(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<u64> {
        self.manager.commit(tx, opts)
    }

    /// Abort, discarding every buffered write
    pub fn abort(&self, tx: &mut Transaction) -> Result<()> {
        self.manager.abort(tx, "aborted by caller")
    }

    /// Current global commit version
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Run `f` in a fresh transaction: commit on `Ok`, abort on `Err`
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut tx = self.begin();
        let result = f(&mut tx);
        self.finish(&mut tx, result)
    }

    /// Like [`transaction`](Self::transaction), retrying retryable failures
    pub fn transaction_with_retry<F, T>(&self, config: RetryConfig, f: F) -> Result<T>
    where
        F: Fn(&mut Transaction) -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.begin();
            let result = f(&mut tx);
            match self.finish(&mut tx, result) {
                Err(e) if e.is_retryable() && attempt < config.max_retries => {
                    debug!(target: "keyspan::txn", attempt, error = %e, "retrying transaction");
                    std::thread::sleep(config.calculate_delay(attempt));
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// Retry policy built from the configuration
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_retries(self.config.max_retries)
    }

    fn finish<T>(&self, tx: &mut Transaction, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit(tx)?;
                Ok(value)
            }
            Err(e) => {
                if tx.is_active() {
                    self.manager.abort(tx, format!("closure failed: {}", e))?;
                }
                Err(e)
            }
        }
    }

    // === Stores ===

    /// Bind a plain store, creating it if absent
    pub fn open_store<K: StoreKey, V: StoreValue>(&self, name: &str) -> Result<Arc<OrderedStore<K, V>>> {
        self.registry.open_or_create(name)
    }

    // === Indexed collections ===

    /// Open an indexed collection, creating the primary and any missing index store
    ///
    /// # Errors
    ///
    /// - `Construction` if two indexes share a name
    /// - `StoreTypeMismatch` if a store name is bound to other types
    pub fn open_indexed<K: StoreKey, V: StoreValue>(
        &self,
        name: &str,
        indexes: Vec<IndexDefinition<K, V>>,
    ) -> Result<IndexedCollection<K, V>> {
        ensure_unique_names(&indexes)?;
        let primary = self.registry.open_or_create::<K, V>(name)?;
        let opened = indexes
            .iter()
            .map(|index| index.open(&self.registry, name))
            .collect::<Result<Vec<_>>>()?;
        info!(target: "keyspan::registry", name, indexes = opened.len(), "opened indexed collection");
        IndexedCollection::new(name, primary, opened, self.config.default_timeout())
    }

    /// Load an existing indexed collection
    ///
    /// Returns `None` if the primary or any declared index store is missing.
    pub fn load_indexed<K: StoreKey, V: StoreValue>(
        &self,
        name: &str,
        indexes: Vec<IndexDefinition<K, V>>,
    ) -> Result<Option<IndexedCollection<K, V>>> {
        ensure_unique_names(&indexes)?;
        let Some(primary) = self.registry.open_existing::<K, V>(name)? else {
            debug!(target: "keyspan::registry", name, "primary store missing");
            return Ok(None);
        };
        let mut loaded = Vec::with_capacity(indexes.len());
        for index in &indexes {
            match index.load(&self.registry, name)? {
                Some(index) => loaded.push(index),
                None => {
                    warn!(target: "keyspan::registry", name, index = index.name(), "index store missing");
                    return Ok(None);
                }
            }
        }
        IndexedCollection::new(name, primary, loaded, self.config.default_timeout()).map(Some)
    }

    /// Remove an indexed collection: its primary and every declared index store
    ///
    /// Returns whether the primary existed.
    pub fn remove_indexed<K: StoreKey, V: StoreValue>(
        &self,
        name: &str,
        indexes: &[IndexDefinition<K, V>],
    ) -> Result<bool> {
        ensure_unique_names(indexes)?;
        for index in indexes {
            index.remove(&self.registry, name);
        }
        let removed = self.registry.remove(name);
        info!(target: "keyspan::registry", name, removed, "removed indexed collection");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FilterIndex, SearchIndex};
    use keyspan_core::{Error, LockMode};

    fn definitions() -> Vec<IndexDefinition<u32, String>> {
        vec![
            FilterIndex::new("len", |_: &u32, v: &String| v.len()).unwrap().into(),
            SearchIndex::new("words", |_: &u32, v: &String| Some(v.clone())).unwrap().into(),
        ]
    }

    #[test]
    fn test_calculate_delay() {
        let config = RetryConfig::default();
        assert_eq!(config.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(20));
        assert_eq!(config.calculate_delay(10), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(200), Duration::from_millis(100));
    }

    #[test]
    fn test_open_creates_all_stores() {
        let db = Database::new();
        db.open_indexed("docs", definitions()).unwrap();
        assert_eq!(
            db.registry().names(),
            vec!["docs", "docs/filter/len", "docs/search/words"]
        );
    }

    #[test]
    fn test_duplicate_index_names_rejected() {
        let db = Database::new();
        let mut defs = definitions();
        defs.push(FilterIndex::new("len", |_: &u32, v: &String| v.len() as u64).unwrap().into());
        assert!(matches!(db.open_indexed("docs", defs), Err(Error::Construction(_))));
        assert!(db.registry().is_empty());
    }

    #[test]
    fn test_load_requires_every_store() {
        let db = Database::new();
        assert!(db.load_indexed("docs", definitions()).unwrap().is_none());

        db.open_indexed("docs", definitions()).unwrap();
        db.registry().remove("docs/search/words");
        assert!(db.load_indexed("docs", definitions()).unwrap().is_none());

        db.open_indexed("docs", definitions()).unwrap();
        assert!(db.load_indexed("docs", definitions()).unwrap().is_some());
    }

    #[test]
    fn test_remove_deletes_every_store() {
        let db = Database::new();
        db.open_indexed("docs", definitions()).unwrap();
        assert!(db.remove_indexed("docs", &definitions()).unwrap());
        assert!(db.registry().is_empty());
        assert!(!db.remove_indexed("docs", &definitions()).unwrap());
    }

    #[test]
    fn test_transaction_commits_on_ok_and_aborts_on_err() {
        let db = Database::new();
        let store = db.open_store::<u32, String>("plain").unwrap();
        let opts = db.default_options();

        db.transaction(|tx| store.set(tx, 1, "a".into(), &opts)).unwrap();
        let err = db
            .transaction(|tx| {
                store.set(tx, 2, "b".into(), &opts)?;
                store.add(tx, 1, "dup".into(), &opts)
            })
            .unwrap_err();
        assert!(matches!(err, Error::KeyExists(_)));

        let mut tx = db.begin();
        assert!(store.get(&mut tx, &2, LockMode::Default, &opts).unwrap().is_none());
        assert_eq!(store.committed_len(), 1);
    }

    #[test]
    fn test_retry_gives_up_on_non_retryable() {
        let db = Database::new();
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let result: Result<()> = db.transaction_with_retry(db.retry_config(), |_| {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(Error::unsupported("nope"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_retry_surfaces_first_conflict() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let db = Database::new();
        let store = db.open_store::<u32, u64>("counters").unwrap();
        let opts = db.default_options();
        db.transaction(|tx| store.set(tx, 1, 0, &opts)).unwrap();

        // Every attempt loses to a writer that commits between its read and its commit
        let attempts = AtomicUsize::new(0);
        let contended = |tx: &mut Transaction| {
            attempts.fetch_add(1, Ordering::SeqCst);
            let current = store.get(tx, &1, LockMode::Update, &opts)?.unwrap_or(0);
            db.transaction(|other| store.set(other, 1, current + 100, &opts))?;
            store.set(tx, 1, current + 1, &opts)
        };

        assert_eq!(RetryConfig::no_retry().max_retries, 0);
        let err = db.transaction_with_retry(RetryConfig::no_retry(), contended).unwrap_err();
        assert!(matches!(err, Error::TransactionAborted { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        attempts.store(0, Ordering::SeqCst);
        let config = RetryConfig::no_retry().with_max_retries(2);
        assert!(db.transaction_with_retry(config, contended).is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_timeout_from_config() {
        let db = Database::with_config(IndexConfig {
            default_timeout_ms: 250,
            max_retries: 1,
        });
        let docs = db.open_indexed("docs", definitions()).unwrap();
        assert_eq!(docs.default_options().timeout, Duration::from_millis(250));
        assert_eq!(db.retry_config().max_retries, 1);
    }
}
