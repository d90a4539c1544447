//! Named store registry
//!
//! The registry maps a collection name to one [`OrderedStore`] instance. It
//! is type-erased so stores of any key/value types can share one namespace;
//! callers name the types they expect and get a typed handle back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = StoreRegistry::new();
//!
//! // Create on first use, bind afterwards
//! let products = registry.open_or_create::<String, Product>("products")?;
//!
//! // Bind only
//! let missing = registry.open_existing::<String, Product>("archive")?;
//! assert!(missing.is_none());
//! ```
//!
//! Registry operations act immediately; they are not part of any transaction.

use crate::store::{OrderedStore, StoreKey, StoreValue};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keyspan_core::{Error, Result};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

type AnyStore = Arc<dyn Any + Send + Sync>;

/// Registry of named stores
#[derive(Default)]
pub struct StoreRegistry {
    stores: DashMap<String, AnyStore>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, creating an empty store if it does not exist
    ///
    /// Fails with [`Error::StoreTypeMismatch`] if `name` is bound to a store
    /// of different key/value types.
    pub fn open_or_create<K: StoreKey, V: StoreValue>(&self, name: &str) -> Result<Arc<OrderedStore<K, V>>> {
        let erased = match self.stores.entry(name.to_string()) {
            Entry::Occupied(e) => Arc::clone(e.get()),
            Entry::Vacant(e) => {
                debug!(target: "keyspan::registry", name, "create store");
                let store: AnyStore = Arc::new(OrderedStore::<K, V>::new(name));
                Arc::clone(e.insert(store).value())
            }
        };
        downcast(name, erased)
    }

    /// Bind `name` only if it exists
    pub fn open_existing<K: StoreKey, V: StoreValue>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<OrderedStore<K, V>>>> {
        let erased = match self.stores.get(name) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };
        downcast(name, erased).map(Some)
    }

    /// Delete `name`; returns whether it existed
    ///
    /// Handles already bound keep working against the detached store.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.stores.remove(name).is_some();
        if removed {
            debug!(target: "keyspan::registry", name, "remove store");
        }
        removed
    }

    /// Check whether `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// All bound names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of bound stores
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

fn downcast<K: StoreKey, V: StoreValue>(name: &str, erased: AnyStore) -> Result<Arc<OrderedStore<K, V>>> {
    erased
        .downcast::<OrderedStore<K, V>>()
        .map_err(|_| Error::StoreTypeMismatch {
            name: name.to_string(),
        })
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("store_count", &self.stores.len())
            .field("names", &self.names())
            .finish()
    }
}
