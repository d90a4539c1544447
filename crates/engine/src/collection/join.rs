//! Key-to-value join
//!
//! Resolves a key sequence against the primary collection, one point lookup
//! per key, inside the caller's transaction. Keys that are no longer present
//! are skipped: results reflect the primary as the transaction sees it at
//! lookup time, not when the keys were produced.

use keyspan_core::{LockMode, OpOptions, Result};
use keyspan_storage::{OrderedStore, StoreKey, StoreValue, Transaction};
use std::sync::Arc;

/// Boxed key sequence consumed by a join
pub type KeySource<K> = Box<dyn Iterator<Item = Result<K>> + Send>;

/// Lazy, forward-only sequence of `(key, value)` pairs
///
/// Errors from the key source or from a lookup (timeout, cancellation) are
/// yielded once, after which the sequence is exhausted.
pub struct KeyValueJoin<'a, K, V> {
    primary: Arc<OrderedStore<K, V>>,
    keys: KeySource<K>,
    tx: &'a mut Transaction,
    opts: OpOptions,
    done: bool,
}

impl<'a, K: StoreKey, V: StoreValue> KeyValueJoin<'a, K, V> {
    /// Join `keys` against `primary` within `tx`
    pub fn new(primary: Arc<OrderedStore<K, V>>, keys: KeySource<K>, tx: &'a mut Transaction, opts: OpOptions) -> Self {
        Self {
            primary,
            keys,
            tx,
            opts,
            done: false,
        }
    }

    /// Join an in-memory key list
    pub fn from_keys<I>(primary: Arc<OrderedStore<K, V>>, keys: I, tx: &'a mut Transaction, opts: OpOptions) -> Self
    where
        I: IntoIterator<Item = K>,
        I::IntoIter: Send + 'static,
    {
        Self::new(primary, Box::new(keys.into_iter().map(Ok)), tx, opts)
    }

    fn fail(&mut self, e: keyspan_core::Error) -> Option<Result<(K, V)>> {
        self.done = true;
        Some(Err(e))
    }
}

impl<K: StoreKey, V: StoreValue> Iterator for KeyValueJoin<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let key = match self.keys.next() {
                Some(Ok(key)) => key,
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    return None;
                }
            };
            match self.primary.get(self.tx, &key, LockMode::Default, &self.opts) {
                Ok(Some(value)) => return Some(Ok((key, value))),
                Ok(None) => continue,
                Err(e) => return self.fail(e),
            }
        }
    }
}

impl<K, V> std::fmt::Debug for KeyValueJoin<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueJoin")
            .field("txn_id", &self.tx.id())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspan_core::Error;
    use keyspan_storage::TransactionManager;
    use std::time::Duration;

    fn opts() -> OpOptions {
        OpOptions::new(Duration::from_secs(5))
    }

    fn seeded() -> (TransactionManager, Arc<OrderedStore<u32, &'static str>>) {
        let manager = TransactionManager::default();
        let store = Arc::new(OrderedStore::new("join"));
        let mut tx = manager.begin();
        store.set(&mut tx, 1, "one", &opts()).unwrap();
        store.set(&mut tx, 3, "three", &opts()).unwrap();
        manager.commit(&mut tx, &opts()).unwrap();
        (manager, store)
    }

    #[test]
    fn test_missing_keys_are_skipped() {
        let (manager, store) = seeded();
        let mut tx = manager.begin();
        let pairs: Vec<_> = KeyValueJoin::from_keys(store, vec![3, 2, 1], &mut tx, opts())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(pairs, vec![(3, "three"), (1, "one")]);
    }

    #[test]
    fn test_sees_own_writes() {
        let (manager, store) = seeded();
        let mut tx = manager.begin();
        store.try_remove(&mut tx, &1, &opts()).unwrap();
        store.set(&mut tx, 2, "two", &opts()).unwrap();
        let keys: Vec<u32> = KeyValueJoin::from_keys(Arc::clone(&store), vec![1, 2, 3], &mut tx, opts())
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec![2, 3]);
    }

    #[test]
    fn test_cancellation_mid_join() {
        let (manager, store) = seeded();
        let mut tx = manager.begin();
        let opts = opts();
        let cancel = opts.cancel.clone();
        let mut join = KeyValueJoin::from_keys(store, vec![1, 3], &mut tx, opts);
        assert_eq!(join.next().unwrap().unwrap(), (1, "one"));
        cancel.cancel();
        assert!(matches!(join.next(), Some(Err(Error::Cancelled))));
        assert!(join.next().is_none());
    }

    #[test]
    fn test_key_source_error_surfaces() {
        let (manager, store) = seeded();
        let mut tx = manager.begin();
        let keys: KeySource<u32> = Box::new(vec![Ok(1), Err(Error::Cancelled), Ok(3)].into_iter());
        let mut join = KeyValueJoin::new(store, keys, &mut tx, opts());
        assert!(join.next().unwrap().is_ok());
        assert!(join.next().unwrap().is_err());
        assert!(join.next().is_none());
    }
}
