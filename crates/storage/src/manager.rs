//! Transaction manager coordinating commit
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Acquire the commit lock (bounded by the operation timeout)
//! 2. Validate the read set of every touched store
//! 3. IF conflict: mark aborted and return TransactionAborted
//! 4. Allocate commit_version (increment global version)
//! 5. Apply every store's buffered writes with commit_version
//! 6. Release the commit lock and mark committed
//! 7. Deliver change notifications, then return commit_version
//! ```
//!
//! Commits are serialized by the commit lock, so validation and application
//! of one transaction never interleave with another's.

use crate::transaction::Transaction;
use keyspan_core::{Error, OpOptions, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Manages transaction lifecycle and atomic commits
///
/// The global version is incremented once per committed transaction that
/// wrote something; every key written by that transaction carries the same
/// version.
pub struct TransactionManager {
    /// Monotonically increasing; versions handed to commits start at 1
    version: AtomicU64,
    next_txn_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a manager whose first commit gets `initial_version + 1`
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Start a transaction
    pub fn begin(&self) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let tx = Transaction::new(id, self.current_version());
        debug!(target: "keyspan::txn", txn_id = id, start_version = tx.start_version(), "begin");
        tx
    }

    /// Commit a transaction atomically across every store it touched
    ///
    /// # Returns
    /// - Ok(commit_version) on success; read-only transactions return the
    ///   current version without allocating a new one
    /// - Err(TransactionAborted) if a validated read changed; the transaction
    ///   is aborted
    /// - Err(Timeout) if the commit lock or a store lock could not be taken
    ///   in time; the transaction stays active and may be retried or aborted
    pub fn commit(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<u64> {
        tx.ensure_active()?;
        opts.check()?;

        if !tx.has_writes() {
            tx.mark_committed();
            return Ok(self.current_version());
        }

        let deadline = opts.deadline("commit");
        let guard = self
            .commit_lock
            .try_lock_for(deadline.remaining()?)
            .ok_or_else(|| deadline.expired())?;

        let mut conflict = None;
        for pending in tx.pending_stores() {
            if let Some(detail) = pending.validate(&deadline)? {
                conflict = Some(detail);
                break;
            }
        }
        if let Some(reason) = conflict {
            warn!(target: "keyspan::txn", txn_id = tx.id(), %reason, "commit conflict");
            tx.mark_aborted(reason.clone());
            return Err(Error::TransactionAborted { reason });
        }

        let commit_version = self.allocate_version();
        let mut writes = 0;
        let mut notifications = Vec::new();
        for pending in tx.pending_stores() {
            writes += pending.write_count();
            debug!(target: "keyspan::txn", store = pending.store_name(), "apply");
            notifications.extend(pending.apply(commit_version));
        }
        drop(guard);
        tx.mark_committed();

        debug!(
            target: "keyspan::txn",
            txn_id = tx.id(),
            commit_version,
            writes,
            elapsed_us = tx.elapsed().as_micros() as u64,
            "committed"
        );
        for notify in notifications {
            notify();
        }
        Ok(commit_version)
    }

    /// Discard every buffered operation and mark the transaction aborted
    pub fn abort(&self, tx: &mut Transaction, reason: impl Into<String>) -> Result<()> {
        tx.ensure_active()?;
        let reason = reason.into();
        let pending = tx.pending_operations();
        debug!(target: "keyspan::txn", txn_id = tx.id(), discarded = pending.writes, %reason, "abort");
        tx.mark_aborted(reason);
        Ok(())
    }

    /// Commit, aborting the transaction if the commit fails for any reason
    pub fn commit_or_rollback(&self, tx: &mut Transaction, opts: &OpOptions) -> Result<u64> {
        match self.commit(tx, opts) {
            Ok(version) => Ok(version),
            Err(e) => {
                if tx.is_active() {
                    tx.mark_aborted(format!("Commit failed: {}", e));
                }
                Err(e)
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("version", &self.current_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderedStore, TransactionStatus};
    use keyspan_core::LockMode;
    use std::sync::Arc;
    use std::time::Duration;

    fn opts() -> OpOptions {
        OpOptions::new(Duration::from_secs(5))
    }

    fn store() -> Arc<OrderedStore<u32, String>> {
        Arc::new(OrderedStore::new("items"))
    }

    #[test]
    fn test_new_manager() {
        let manager = TransactionManager::new(100);
        assert_eq!(manager.current_version(), 100);
    }

    #[test]
    fn test_commit_version_increment() {
        let manager = TransactionManager::default();
        let store = store();
        for expected in 1..=3 {
            let mut tx = manager.begin();
            store.set(&mut tx, expected as u32, "v".into(), &opts()).unwrap();
            assert_eq!(manager.commit(&mut tx, &opts()).unwrap(), expected);
            assert_eq!(tx.status(), &TransactionStatus::Committed);
        }
    }

    #[test]
    fn test_commit_empty_transaction() {
        let manager = TransactionManager::default();
        let mut tx = manager.begin();
        assert_eq!(manager.commit(&mut tx, &opts()).unwrap(), 0);
        assert_eq!(manager.current_version(), 0);
    }

    #[test]
    fn test_commit_spans_stores() {
        let manager = TransactionManager::default();
        let a = store();
        let b: Arc<OrderedStore<String, u32>> = Arc::new(OrderedStore::new("b"));
        let mut tx = manager.begin();
        a.set(&mut tx, 1, "one".into(), &opts()).unwrap();
        b.set(&mut tx, "one".into(), 1, &opts()).unwrap();
        assert_eq!(tx.pending_operations().stores, 2);
        manager.commit(&mut tx, &opts()).unwrap();
        assert_eq!(a.committed_len(), 1);
        assert_eq!(b.committed_len(), 1);
    }

    #[test]
    fn test_first_committer_wins() {
        let manager = TransactionManager::default();
        let store = store();
        let mut t1 = manager.begin();
        let mut t2 = manager.begin();

        store.get(&mut t1, &7, LockMode::Update, &opts()).unwrap();
        store.get(&mut t2, &7, LockMode::Update, &opts()).unwrap();
        store.set(&mut t1, 7, "first".into(), &opts()).unwrap();
        store.set(&mut t2, 7, "second".into(), &opts()).unwrap();

        manager.commit(&mut t1, &opts()).unwrap();
        let err = manager.commit(&mut t2, &opts()).unwrap_err();
        assert!(matches!(err, Error::TransactionAborted { .. }));
        assert!(err.is_retryable());
        assert!(!t2.is_active());

        let mut reader = manager.begin();
        assert_eq!(store.get(&mut reader, &7, LockMode::Default, &opts()).unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn test_blind_writes_no_conflict() {
        let manager = TransactionManager::default();
        let store = store();
        let mut t1 = manager.begin();
        let mut t2 = manager.begin();
        store.clear(&mut t1, &opts()).unwrap();
        store.clear(&mut t2, &opts()).unwrap();
        manager.commit(&mut t1, &opts()).unwrap();
        manager.commit(&mut t2, &opts()).unwrap();
    }

    #[test]
    fn test_abort_discards_writes() {
        let manager = TransactionManager::default();
        let store = store();
        let mut tx = manager.begin();
        store.set(&mut tx, 1, "x".into(), &opts()).unwrap();
        manager.abort(&mut tx, "user abort").unwrap();
        assert!(matches!(tx.status(), TransactionStatus::Aborted { .. }));
        assert_eq!(store.committed_len(), 0);
        assert!(matches!(
            store.set(&mut tx, 2, "y".into(), &opts()),
            Err(Error::TransactionNotActive { .. })
        ));
        assert!(manager.commit(&mut tx, &opts()).is_err());
    }

    #[test]
    fn test_commit_times_out_behind_lock() {
        let manager = TransactionManager::default();
        let store = store();
        let mut tx = manager.begin();
        store.set(&mut tx, 1, "x".into(), &opts()).unwrap();

        let _held = manager.commit_lock.lock();
        let err = manager
            .commit(&mut tx, &OpOptions::new(Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "commit", .. }));
        assert!(tx.is_active());
    }

    #[test]
    fn test_commit_or_rollback_failure_cleans_up() {
        let manager = TransactionManager::default();
        let store = store();
        let mut tx = manager.begin();
        store.set(&mut tx, 1, "x".into(), &opts()).unwrap();
        let cancelled = opts();
        cancelled.cancel.cancel();
        assert!(manager.commit_or_rollback(&mut tx, &cancelled).is_err());
        assert!(!tx.is_active());
    }
}
