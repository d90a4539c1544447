//! Transaction context for OCC
//!
//! A [`Transaction`] buffers every write for every store it touches and
//! records the versions it observed through update-intent reads. Nothing is
//! visible to other transactions until [`TransactionManager::commit`]
//! validates the read sets and applies the buffered writes.
//!
//! One transaction may span any number of stores. Pending state is kept per
//! store, keyed by the store's id, so the primary collection and all of its
//! secondary index stores commit or abort together.
//!
//! [`TransactionManager::commit`]: crate::TransactionManager::commit

use crate::events::Notification;
use crate::store::{OrderedStore, StoreId, StoreKey, StoreValue};
use keyspan_core::{Deadline, Error, Result};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Committed` (validation passed, writes applied)
/// - `Active` → `Aborted` (conflict, or explicit abort)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// Buffered state of one transaction against one store
pub(crate) struct PendingState<K, V> {
    pub(crate) store: Arc<OrderedStore<K, V>>,
    /// `clear` was called; committed entries are invisible to this transaction
    pub(crate) cleared: bool,
    /// Buffered writes; `None` is a tombstone
    pub(crate) writes: BTreeMap<K, Option<V>>,
    /// First version observed per validated key; 0 means absent
    pub(crate) reads: BTreeMap<K, u64>,
}

impl<K: StoreKey, V: StoreValue> PendingState<K, V> {
    fn new(store: Arc<OrderedStore<K, V>>) -> Self {
        Self {
            store,
            cleared: false,
            writes: BTreeMap::new(),
            reads: BTreeMap::new(),
        }
    }
}

/// Type-erased view of a [`PendingState`] used by the commit protocol
pub(crate) trait PendingWrites: Send {
    fn store_name(&self) -> &str;
    fn write_count(&self) -> usize;
    fn has_writes(&self) -> bool;
    fn validate(&self, deadline: &Deadline) -> Result<Option<String>>;
    fn apply(&mut self, commit_version: u64) -> Option<Notification>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K: StoreKey, V: StoreValue> PendingWrites for PendingState<K, V> {
    fn store_name(&self) -> &str {
        self.store.name()
    }

    fn write_count(&self) -> usize {
        self.writes.len() + usize::from(self.cleared)
    }

    fn has_writes(&self) -> bool {
        self.cleared || !self.writes.is_empty()
    }

    fn validate(&self, deadline: &Deadline) -> Result<Option<String>> {
        self.store.validate_reads(&self.reads, deadline)
    }

    fn apply(&mut self, commit_version: u64) -> Option<Notification> {
        let writes = std::mem::take(&mut self.writes);
        self.store.apply_writes(self.cleared, writes, commit_version)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Summary of pending operations that would be rolled back on abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of stores touched
    pub stores: usize,
    /// Number of buffered writes, tombstones and clears
    pub writes: usize,
}

impl PendingOperations {
    /// Check if there are no pending writes
    pub fn is_empty(&self) -> bool {
        self.writes == 0
    }
}

/// Transaction context for OCC
///
/// Created by [`TransactionManager::begin`](crate::TransactionManager::begin)
/// and passed explicitly, as `&mut Transaction`, to every store and index
/// operation.
///
/// # Read-Your-Writes Semantics
///
/// When reading a key, the transaction checks in order:
/// 1. **writes**: returns the uncommitted write or tombstone of this transaction
/// 2. **cleared**: returns None if this transaction cleared the store
/// 3. **committed state**: reads the store, tracking the version when the
///    read is update-intent
pub struct Transaction {
    /// Unique transaction ID
    id: u64,
    /// Global version when the transaction began
    start_version: u64,
    status: TransactionStatus,
    /// Ordered by store id so commit visits stores deterministically
    pending: BTreeMap<StoreId, Box<dyn PendingWrites>>,
    started_at: Instant,
}

impl Transaction {
    pub(crate) fn new(id: u64, start_version: u64) -> Self {
        Self {
            id,
            start_version,
            status: TransactionStatus::Active,
            pending: BTreeMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Unique transaction id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Global version at transaction start
    pub fn start_version(&self) -> u64 {
        self.start_version
    }

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Whether reads and writes are still accepted
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fail with [`Error::TransactionNotActive`] unless active
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::TransactionNotActive {
                state: self.status.to_string(),
            })
        }
    }

    /// Operations that would be discarded by an abort
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            stores: self.pending.len(),
            writes: self.pending.values().map(|p| p.write_count()).sum(),
        }
    }

    pub(crate) fn pending<K: StoreKey, V: StoreValue>(
        &self,
        store: &OrderedStore<K, V>,
    ) -> Option<&PendingState<K, V>> {
        self.pending
            .get(&store.id())
            .and_then(|p| p.as_any().downcast_ref::<PendingState<K, V>>())
    }

    pub(crate) fn pending_mut<K: StoreKey, V: StoreValue>(
        &mut self,
        store: &Arc<OrderedStore<K, V>>,
    ) -> &mut PendingState<K, V> {
        let entry = self
            .pending
            .entry(store.id())
            .or_insert_with(|| Box::new(PendingState::new(Arc::clone(store))));
        match entry.as_any_mut().downcast_mut::<PendingState<K, V>>() {
            Some(state) => state,
            // Store ids are unique per OrderedStore<K, V> instance.
            None => unreachable!("store id bound to a different key/value type"),
        }
    }

    pub(crate) fn pending_stores(&mut self) -> impl Iterator<Item = &mut Box<dyn PendingWrites>> {
        self.pending.values_mut()
    }

    pub(crate) fn has_writes(&self) -> bool {
        self.pending.values().any(|p| p.has_writes())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.pending.clear();
        self.status = TransactionStatus::Committed;
    }

    pub(crate) fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.pending.clear();
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("start_version", &self.start_version)
            .field("status", &self.status)
            .field("pending_stores", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_active() {
        let txn = Transaction::new(7, 42);
        assert!(txn.is_active());
        assert_eq!(txn.id(), 7);
        assert_eq!(txn.start_version(), 42);
        assert!(txn.ensure_active().is_ok());
        assert!(txn.pending_operations().is_empty());
    }

    #[test]
    fn test_aborted_transaction_rejects_use() {
        let mut txn = Transaction::new(1, 0);
        txn.mark_aborted("user abort");
        match txn.ensure_active() {
            Err(Error::TransactionNotActive { state }) => assert!(state.contains("user abort")),
            other => panic!("expected TransactionNotActive, got {:?}", other),
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TransactionStatus::Active.to_string(), "active");
        assert_eq!(TransactionStatus::Committed.to_string(), "committed");
    }
}
