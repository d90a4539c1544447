//! Storage layer for keyspan
//!
//! This crate implements the in-memory transactional store the index layer
//! builds on:
//! - OrderedStore: BTreeMap-based ordered store with RwLock
//! - Transaction: per-store write sets, read sets and read-your-writes
//! - TransactionManager: OCC commit protocol (first-committer-wins)
//! - StoreRegistry: named, type-erased store lookup
//! - ChangeEvent: post-commit change notifications

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod manager;
pub mod registry;
pub mod scan;
pub mod store;
pub mod transaction;

pub use events::{ChangeEvent, ChangeListener, SubscriptionId};
pub use manager::TransactionManager;
pub use registry::StoreRegistry;
pub use scan::RangeScan;
pub use store::{GetOrAdded, OrderedStore, StoreId, StoreKey, StoreValue, Upserted, Versioned};
pub use transaction::{PendingOperations, Transaction, TransactionStatus};
