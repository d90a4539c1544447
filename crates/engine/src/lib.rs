//! Transactional secondary indexing for keyspan
//!
//! This crate layers secondary indexes over the ordered transactional store:
//! - index: filter and search index definitions, tokenizer, filter values
//! - collection: the indexed collection facade and key-to-value join
//! - database: registry, transactions and collection lifecycle
//! - config: `keyspan.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod config;
pub mod database;
pub mod index;

pub use collection::{IndexedCollection, KeySource, KeyValueJoin};
pub use config::{IndexConfig, CONFIG_FILE_NAME};
pub use database::{Database, RetryConfig};
pub use index::{
    tokenize, tokenize_str, FilterDefinition, FilterIndex, FilterKeys, FilterValue,
    IndexDefinition, IndexKind, IndexMaintenance, OrderedF64, PostingList, PropertyTable,
    SearchIndex, NULL_SENTINEL,
};

pub use keyspan_core::{
    CancellationToken, EnumerationMode, Error, LockMode, OpOptions, RangeBound, Result,
};
pub use keyspan_storage::{
    ChangeEvent, OrderedStore, RangeScan, StoreRegistry, SubscriptionId, Transaction,
    TransactionStatus,
};
