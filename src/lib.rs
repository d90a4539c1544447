//! keyspan - Transactional secondary indexes over an ordered key-value store
//!
//! keyspan keeps filter and search indexes in sync with a primary collection
//! inside the same optimistic transaction, so index queries always agree
//! with the data they point at.
//!
//! # Quick Start
//!
//! ```ignore
//! use keyspan::{Database, FilterIndex, SearchIndex};
//!
//! let db = Database::new();
//! let people = db.open_indexed("people", vec![
//!     FilterIndex::new("city", |_: &u32, p: &Person| p.city.clone())?.into(),
//!     SearchIndex::new("name", |_: &u32, p: &Person| Some(p.name.clone()))?.into(),
//! ])?;
//!
//! db.transaction(|tx| people.add(tx, 1, person))?;
//!
//! let mut tx = db.begin();
//! let doe = people.search_keys(&mut tx, "doe", 10)?;
//! ```
//!
//! # Architecture
//!
//! - `keyspan-core`: errors and per-operation options
//! - `keyspan-storage`: ordered stores, transactions, store registry
//! - `keyspan-engine`: indexes, indexed collections, database lifecycle

pub use keyspan_engine::*;
