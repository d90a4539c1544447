//! Indexing Integration Tests
//!
//! Cross-crate scenarios driven through the top-level `keyspan` API.

mod common;

mod catalog;
mod isolation;
