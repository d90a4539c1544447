//! Core types for keyspan
//!
//! This crate defines the foundational types shared by the storage and
//! indexing layers:
//! - Error: Error type hierarchy
//! - OpOptions: Per-operation timeout and cancellation
//! - LockMode, EnumerationMode, RangeBound: Read hints and range endpoints

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod options;

pub use error::{Error, Result};
pub use options::{CancellationToken, Deadline, EnumerationMode, LockMode, OpOptions, RangeBound};
