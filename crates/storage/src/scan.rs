//! Lazy iterator over a materialized range scan

use keyspan_core::{CancellationToken, Result};
use std::collections::VecDeque;

/// Entries produced by [`OrderedStore::range_scan`](crate::OrderedStore::range_scan)
///
/// The matching entries are copied out of the store under its read lock
/// when the scan is created, so memory grows with the size of the range.
/// Only iteration and cancellation are lazy: commits made after creation
/// are not visible to an existing scan.
///
/// Each call to `next` checks the cancellation token first. After a
/// cancellation error the iterator is exhausted.
#[derive(Debug)]
pub struct RangeScan<K, V> {
    items: VecDeque<(K, V)>,
    cancel: CancellationToken,
    done: bool,
}

impl<K, V> RangeScan<K, V> {
    pub(crate) fn new(items: Vec<(K, V)>, cancel: CancellationToken) -> Self {
        Self {
            items: items.into(),
            cancel,
            done: false,
        }
    }

    /// Entries not yet yielded
    pub fn remaining(&self) -> usize {
        if self.done {
            0
        } else {
            self.items.len()
        }
    }
}

impl<K, V> Iterator for RangeScan<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.cancel.check() {
            self.done = true;
            return Some(Err(e));
        }
        let item = self.items.pop_front();
        if item.is_none() {
            self.done = true;
        }
        item.map(Ok)
    }
}
