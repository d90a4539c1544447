//! Change notifications for committed writes
//!
//! Listeners registered on an [`OrderedStore`](crate::OrderedStore) are
//! called once per changed key after a commit has been applied and the
//! commit lock released. Aborted or read-only transactions never notify.
//!
//! Events of one commit are delivered in order: `Cleared` first when the
//! transaction cleared the store, then one event per written key in key
//! order. Writes that changed nothing visible (removing an absent key) are
//! not reported.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe
pub type SubscriptionId = u64;

/// One committed change to a store
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<K, V> {
    /// `key` did not exist and now holds `value`
    Added {
        /// Written key
        key: K,
        /// New value
        value: V,
    },
    /// `key` changed from `old` to `new`
    Updated {
        /// Written key
        key: K,
        /// Value before the commit
        old: V,
        /// Value after the commit
        new: V,
    },
    /// `key` was deleted
    Removed {
        /// Deleted key
        key: K,
        /// Value before the commit
        old: V,
    },
    /// Every committed entry was dropped
    Cleared,
}

impl<K, V> ChangeEvent<K, V> {
    /// Key the event is about; `None` for `Cleared`
    pub fn key(&self) -> Option<&K> {
        match self {
            ChangeEvent::Added { key, .. }
            | ChangeEvent::Updated { key, .. }
            | ChangeEvent::Removed { key, .. } => Some(key),
            ChangeEvent::Cleared => None,
        }
    }
}

/// Listener callback: commit version and the event
pub type ChangeListener<K, V> = Arc<dyn Fn(u64, &ChangeEvent<K, V>) + Send + Sync>;

/// Deferred delivery of one store's events, run after the commit lock is released
pub(crate) type Notification = Box<dyn FnOnce() + Send>;

/// Registered listeners of one store
pub(crate) struct ChangeListeners<K, V> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, ChangeListener<K, V>)>>,
}

impl<K, V> ChangeListeners<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, listener: ChangeListener<K, V>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `events` to every listener registered right now
    pub(crate) fn notify(&self, version: u64, events: &[ChangeEvent<K, V>]) {
        // Called without the listener lock held.
        let listeners: Vec<ChangeListener<K, V>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in events {
            for listener in &listeners {
                listener(version, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let listeners: ChangeListeners<u32, u32> = ChangeListeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = listeners.subscribe(Arc::new(move |version, event: &ChangeEvent<u32, u32>| {
            sink.lock().push((version, event.clone()));
        }));
        assert_eq!(listeners.len(), 1);

        listeners.notify(3, &[ChangeEvent::Added { key: 1, value: 10 }, ChangeEvent::Cleared]);
        assert_eq!(
            *seen.lock(),
            vec![(3, ChangeEvent::Added { key: 1, value: 10 }), (3, ChangeEvent::Cleared)]
        );

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        assert!(listeners.is_empty());
        listeners.notify(4, &[ChangeEvent::Cleared]);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_event_key() {
        assert_eq!(ChangeEvent::<u32, u32>::Removed { key: 5, old: 1 }.key(), Some(&5));
        assert_eq!(ChangeEvent::<u32, u32>::Cleared.key(), None);
    }
}
