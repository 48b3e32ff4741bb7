//! In-process durable store.
//!
//! All handles created from one [`MemoryStore::new`] share the same entries,
//! the way every tab of a browser shares one origin's local storage.
//! [`MemoryStore::tab`] opens a new handle with its own [`TabId`]; cloning a
//! handle keeps the tab identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::{DurableStore, Envelope, StorageError, StorageEvent, Subscription, TabId};

/// Buffered events per subscriber before it is considered lagging.
const EVENT_CAPACITY: usize = 64;

/// Shared in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    tab: TabId,
}

struct Shared {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<Envelope>,
    next_tab: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store and the first tab onto it.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                events,
                next_tab: AtomicU64::new(1),
            }),
            tab: 0,
        }
    }

    /// Open another tab onto the same entries.
    #[must_use]
    pub fn tab(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            tab: self.shared.next_tab.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identity of this handle.
    #[must_use]
    pub const fn tab_id(&self) -> TabId {
        self.tab
    }

    /// Number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Poisoned`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|_| StorageError::Poisoned)?;
        Ok(entries.len())
    }

    /// True when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Poisoned`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn publish(&self, key: &str, new_value: Option<String>) {
        let envelope = Envelope {
            origin: self.tab,
            event: StorageEvent {
                key: key.to_string(),
                new_value,
            },
        };
        // No receivers is fine: nobody is watching.
        let _ = self.shared.events.send(envelope);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tab", &self.tab)
            .finish_non_exhaustive()
    }
}

impl DurableStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .shared
            .entries
            .read()
            .map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = {
            let mut entries = self
                .shared
                .entries
                .write()
                .map_err(|_| StorageError::Poisoned)?;
            entries.insert(key.to_string(), value.to_string())
        };

        if previous.as_deref() != Some(value) {
            self.publish(key, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let previous = {
            let mut entries = self
                .shared
                .entries
                .write()
                .map_err(|_| StorageError::Poisoned)?;
            entries.remove(key)
        };

        if previous.is_some() {
            self.publish(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.shared.events.subscribe(), self.tab)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::StorageNotice;

    #[test]
    fn test_tabs_share_entries() {
        let first = MemoryStore::new();
        let second = first.tab();
        assert_ne!(first.tab_id(), second.tab_id());

        first.set_item("k", "v").unwrap();
        assert_eq!(second.get_item("k").unwrap().as_deref(), Some("v"));

        second.remove_item("k").unwrap();
        assert_eq!(first.get_item("k").unwrap(), None);
        assert!(first.is_empty().unwrap());
    }

    #[test]
    fn test_remove_absent_key_is_ok() {
        let store = MemoryStore::new();
        store.remove_item("missing").unwrap();
        store.remove_item("missing").unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_other_tab_sees_event() {
        let writer = MemoryStore::new();
        let reader = writer.tab();
        let mut subscription = reader.subscribe();

        writer.set_item("k", "v").unwrap();
        writer.remove_item("k").unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(
            first,
            StorageNotice::Changed(StorageEvent {
                key: "k".to_string(),
                new_value: Some("v".to_string()),
            })
        );
        let StorageNotice::Changed(second) = subscription.recv().await.unwrap() else {
            panic!("expected a change notice");
        };
        assert!(second.is_removal());
    }

    #[tokio::test]
    async fn test_own_writes_are_not_echoed() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe();

        store.set_item("k", "v").unwrap();
        store.tab().set_item("other", "x").unwrap();

        let StorageNotice::Changed(event) = subscription.recv().await.unwrap() else {
            panic!("expected a change notice");
        };
        assert_eq!(event.key, "other");
    }

    #[tokio::test]
    async fn test_unchanged_writes_are_silent() {
        let writer = MemoryStore::new();
        let mut subscription = writer.tab().subscribe();

        writer.set_item("k", "v").unwrap();
        writer.set_item("k", "v").unwrap();
        writer.remove_item("absent").unwrap();

        assert!(subscription.recv().await.is_some());
        let next = tokio::time::timeout(Duration::from_millis(20), subscription.recv()).await;
        assert!(next.is_err(), "no further events expected");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let writer = MemoryStore::new();
        let mut subscription = writer.tab().subscribe();

        for i in 0..(EVENT_CAPACITY + 10) {
            writer.set_item("k", &i.to_string()).unwrap();
        }

        assert!(matches!(
            subscription.recv().await,
            Some(StorageNotice::Missed(_))
        ));
    }

    #[test]
    fn test_blank_value_counts_as_removal() {
        let event = StorageEvent {
            key: "k".to_string(),
            new_value: Some(String::new()),
        };
        assert!(event.is_removal());
    }
}
