//! Durable key-value store shared by every tab of the storefront.
//!
//! The storefront keeps its session records in a string-to-string store that
//! outlives a single page and is visible to every open tab. Mutations made in
//! one tab are announced to the others as [`StorageEvent`]s; the tab that made
//! the change is not notified of its own write.
//!
//! # Observers
//!
//! [`DurableStore::subscribe`] hands out a [`Subscription`]. Dropping it or
//! calling [`Subscription::unsubscribe`] detaches the observer.

mod memory;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};

pub use memory::MemoryStore;

/// Identifier of one handle (tab) onto a shared store.
pub type TabId = u64;

/// Errors raised by a durable store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A writer panicked while holding the store lock.
    #[error("storage lock poisoned")]
    Poisoned,

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A change made to the store by another tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed.
    pub key: String,
    /// Value after the change; `None` when the key was removed.
    pub new_value: Option<String>,
}

impl StorageEvent {
    /// True when the key was removed or blanked.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.new_value.as_deref().is_none_or(str::is_empty)
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageNotice {
    /// Another tab changed a key.
    Changed(StorageEvent),
    /// The subscriber fell behind and this many events were dropped.
    /// Anything it cares about must be re-read from the store.
    Missed(u64),
}

/// A client-side durable key-value store.
pub trait DurableStore: Send + Sync {
    /// Value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Observe changes made by other tabs.
    fn subscribe(&self) -> Subscription;
}

/// Event as carried on the shared channel, tagged with the writing tab.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub(crate) origin: TabId,
    pub(crate) event: StorageEvent,
}

/// Handle on the stream of changes made by other tabs.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Envelope>,
    tab: TabId,
}

impl Subscription {
    pub(crate) const fn new(receiver: broadcast::Receiver<Envelope>, tab: TabId) -> Self {
        Self { receiver, tab }
    }

    /// Wait for the next change made by another tab.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn recv(&mut self) -> Option<StorageNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.tab => {}
                Ok(envelope) => return Some(StorageNotice::Changed(envelope.event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, tab = self.tab, "Storage subscriber lagged");
                    return Some(StorageNotice::Missed(skipped));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Stop observing.
    pub fn unsubscribe(self) {
        tracing::trace!(tab = self.tab, "Storage subscription closed");
    }
}
