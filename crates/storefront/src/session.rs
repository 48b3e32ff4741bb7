//! Session record persistence.
//!
//! [`SessionStore`] reads and writes [`SessionRecord`]s under the fixed key of
//! each [`Namespace`]. Reads fail soft: anything that is not a well-formed
//! record for its namespace is logged, deleted, and reported as absent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use henhouse_core::{Namespace, RecordError, SessionRecord};
use thiserror::Error;

use crate::clock::Clock;
use crate::storage::{DurableStore, StorageError, Subscription};

/// Errors from writing or clearing a session record.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The durable store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The record could not be serialized.
    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Session records on top of a durable store.
///
/// Cheap to clone; clones share the store and clock.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create a session store over `store`, judging expiry with `clock`.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist `record` under `namespace`'s key, replacing any previous one.
    ///
    /// The caller stamps `issued_at`; nothing is computed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or stored.
    pub fn write(
        &self,
        namespace: Namespace,
        record: &SessionRecord,
    ) -> Result<(), SessionStoreError> {
        let raw = record.encode()?;
        self.store.set_item(namespace.key(), &raw)?;
        tracing::debug!(
            namespace = %namespace,
            identity = %record.identity,
            role = %record.role,
            "Session record written"
        );
        Ok(())
    }

    /// Stored record for `namespace`, without the expiry check.
    ///
    /// Unreadable or malformed entries are deleted and reported as absent.
    #[must_use]
    pub fn read(&self, namespace: Namespace) -> Option<SessionRecord> {
        let raw = match self.store.get_item(namespace.key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "Session read failed");
                return None;
            }
        };

        match SessionRecord::decode(namespace, &raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    namespace = %namespace,
                    error = %e,
                    "Discarding corrupt session record"
                );
                self.discard(namespace);
                None
            }
        }
    }

    /// Stored record for `namespace` if it is still within its TTL.
    ///
    /// An expired record is deleted and reported as absent.
    #[must_use]
    pub fn load_valid(&self, namespace: Namespace) -> Option<SessionRecord> {
        let record = self.read(namespace)?;
        if record.is_valid_at(self.now()) {
            return Some(record);
        }

        tracing::info!(
            namespace = %namespace,
            identity = %record.identity,
            expired_at = %record.expires_at(),
            "Session expired"
        );
        self.discard(namespace);
        None
    }

    /// Remove the record for `namespace`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails.
    pub fn clear(&self, namespace: Namespace) -> Result<(), SessionStoreError> {
        self.store.remove_item(namespace.key())?;
        tracing::debug!(namespace = %namespace, "Session record cleared");
        Ok(())
    }

    /// Observe changes other tabs make to the underlying store.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }

    fn discard(&self, namespace: Namespace) {
        if let Err(e) = self.store.remove_item(namespace.key()) {
            tracing::warn!(namespace = %namespace, error = %e, "Failed to delete session record");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use henhouse_core::Role;

    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_760_000_000_000).unwrap()
    }

    fn setup() -> (MemoryStore, Arc<ManualClock>, SessionStore) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store.clone()), clock.clone());
        (store, clock, sessions)
    }

    #[test]
    fn test_write_then_read() {
        let (_, _, sessions) = setup();
        let record = SessionRecord::new("a@x.com", Role::Customer, t0());

        sessions.write(Namespace::User, &record).unwrap();

        assert_eq!(sessions.read(Namespace::User), Some(record));
        assert_eq!(sessions.read(Namespace::Admin), None);
    }

    #[test]
    fn test_namespaces_are_independent() {
        let (store, _, sessions) = setup();
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Admin, t0()))
            .unwrap();
        sessions
            .write(Namespace::Admin, &SessionRecord::admin("a@x.com", "Ada", t0()))
            .unwrap();

        sessions.clear(Namespace::User).unwrap();

        assert!(sessions.read(Namespace::User).is_none());
        assert!(sessions.read(Namespace::Admin).is_some());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_write_replaces_previous_record() {
        let (_, clock, sessions) = setup();
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Unset, t0()))
            .unwrap();

        clock.advance(TimeDelta::minutes(5));
        let replacement = SessionRecord::new("a@x.com", Role::Customer, clock.now());
        sessions.write(Namespace::User, &replacement).unwrap();

        assert_eq!(sessions.read(Namespace::User), Some(replacement));
    }

    #[test]
    fn test_corrupt_record_is_deleted() {
        let (store, _, sessions) = setup();
        store.set_item(Namespace::USER_KEY, "{not json").unwrap();

        assert!(sessions.read(Namespace::User).is_none());
        assert_eq!(store.get_item(Namespace::USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_wrong_shape_is_deleted() {
        let (store, _, sessions) = setup();
        store
            .set_item(
                Namespace::ADMIN_KEY,
                r#"{"identity":"a@x.com","role":"customer","issuedAt":1760000000000}"#,
            )
            .unwrap();

        assert!(sessions.read(Namespace::Admin).is_none());
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }

    #[test]
    fn test_load_valid_deletes_expired() {
        let (store, clock, sessions) = setup();
        let record = SessionRecord::new("a@x.com", Role::Customer, t0());
        sessions.write(Namespace::User, &record).unwrap();

        clock.advance(TimeDelta::minutes(59));
        assert_eq!(sessions.load_valid(Namespace::User), Some(record));

        clock.set(t0() + TimeDelta::hours(1));
        assert_eq!(sessions.load_valid(Namespace::User), None);
        assert_eq!(store.get_item(Namespace::USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _, sessions) = setup();
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        sessions.clear(Namespace::User).unwrap();
        let after_once = store.get_item(Namespace::USER_KEY).unwrap();
        sessions.clear(Namespace::User).unwrap();
        let after_twice = store.get_item(Namespace::USER_KEY).unwrap();

        assert_eq!(after_once, None);
        assert_eq!(after_once, after_twice);
    }
}
