//! Auth context: the in-memory view of who is signed in.
//!
//! An [`AuthContext`] is created once when the app starts and handed to every
//! component that needs it. It owns the user-namespace session and keeps an
//! [`AuthState`] that guards read.
//!
//! # Lifecycle
//!
//! 1. [`AuthContext::init`] spawns rehydration: the stored user session is
//!    loaded and revalidated against the identity API. Until that finishes the
//!    state reports `loading`.
//! 2. [`login`](AuthContext::login), [`logout`](AuthContext::logout) and
//!    [`set_role`](AuthContext::set_role) update the store and the state
//!    together. Each cancels a rehydration still in flight so it cannot
//!    overwrite the newer state.
//! 3. [`teardown`](AuthContext::teardown) stops background work.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use henhouse_core::{Namespace, Profile, Role, SessionRecord};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::identity::IdentityProvider;
use crate::session::{SessionStore, SessionStoreError};

/// Errors from auth context updates.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The operation needs a valid user session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Persisting the session failed.
    #[error("session store error: {0}")]
    Store(#[from] SessionStoreError),
}

/// Snapshot of the user-level auth state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Rehydration has not finished yet.
    pub loading: bool,
    /// Current user session, if any.
    pub session: Option<SessionRecord>,
    /// Profile as last seen from the identity API.
    pub profile: Option<Profile>,
}

impl AuthState {
    const fn pending() -> Self {
        Self {
            loading: true,
            session: None,
            profile: None,
        }
    }

    /// Session if it is still within its TTL at `now`.
    #[must_use]
    pub fn valid_session(&self, now: DateTime<Utc>) -> Option<&SessionRecord> {
        self.session
            .as_ref()
            .filter(|record| record.is_valid_at(now))
    }

    /// True when a session exists and is within its TTL at `now`.
    #[must_use]
    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_session(now).is_some()
    }
}

/// Shared handle on the auth state.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: SessionStore,
    identity: Arc<dyn IdentityProvider>,
    state: watch::Sender<AuthState>,
    rehydration: Mutex<Option<JoinHandle<()>>>,
}

impl AuthContext {
    /// Create the context and start rehydrating it in the background.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn init(sessions: SessionStore, identity: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(AuthState::pending());
        let context = Self {
            inner: Arc::new(Inner {
                sessions,
                identity,
                state,
                rehydration: Mutex::new(None),
            }),
        };

        let inner = Arc::clone(&context.inner);
        let handle = tokio::spawn(async move { inner.rehydrate().await });
        *context.rehydration_slot() = Some(handle);

        context
    }

    /// The session store this context writes to.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// The identity API this context revalidates against.
    #[must_use]
    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.inner.identity
    }

    /// Current state, with an expired session dropped.
    ///
    /// When the in-memory session has expired the store is consulted again:
    /// a valid record written meanwhile by another tab is adopted, and only
    /// an expired stored record is deleted.
    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        let state = self.inner.state.borrow().clone();
        if state.loading {
            return state;
        }

        match &state.session {
            Some(record) if !record.is_valid_at(self.inner.sessions.now()) => {
                tracing::info!(identity = %record.identity, "User session expired");
                let refreshed = match self.inner.sessions.load_valid(Namespace::User) {
                    Some(stored) => {
                        tracing::info!(
                            identity = %stored.identity,
                            "Adopting session written by another tab"
                        );
                        let profile = state
                            .profile
                            .filter(|profile| profile.identity == stored.identity);
                        AuthState {
                            loading: false,
                            session: Some(stored),
                            profile,
                        }
                    }
                    None => AuthState::default(),
                };
                self.inner.state.send_replace(refreshed.clone());
                refreshed
            }
            _ => state,
        }
    }

    /// Wait until rehydration has finished, then return the state.
    pub async fn ready(&self) -> AuthState {
        let mut receiver = self.inner.state.subscribe();
        if receiver.wait_for(|state| !state.loading).await.is_err() {
            return AuthState::default();
        }
        self.snapshot()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Start a user session for `profile`, stamped now.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub fn login(&self, profile: Profile) -> Result<SessionRecord, ContextError> {
        self.cancel_rehydration();

        let record = SessionRecord::new(
            profile.identity.clone(),
            profile.role,
            self.inner.sessions.now(),
        );
        self.inner.sessions.write(Namespace::User, &record)?;

        tracing::info!(identity = %record.identity, role = %record.role, "User logged in");
        self.inner.state.send_replace(AuthState {
            loading: false,
            session: Some(record.clone()),
            profile: Some(profile),
        });
        Ok(record)
    }

    /// End the user session.
    ///
    /// The admin namespace is left alone; see
    /// [`AdminSessions::sign_out`](crate::admin_session::AdminSessions::sign_out).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be removed.
    pub fn logout(&self) -> Result<(), ContextError> {
        self.cancel_rehydration();
        self.inner.sessions.clear(Namespace::User)?;
        self.inner.state.send_replace(AuthState::default());
        tracing::info!("User logged out");
        Ok(())
    }

    /// Replace the user session with one carrying `role`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NotAuthenticated`] without a valid session, or
    /// a store error if the new record cannot be persisted.
    pub fn set_role(&self, role: Role) -> Result<SessionRecord, ContextError> {
        let current = self.snapshot();
        let previous = current
            .valid_session(self.inner.sessions.now())
            .ok_or(ContextError::NotAuthenticated)?;

        let record = SessionRecord::new(
            previous.identity.clone(),
            role,
            self.inner.sessions.now(),
        );
        self.inner.sessions.write(Namespace::User, &record)?;

        let profile = current.profile.map(|profile| Profile { role, ..profile });
        self.inner.state.send_replace(AuthState {
            loading: false,
            session: Some(record.clone()),
            profile,
        });
        tracing::info!(identity = %record.identity, role = %role, "User role changed");
        Ok(record)
    }

    /// Stop background work and forget the in-memory state.
    ///
    /// The durable store is untouched.
    pub fn teardown(self) {
        self.cancel_rehydration();
        self.inner.state.send_replace(AuthState::default());
    }

    fn cancel_rehydration(&self) {
        if let Some(handle) = self.rehydration_slot().take() {
            handle.abort();
        }
    }

    fn rehydration_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .rehydration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    async fn rehydrate(&self) {
        let Some(record) = self.sessions.load_valid(Namespace::User) else {
            tracing::debug!("No stored user session");
            self.settle(AuthState::default());
            return;
        };

        match self.identity.fetch_profile(&record.identity).await {
            Ok(profile) => {
                tracing::info!(identity = %record.identity, "User session restored");
                self.settle(AuthState {
                    loading: false,
                    session: Some(record),
                    profile: Some(profile),
                });
            }
            Err(e) => {
                tracing::warn!(
                    identity = %record.identity,
                    error = %e,
                    "Profile revalidation failed, treating as signed out"
                );
                self.settle(AuthState::default());
            }
        }
    }

    /// Publish the rehydrated state unless an update already replaced it.
    fn settle(&self, resolved: AuthState) {
        self.state.send_if_modified(|state| {
            if !state.loading {
                return false;
            }
            *state = resolved;
            true
        });
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeDelta;
    use henhouse_core::Identity;
    use tokio::sync::Notify;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::services::identity::IdentityError;
    use crate::storage::{DurableStore, MemoryStore};

    /// Identity API double: answers from a fixed profile, optionally failing
    /// or waiting for a go-ahead.
    pub(crate) struct FakeIdentity {
        pub(crate) profile: Profile,
        pub(crate) fail: bool,
        pub(crate) gate: Option<Arc<Notify>>,
        pub(crate) role_updates: AtomicUsize,
    }

    impl FakeIdentity {
        pub(crate) fn new(profile: Profile) -> Self {
            Self {
                profile,
                fail: false,
                gate: None,
                role_updates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn fetch_profile(&self, _identity: &Identity) -> Result<Profile, IdentityError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(IdentityError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.profile.clone())
        }

        async fn update_role(&self, _identity: &Identity, _role: Role) -> Result<(), IdentityError> {
            if self.fail {
                return Err(IdentityError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.role_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_760_000_000_000).unwrap()
    }

    pub(crate) fn customer() -> Profile {
        Profile {
            identity: Identity::new("a@x.com"),
            role: Role::Customer,
            eligible_for_admin: false,
            name: None,
        }
    }

    fn setup(identity: FakeIdentity) -> (MemoryStore, Arc<ManualClock>, SessionStore, Arc<FakeIdentity>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store.clone()), clock.clone());
        (store, clock, sessions, Arc::new(identity))
    }

    #[tokio::test]
    async fn test_rehydrates_stored_session() {
        let (_, clock, sessions, identity) = setup(FakeIdentity::new(customer()));
        let record = SessionRecord::new("a@x.com", Role::Customer, t0());
        sessions.write(Namespace::User, &record).unwrap();
        clock.advance(TimeDelta::minutes(10));

        let context = AuthContext::init(sessions, identity);
        let state = context.ready().await;

        assert!(!state.loading);
        assert_eq!(state.session, Some(record));
        assert_eq!(state.profile, Some(customer()));
    }

    #[tokio::test]
    async fn test_loading_until_rehydration_finishes() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakeIdentity::new(customer());
        fake.gate = Some(Arc::clone(&gate));
        let (_, _, sessions, identity) = setup(fake);
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        let context = AuthContext::init(sessions, identity);
        tokio::task::yield_now().await;
        assert!(context.snapshot().loading);

        gate.notify_one();
        assert!(context.ready().await.session.is_some());
    }

    #[tokio::test]
    async fn test_revalidation_failure_fails_closed() {
        let mut fake = FakeIdentity::new(customer());
        fake.fail = true;
        let (store, _, sessions, identity) = setup(fake);
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        let context = AuthContext::init(sessions, identity);
        let state = context.ready().await;

        assert!(!state.loading);
        assert!(state.session.is_none());
        // Kept for the next start; a flaky network is not a logout.
        assert!(store.get_item(Namespace::USER_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_session_not_restored() {
        let (store, clock, sessions, identity) = setup(FakeIdentity::new(customer()));
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();
        clock.advance(TimeDelta::minutes(61));

        let context = AuthContext::init(sessions, identity);
        assert!(context.ready().await.session.is_none());
        assert!(store.get_item(Namespace::USER_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_drops_session_that_expires_while_open() {
        let (store, clock, sessions, identity) = setup(FakeIdentity::new(customer()));
        let context = AuthContext::init(sessions, identity);
        context.ready().await;

        context.login(customer()).unwrap();
        assert!(context.snapshot().session.is_some());

        clock.advance(TimeDelta::hours(1));
        assert!(context.snapshot().session.is_none());
        assert!(store.get_item(Namespace::USER_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_keeps_fresh_record_from_other_tab() {
        let (store, clock, sessions, identity) = setup(FakeIdentity::new(customer()));
        let context = AuthContext::init(sessions, identity);
        context.ready().await;
        context.login(customer()).unwrap();

        clock.advance(TimeDelta::minutes(50));
        let other_tab = SessionStore::new(Arc::new(store.tab()), clock.clone());
        let fresh = SessionRecord::new("a@x.com", Role::Customer, clock.now());
        other_tab.write(Namespace::User, &fresh).unwrap();

        clock.advance(TimeDelta::minutes(11));
        let state = context.snapshot();

        assert_eq!(state.session, Some(fresh.clone()));
        assert_eq!(state.profile, Some(customer()));
        assert_eq!(other_tab.read(Namespace::User), Some(fresh));
    }

    #[tokio::test]
    async fn test_login_logout() {
        let (store, _, sessions, identity) = setup(FakeIdentity::new(customer()));
        let context = AuthContext::init(sessions, identity);
        context.ready().await;

        let record = context.login(customer()).unwrap();
        assert_eq!(record.issued_at, t0());
        assert_eq!(context.snapshot().session, Some(record));

        context.logout().unwrap();
        assert!(context.snapshot().session.is_none());
        assert!(store.get_item(Namespace::USER_KEY).unwrap().is_none());

        // Logging out twice is harmless.
        context.logout().unwrap();
    }

    #[tokio::test]
    async fn test_login_wins_over_slow_rehydration() {
        let gate = Arc::new(Notify::new());
        let mut fake = FakeIdentity::new(customer());
        fake.gate = Some(Arc::clone(&gate));
        fake.fail = true;
        let (_, _, sessions, identity) = setup(fake);
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        let context = AuthContext::init(sessions, identity);
        context.login(customer()).unwrap();
        gate.notify_one();
        tokio::task::yield_now().await;

        assert!(context.ready().await.session.is_some());
    }

    #[tokio::test]
    async fn test_set_role_replaces_record() {
        let mut unset = customer();
        unset.role = Role::Unset;
        let (_, clock, sessions, identity) = setup(FakeIdentity::new(unset.clone()));
        let context = AuthContext::init(sessions.clone(), identity);
        context.ready().await;
        context.login(unset).unwrap();

        clock.advance(TimeDelta::minutes(2));
        let record = context.set_role(Role::Customer).unwrap();

        assert_eq!(record.role, Role::Customer);
        assert_eq!(record.issued_at, t0() + TimeDelta::minutes(2));
        assert_eq!(sessions.read(Namespace::User), Some(record));
        assert_eq!(
            context.snapshot().profile.map(|p| p.role),
            Some(Role::Customer)
        );
    }

    #[tokio::test]
    async fn test_set_role_requires_session() {
        let (_, _, sessions, identity) = setup(FakeIdentity::new(customer()));
        let context = AuthContext::init(sessions, identity);
        context.ready().await;

        assert!(matches!(
            context.set_role(Role::Customer),
            Err(ContextError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_teardown_resets_state() {
        let (store, _, sessions, identity) = setup(FakeIdentity::new(customer()));
        let context = AuthContext::init(sessions, identity);
        context.ready().await;
        context.login(customer()).unwrap();

        let observer = context.clone();
        context.teardown();

        assert_eq!(observer.snapshot(), AuthState::default());
        assert!(store.get_item(Namespace::USER_KEY).unwrap().is_some());
    }
}
