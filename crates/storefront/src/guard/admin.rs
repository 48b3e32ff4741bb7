//! Admin-level route guard.
//!
//! The admin guard does not consult the [`AuthContext`](crate::AuthContext).
//! It reads the admin namespace itself when the view mounts, then keeps
//! watching the durable store: if another tab removes the admin record while
//! the view is authorized, the guard flips to
//! [`AdminGateState::Unauthorized`] and navigates to the admin login page
//! without waiting for the next navigation.

use std::sync::Arc;

use henhouse_core::Namespace;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{GateDecision, Mount, Navigator, Redirect};
use crate::session::SessionStore;
use crate::storage::{StorageNotice, Subscription};

/// Where an admin guard is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminGateState {
    /// Admin namespace not read yet.
    #[default]
    Checking,
    /// A valid admin record was found.
    Authorized,
    /// No valid admin record; terminal until a new gate is mounted.
    Unauthorized,
}

/// Guard for admin-only views.
pub struct AdminAuthGate {
    sessions: SessionStore,
    navigator: Arc<dyn Navigator>,
    admin_login: String,
    state: Arc<watch::Sender<AdminGateState>>,
    mount: Mount,
    listener: Option<JoinHandle<()>>,
}

impl AdminAuthGate {
    /// Create a guard for one admin view.
    #[must_use]
    pub fn new(
        sessions: SessionStore,
        navigator: Arc<dyn Navigator>,
        admin_login: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(AdminGateState::Checking);
        Self {
            sessions,
            navigator,
            admin_login: admin_login.into(),
            state: Arc::new(state),
            mount: Mount::new(),
            listener: None,
        }
    }

    /// Liveness token of the guarded view.
    ///
    /// Unmounting any clone has the same effect as [`unmount`](Self::unmount)
    /// for decisions still pending.
    #[must_use]
    pub fn mount_token(&self) -> Mount {
        self.mount.clone()
    }

    /// Read the admin namespace and decide.
    ///
    /// The returned decision is for the caller to apply. Returns `None` if the
    /// view was unmounted before the read completed. When authorized, the
    /// guard starts watching for sign-outs made in other tabs.
    pub async fn mount(&mut self) -> Option<GateDecision> {
        self.stop_listener();

        // Subscribe first so a sign-out racing the read is not lost.
        let subscription = self.sessions.subscribe();
        tokio::task::yield_now().await;

        if !self.mount.is_mounted() {
            subscription.unsubscribe();
            return None;
        }

        match self.sessions.load_valid(Namespace::Admin) {
            Some(record) => {
                tracing::debug!(identity = %record.identity, "Admin session valid");
                self.state.send_replace(AdminGateState::Authorized);
                self.listener = Some(tokio::spawn(watch_admin_key(
                    subscription,
                    self.sessions.clone(),
                    Arc::clone(&self.state),
                    Arc::clone(&self.navigator),
                    self.mount.clone(),
                    Redirect::to(&self.admin_login),
                )));
                Some(GateDecision::Allow)
            }
            None => {
                tracing::debug!("No valid admin session, redirecting to admin login");
                subscription.unsubscribe();
                self.state.send_replace(AdminGateState::Unauthorized);
                Some(GateDecision::Redirect(Redirect::to(&self.admin_login)))
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AdminGateState {
        *self.state.borrow()
    }

    /// The decision matching the current state.
    #[must_use]
    pub fn decision(&self) -> GateDecision {
        match self.state() {
            AdminGateState::Checking => GateDecision::Pending,
            AdminGateState::Authorized => GateDecision::Allow,
            AdminGateState::Unauthorized => {
                GateDecision::Redirect(Redirect::to(&self.admin_login))
            }
        }
    }

    /// Observe state transitions.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AdminGateState> {
        self.state.subscribe()
    }

    /// Tear the guard down: stop watching the store and drop pending
    /// decisions.
    pub fn unmount(&mut self) {
        self.mount.unmount();
        self.stop_listener();
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for AdminAuthGate {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for AdminAuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuthGate")
            .field("state", &self.state())
            .field("admin_login", &self.admin_login)
            .field("mounted", &self.mount.is_mounted())
            .finish_non_exhaustive()
    }
}

/// Wait for the admin record to disappear, then revoke.
async fn watch_admin_key(
    mut subscription: Subscription,
    sessions: SessionStore,
    state: Arc<watch::Sender<AdminGateState>>,
    navigator: Arc<dyn Navigator>,
    mount: Mount,
    redirect: Redirect,
) {
    while let Some(notice) = subscription.recv().await {
        let revoked = match notice {
            StorageNotice::Changed(event) if event.key == Namespace::ADMIN_KEY => {
                event.is_removal() || sessions.load_valid(Namespace::Admin).is_none()
            }
            StorageNotice::Changed(_) => false,
            StorageNotice::Missed(_) => sessions.load_valid(Namespace::Admin).is_none(),
        };
        if !revoked {
            continue;
        }

        if mount.is_mounted() {
            tracing::info!("Admin session cleared in another tab");
            state.send_replace(AdminGateState::Unauthorized);
            navigator.navigate(redirect);
        }
        break;
    }
    subscription.unsubscribe();
}
