//! User-level route guard.

use chrono::{DateTime, Utc};

use super::{GateDecision, GatePaths, Mount, Redirect, requires_auth};
use crate::context::{AuthContext, AuthState};

/// Guard for routes marked with a `require_auth` flag.
///
/// | state              | `require_auth = true`   | `require_auth = false` |
/// |--------------------|-------------------------|------------------------|
/// | loading            | Pending                 | Pending                |
/// | no valid session   | Redirect login (+from)  | Allow                  |
/// | valid session      | Allow                   | Redirect dashboard     |
///
/// The guard never writes to the session store.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    paths: GatePaths,
}

impl AuthGate {
    /// Create a guard redirecting to `paths`.
    #[must_use]
    pub const fn new(paths: GatePaths) -> Self {
        Self { paths }
    }

    /// Pure decision for a route with metadata `require_auth` (missing means
    /// protected), requested as `requested`, given `state` at `now`.
    #[must_use]
    pub fn decide(
        &self,
        require_auth: Option<bool>,
        requested: &str,
        state: &AuthState,
        now: DateTime<Utc>,
    ) -> GateDecision {
        if state.loading {
            return GateDecision::Pending;
        }

        let authenticated = state.is_authenticated_at(now);
        match (requires_auth(require_auth), authenticated) {
            (true, false) => {
                tracing::debug!(path = requested, "Unauthenticated, redirecting to login");
                GateDecision::Redirect(Redirect::with_return(&self.paths.login, requested))
            }
            (false, true) => {
                tracing::debug!(path = requested, "Already signed in, redirecting to dashboard");
                GateDecision::Redirect(Redirect::to(&self.paths.dashboard))
            }
            _ => GateDecision::Allow,
        }
    }

    /// Decide from the context's current state without waiting.
    ///
    /// Returns [`GateDecision::Pending`] while rehydration is in flight.
    #[must_use]
    pub fn evaluate(
        &self,
        context: &AuthContext,
        require_auth: Option<bool>,
        requested: &str,
    ) -> GateDecision {
        let state = context.snapshot();
        self.decide(require_auth, requested, &state, context.sessions().now())
    }

    /// Wait for rehydration, then decide.
    ///
    /// Returns `None` if `mount` was unmounted while waiting.
    pub async fn check(
        &self,
        context: &AuthContext,
        require_auth: Option<bool>,
        requested: &str,
        mount: &Mount,
    ) -> Option<GateDecision> {
        let state = context.ready().await;
        if !mount.is_mounted() {
            tracing::debug!(path = requested, "View unmounted before guard resolved");
            return None;
        }
        Some(self.decide(
            require_auth,
            requested,
            &state,
            context.sessions().now(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use henhouse_core::{Namespace, Role, SessionRecord};
    use tokio::sync::Notify;

    use super::*;
    use crate::clock::ManualClock;
    use crate::context::tests::{FakeIdentity, customer, t0};
    use crate::session::SessionStore;
    use crate::storage::MemoryStore;

    fn signed_in(at: DateTime<Utc>) -> AuthState {
        AuthState {
            loading: false,
            session: Some(SessionRecord::new("a@x.com", Role::Customer, at)),
            profile: None,
        }
    }

    #[test]
    fn test_pending_while_loading() {
        let gate = AuthGate::default();
        let loading = AuthState {
            loading: true,
            ..AuthState::default()
        };
        assert_eq!(
            gate.decide(Some(true), "/dashboard", &loading, t0()),
            GateDecision::Pending
        );
        assert_eq!(
            gate.decide(Some(false), "/login", &loading, t0()),
            GateDecision::Pending
        );
    }

    #[test]
    fn test_protected_route_redirects_with_return_path() {
        let gate = AuthGate::default();
        let decision = gate.decide(Some(true), "/booking", &AuthState::default(), t0());
        assert_eq!(
            decision,
            GateDecision::Redirect(Redirect::with_return("/login", "/booking"))
        );
    }

    #[test]
    fn test_missing_metadata_is_protected() {
        let gate = AuthGate::default();
        let decision = gate.decide(None, "/orders", &AuthState::default(), t0());
        assert_eq!(
            decision.redirect().map(|r| r.to.as_str()),
            Some("/login")
        );
    }

    #[test]
    fn test_login_page_bounces_signed_in_user() {
        let gate = AuthGate::default();
        let decision = gate.decide(Some(false), "/login", &signed_in(t0()), t0());
        assert_eq!(decision, GateDecision::Redirect(Redirect::to("/dashboard")));
    }

    #[test]
    fn test_allow_cases() {
        let gate = AuthGate::default();
        assert!(gate.decide(Some(true), "/dashboard", &signed_in(t0()), t0()).is_allow());
        assert!(gate.decide(Some(false), "/login", &AuthState::default(), t0()).is_allow());
    }

    #[test]
    fn test_expiry_boundary() {
        let gate = AuthGate::default();
        let state = signed_in(t0());

        let before = t0() + TimeDelta::minutes(59);
        assert!(gate.decide(Some(true), "/dashboard", &state, before).is_allow());

        let at_ttl = t0() + TimeDelta::hours(1);
        assert!(!gate.decide(Some(true), "/dashboard", &state, at_ttl).is_allow());

        let after = t0() + TimeDelta::minutes(61);
        assert_eq!(
            gate.decide(Some(true), "/dashboard", &state, after),
            GateDecision::Redirect(Redirect::with_return("/login", "/dashboard"))
        );
    }

    #[test]
    fn test_custom_paths() {
        let gate = AuthGate::new(GatePaths {
            login: "/sign-in".to_string(),
            dashboard: "/me".to_string(),
            admin_login: "/staff/sign-in".to_string(),
        });
        let decision = gate.decide(Some(true), "/cart", &AuthState::default(), t0());
        assert_eq!(decision.redirect().map(Redirect::location).as_deref(), Some("/sign-in?next=%2Fcart"));
    }

    #[tokio::test]
    async fn test_check_waits_for_rehydration() {
        let notify = Arc::new(Notify::new());
        let mut fake = FakeIdentity::new(customer());
        fake.gate = Some(Arc::clone(&notify));

        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store), clock);
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        let context = AuthContext::init(sessions, Arc::new(fake));
        let gate = AuthGate::default();
        assert_eq!(
            gate.evaluate(&context, Some(true), "/dashboard"),
            GateDecision::Pending
        );

        let mount = Mount::new();
        let pending = {
            let context = context.clone();
            let gate = gate.clone();
            let mount = mount.clone();
            tokio::spawn(async move { gate.check(&context, Some(true), "/dashboard", &mount).await })
        };
        notify.notify_one();

        assert_eq!(pending.await.unwrap(), Some(GateDecision::Allow));
    }

    #[tokio::test]
    async fn test_check_drops_decision_after_unmount() {
        let notify = Arc::new(Notify::new());
        let mut fake = FakeIdentity::new(customer());
        fake.gate = Some(Arc::clone(&notify));

        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), clock);
        sessions
            .write(Namespace::User, &SessionRecord::new("a@x.com", Role::Customer, t0()))
            .unwrap();

        let context = AuthContext::init(sessions, Arc::new(fake));
        let mount = Mount::new();
        let pending = {
            let context = context.clone();
            let mount = mount.clone();
            tokio::spawn(async move {
                AuthGate::default()
                    .check(&context, Some(true), "/dashboard", &mount)
                    .await
            })
        };

        tokio::task::yield_now().await;
        mount.unmount();
        notify.notify_one();

        assert_eq!(pending.await.unwrap(), None);
    }
}
