//! Post-login role selection.
//!
//! A user whose profile has no role yet picks one once after logging in.
//! Choosing `admin` is the only path that writes both namespaces:
//!
//! 1. the upstream profile records the role
//! 2. the user session is replaced with one carrying the role
//! 3. for `admin` only, an admin session is written so the admin guard lets
//!    the user in

use henhouse_core::{Identity, Profile, Role, SessionRecord};
use thiserror::Error;

use crate::admin_session::{AdminSessions, AdminSignInError};
use crate::context::{AuthContext, ContextError};
use crate::services::identity::IdentityError;

/// Errors from role selection.
#[derive(Debug, Error)]
pub enum RoleSelectionError {
    /// The role is not among the options shown to this user.
    #[error("role {0} is not available for this account")]
    NotOffered(Role),

    /// The signed-in session belongs to someone else.
    #[error("role selection for {expected} but {signed_in} is signed in")]
    WrongAccount {
        expected: Identity,
        signed_in: Identity,
    },

    /// The identity API rejected the update.
    #[error("identity API error: {0}")]
    Identity(#[from] IdentityError),

    /// The user session could not be updated.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The admin session could not be written.
    #[error(transparent)]
    Admin(#[from] AdminSignInError),
}

/// Role choice for one signed-in profile.
#[derive(Debug, Clone)]
pub struct RoleSelection {
    profile: Profile,
}

impl RoleSelection {
    /// Role choice for `profile`, as fetched after login.
    #[must_use]
    pub const fn new(profile: Profile) -> Self {
        Self { profile }
    }

    /// Roles to present, in display order.
    ///
    /// `customer` is always offered; `admin` only to eligible profiles.
    #[must_use]
    pub fn options(&self) -> Vec<Role> {
        let mut options = vec![Role::Customer];
        if self.profile.eligible_for_admin {
            options.push(Role::Admin);
        }
        options
    }

    /// Whether `role` is one of the [`options`](Self::options).
    #[must_use]
    pub fn offers(&self, role: Role) -> bool {
        self.options().contains(&role)
    }

    /// Apply the choice of `role` for the user signed in to `context`.
    ///
    /// Nothing is written if the role is not offered.
    ///
    /// # Errors
    ///
    /// Returns [`RoleSelectionError::NotOffered`] for a role outside the
    /// options, [`ContextError::NotAuthenticated`] without a valid session,
    /// [`RoleSelectionError::WrongAccount`] when the session belongs to
    /// another identity, or the error of whichever later step failed. The
    /// first three leave the upstream profile untouched.
    pub async fn select(
        &self,
        role: Role,
        context: &AuthContext,
    ) -> Result<SessionRecord, RoleSelectionError> {
        if !self.offers(role) {
            tracing::warn!(identity = %self.profile.identity, role = %role, "Role not offered");
            return Err(RoleSelectionError::NotOffered(role));
        }

        let current = context.snapshot();
        let session = current
            .valid_session(context.sessions().now())
            .ok_or(ContextError::NotAuthenticated)?;
        if session.identity != self.profile.identity {
            tracing::warn!(
                expected = %self.profile.identity,
                signed_in = %session.identity,
                "Role selection for another account"
            );
            return Err(RoleSelectionError::WrongAccount {
                expected: self.profile.identity.clone(),
                signed_in: session.identity.clone(),
            });
        }

        context
            .identity()
            .update_role(&self.profile.identity, role)
            .await?;
        let record = context.set_role(role)?;

        if role == Role::Admin {
            let profile = Profile {
                role,
                ..self.profile.clone()
            };
            AdminSessions::new(context.sessions().clone()).sign_in(&profile)?;
        }

        tracing::info!(identity = %record.identity, role = %role, "Role selected");
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use chrono::TimeDelta;
    use henhouse_core::Namespace;

    use super::*;
    use crate::clock::ManualClock;
    use crate::context::tests::{FakeIdentity, t0};
    use crate::session::SessionStore;
    use crate::storage::{DurableStore, MemoryStore};

    fn newcomer(eligible: bool) -> Profile {
        Profile {
            identity: Identity::new("a@x.com"),
            role: Role::Unset,
            eligible_for_admin: eligible,
            name: Some("Ada".to_string()),
        }
    }

    async fn signed_in(profile: &Profile) -> (MemoryStore, AuthContext, Arc<FakeIdentity>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store.clone()), clock);
        let identity = Arc::new(FakeIdentity::new(profile.clone()));
        let context = AuthContext::init(sessions, identity.clone());
        context.ready().await;
        context.login(profile.clone()).unwrap();
        (store, context, identity)
    }

    #[test]
    fn test_admin_option_requires_eligibility() {
        assert_eq!(RoleSelection::new(newcomer(false)).options(), vec![Role::Customer]);
        assert_eq!(
            RoleSelection::new(newcomer(true)).options(),
            vec![Role::Customer, Role::Admin]
        );
        assert!(!RoleSelection::new(newcomer(true)).offers(Role::Unset));
    }

    #[tokio::test]
    async fn test_customer_choice_writes_no_admin_record() {
        let profile = newcomer(false);
        let (store, context, identity) = signed_in(&profile).await;

        let record = RoleSelection::new(profile)
            .select(Role::Customer, &context)
            .await
            .unwrap();

        assert_eq!(record.role, Role::Customer);
        assert_eq!(identity.role_updates.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_admin_choice_writes_both_namespaces() {
        let profile = newcomer(true);
        let (_, context, _) = signed_in(&profile).await;

        RoleSelection::new(profile)
            .select(Role::Admin, &context)
            .await
            .unwrap();

        let sessions = context.sessions();
        assert_eq!(sessions.read(Namespace::User).unwrap().role, Role::Admin);
        let admin = sessions.load_valid(Namespace::Admin).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_admin_not_offered_has_no_side_effects() {
        let profile = newcomer(false);
        let (store, context, identity) = signed_in(&profile).await;

        let err = RoleSelection::new(profile)
            .select(Role::Admin, &context)
            .await
            .unwrap_err();

        assert!(matches!(err, RoleSelectionError::NotOffered(Role::Admin)));
        assert_eq!(identity.role_updates.load(Ordering::SeqCst), 0);
        assert_eq!(context.sessions().read(Namespace::User).unwrap().role, Role::Unset);
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_session() {
        let profile = newcomer(true);
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store.clone()), clock);
        let mut fake = FakeIdentity::new(profile.clone());
        fake.fail = true;
        let context = AuthContext::init(sessions, Arc::new(fake));
        context.ready().await;
        context.login(profile.clone()).unwrap();

        let err = RoleSelection::new(profile)
            .select(Role::Admin, &context)
            .await
            .unwrap_err();

        assert!(matches!(err, RoleSelectionError::Identity(_)));
        assert_eq!(context.sessions().read(Namespace::User).unwrap().role, Role::Unset);
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_session_leaves_upstream_untouched() {
        let profile = newcomer(true);
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = SessionStore::new(Arc::new(store.clone()), clock.clone());
        let identity = Arc::new(FakeIdentity::new(profile.clone()));
        let context = AuthContext::init(sessions, identity.clone());
        context.ready().await;
        context.login(profile.clone()).unwrap();

        clock.advance(TimeDelta::minutes(61));
        let err = RoleSelection::new(profile)
            .select(Role::Admin, &context)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RoleSelectionError::Context(ContextError::NotAuthenticated)
        ));
        assert_eq!(identity.role_updates.load(Ordering::SeqCst), 0);
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_selection_for_other_account_is_refused() {
        let (store, context, identity) = signed_in(&newcomer(false)).await;
        let stranger = Profile {
            identity: Identity::new("b@x.com"),
            ..newcomer(true)
        };

        let err = RoleSelection::new(stranger)
            .select(Role::Admin, &context)
            .await
            .unwrap_err();

        assert!(matches!(err, RoleSelectionError::WrongAccount { .. }));
        assert_eq!(identity.role_updates.load(Ordering::SeqCst), 0);
        assert_eq!(context.sessions().read(Namespace::User).unwrap().role, Role::Unset);
        assert_eq!(store.get_item(Namespace::ADMIN_KEY).unwrap(), None);
    }
}
