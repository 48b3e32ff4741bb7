//! Admin sign-in and sign-out.
//!
//! The admin namespace is written only for profiles that may act as an
//! admin. The admin guard reads nothing else, so this is the gate for the
//! whole admin panel.

use henhouse_core::{Namespace, Profile, SessionRecord};
use thiserror::Error;

use crate::session::{SessionStore, SessionStoreError};

/// Errors from admin sign-in.
#[derive(Debug, Error)]
pub enum AdminSignInError {
    /// The profile is neither an admin nor eligible to become one.
    #[error("{0} is not allowed to use the admin panel")]
    NotAdmin(String),

    /// Persisting the admin record failed.
    #[error("session store error: {0}")]
    Store(#[from] SessionStoreError),
}

/// Writer and reader of the admin namespace.
#[derive(Debug, Clone)]
pub struct AdminSessions {
    sessions: SessionStore,
}

impl AdminSessions {
    /// Admin sessions stored through `sessions`.
    #[must_use]
    pub const fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Start an admin session for `profile`, stamped now.
    ///
    /// # Errors
    ///
    /// Returns [`AdminSignInError::NotAdmin`] unless the profile is admin
    /// capable, or a store error if the record cannot be written.
    pub fn sign_in(&self, profile: &Profile) -> Result<SessionRecord, AdminSignInError> {
        if !profile.is_admin_capable() {
            tracing::warn!(identity = %profile.identity, "Admin sign-in refused");
            return Err(AdminSignInError::NotAdmin(profile.identity.to_string()));
        }

        let record = SessionRecord::admin(
            profile.identity.clone(),
            profile.display_name(),
            self.sessions.now(),
        );
        self.sessions.write(Namespace::Admin, &record)?;
        tracing::info!(identity = %record.identity, "Admin signed in");
        Ok(record)
    }

    /// End the admin session. The user session is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails.
    pub fn sign_out(&self) -> Result<(), SessionStoreError> {
        self.sessions.clear(Namespace::Admin)?;
        tracing::info!("Admin signed out");
        Ok(())
    }

    /// The admin record, if present and unexpired.
    #[must_use]
    pub fn current(&self) -> Option<SessionRecord> {
        self.sessions.load_valid(Namespace::Admin)
    }
}
