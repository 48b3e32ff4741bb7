//! Session records and the expiry rule.
//!
//! A [`SessionRecord`] is the persisted proof of a login. It lives in one of
//! two independent [`Namespace`]s of the client's durable store: the general
//! user session and the admin session. Both share the same one-hour TTL.
//!
//! # Wire format
//!
//! ```json
//! { "identity": "hen@farm.example", "role": "customer", "issuedAt": 1760000000000 }
//! { "identity": "hen@farm.example", "role": "admin", "name": "Henrietta", "issuedAt": 1760000000000 }
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Identity, Role};

/// Session lifetime in milliseconds (one hour).
pub const SESSION_TTL_MS: i64 = 60 * 60 * 1000;

/// Session lifetime as a [`TimeDelta`].
#[must_use]
pub fn session_ttl() -> TimeDelta {
    TimeDelta::milliseconds(SESSION_TTL_MS)
}

/// Storage slot a session record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// General storefront session.
    User,
    /// Admin panel session.
    Admin,
}

impl Namespace {
    /// Durable-store key for the user session.
    pub const USER_KEY: &'static str = "henhouse.user_session";
    /// Durable-store key for the admin session.
    pub const ADMIN_KEY: &'static str = "henhouse.admin_session";

    /// Durable-store key of this namespace.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::User => Self::USER_KEY,
            Self::Admin => Self::ADMIN_KEY,
        }
    }

    /// Namespace owning a durable-store key, if any.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            Self::USER_KEY => Some(Self::User),
            Self::ADMIN_KEY => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Reasons a stored value is not a usable session record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Not JSON, or JSON of the wrong shape.
    #[error("malformed session record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A role is set but the identity is blank.
    #[error("session record has a role but no identity")]
    MissingIdentity,

    /// The admin namespace holds a record whose role is not `admin`.
    #[error("admin session record has role {0}")]
    NotAdmin(Role),
}

/// Persisted proof of authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Who is signed in.
    #[serde(default)]
    pub identity: Identity,
    /// Role at the time the record was written.
    #[serde(default)]
    pub role: Role,
    /// Display name (admin records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Login time, stamped by the writer.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a user-namespace record.
    #[must_use]
    pub fn new(identity: impl Into<Identity>, role: Role, issued_at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            role,
            name: None,
            issued_at,
        }
    }

    /// Build an admin-namespace record.
    #[must_use]
    pub fn admin(
        identity: impl Into<Identity>,
        name: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identity: identity.into(),
            role: Role::Admin,
            name: Some(name.into()),
            issued_at,
        }
    }

    /// Instant at which the record stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + session_ttl()
    }

    /// Expiry rule: valid iff `now - issued_at < TTL`.
    ///
    /// The bound is exclusive, so a record exactly one TTL old is expired.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.issued_at) < session_ttl()
    }

    /// Check the record against the schema of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingIdentity`] when a role is set without an
    /// identity, and [`RecordError::NotAdmin`] for a non-admin record in the
    /// admin namespace.
    pub fn validate(&self, namespace: Namespace) -> Result<(), RecordError> {
        if self.role.is_set() && self.identity.is_blank() {
            return Err(RecordError::MissingIdentity);
        }
        if namespace == Namespace::Admin && self.role != Role::Admin {
            return Err(RecordError::NotAdmin(self.role));
        }
        Ok(())
    }

    /// Parse and validate a stored value for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] if the value is malformed or fails
    /// [`validate`](Self::validate).
    pub fn decode(namespace: Namespace, raw: &str) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_str(raw)?;
        record.validate(namespace)?;
        Ok(record)
    }

    /// Serialize to the stored JSON form.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError::Malformed`] if serialization fails.
    pub fn encode(&self) -> Result<String, RecordError> {
        Ok(serde_json::to_string(self)?)
    }
}
