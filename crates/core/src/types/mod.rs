//! Core types for Henhouse.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod identity;
pub mod profile;
pub mod role;
pub mod session;

pub use email::{Email, EmailError};
pub use identity::Identity;
pub use profile::Profile;
pub use role::Role;
pub use session::{Namespace, RecordError, SESSION_TTL_MS, SessionRecord, session_ttl};
