//! Henhouse Storefront client core.
//!
//! The storefront is a single-page application; this crate holds the parts of
//! it that carry state and rules rather than markup:
//!
//! - [`storage`] - the durable key-value store shared by every open tab, with
//!   cross-tab change notifications
//! - [`session`] - expiring session records on top of the store, one slot per
//!   [`Namespace`](henhouse_core::Namespace)
//! - [`context`] - the auth context: rehydration on start, login, logout,
//!   role changes
//! - [`guard`] - the user-level and admin-level route guards
//! - [`role_selection`] - the one-time post-login role choice
//! - [`admin_session`] - admin sign-in and sign-out
//! - [`routes`] - route table with guard metadata
//! - [`services`] - clients for upstream APIs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod admin_session;
pub mod clock;
pub mod config;
pub mod context;
pub mod guard;
pub mod role_selection;
pub mod routes;
pub mod services;
pub mod session;
pub mod storage;

pub use admin_session::{AdminSessions, AdminSignInError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, StorefrontConfig};
pub use context::{AuthContext, AuthState, ContextError};
pub use guard::{
    AdminAuthGate, AdminGateState, AuthGate, GateDecision, GatePaths, Mount, Navigator, Redirect,
};
pub use role_selection::{RoleSelection, RoleSelectionError};
pub use routes::{RouteGuard, RouteTable};
pub use services::identity::{HttpIdentityClient, IdentityError, IdentityProvider};
pub use session::{SessionStore, SessionStoreError};
pub use storage::{DurableStore, MemoryStore, StorageError, StorageEvent, StorageNotice, Subscription};
