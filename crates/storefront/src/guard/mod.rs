//! Route guards.
//!
//! A guard runs before a protected view renders and decides whether the
//! navigation may proceed:
//!
//! - [`AuthGate`] - user-level guard over the [`AuthContext`](crate::AuthContext)
//! - [`AdminAuthGate`] - admin-level guard reading the admin namespace
//!   directly, reacting to sign-outs made in other tabs
//!
//! Every guard decision is tied to a [`Mount`]. Once the view is unmounted the
//! guard produces nothing, so a slow read can never redirect a page the user
//! already left.

mod admin;
mod user;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use admin::{AdminAuthGate, AdminGateState};
pub use user::AuthGate;

/// Where to send the user instead of rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Target path.
    pub to: String,
    /// Originally requested path, for returning after login.
    pub from: Option<String>,
}

impl Redirect {
    /// Redirect to `to` without return state.
    #[must_use]
    pub fn to(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: None,
        }
    }

    /// Redirect to `to`, remembering `from`.
    #[must_use]
    pub fn with_return(to: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: Some(from.into()),
        }
    }

    /// The redirect as a location, with the return path in `?next=`.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.from {
            Some(from) => format!("{}?next={}", self.to, urlencoding::encode(from)),
            None => self.to.clone(),
        }
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Still reading; show a neutral placeholder.
    Pending,
    /// Render the requested view.
    Allow,
    /// Navigate elsewhere.
    Redirect(Redirect),
}

impl GateDecision {
    /// True for [`GateDecision::Allow`].
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Redirect target, if this is a redirect.
    #[must_use]
    pub const fn redirect(&self) -> Option<&Redirect> {
        match self {
            Self::Redirect(redirect) => Some(redirect),
            _ => None,
        }
    }
}

/// Performs navigations a guard triggers on its own, outside a render.
pub trait Navigator: Send + Sync {
    /// Navigate to `redirect`.
    fn navigate(&self, redirect: Redirect);
}

/// Redirect targets used by the guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePaths {
    /// User login page.
    pub login: String,
    /// Landing page for signed-in users.
    pub dashboard: String,
    /// Admin login page.
    pub admin_login: String,
}

impl Default for GatePaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            dashboard: "/dashboard".to_string(),
            admin_login: "/admin/login".to_string(),
        }
    }
}

/// Liveness of a rendered view.
///
/// Clones share the flag. A guard checks it after every suspension point and
/// drops its decision once the view is gone.
#[derive(Debug, Clone)]
pub struct Mount {
    live: Arc<AtomicBool>,
}

impl Mount {
    /// A freshly mounted view.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// True until [`unmount`](Self::unmount) is called.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Mark the view as gone.
    pub fn unmount(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

impl Default for Mount {
    fn default() -> Self {
        Self::new()
    }
}

/// Route metadata default: a route that does not say is protected.
#[must_use]
pub fn requires_auth(meta: Option<bool>) -> bool {
    meta.unwrap_or(true)
}
