//! Storefront route table.
//!
//! Each route carries the guard that runs before its view renders. Lookup is
//! first-match in table order; a path nobody declared is protected.

use crate::guard::requires_auth;

/// Guard attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// Rendered for everyone.
    Public,
    /// User-level guard; `None` reads as `Some(true)`.
    User { require_auth: Option<bool> },
    /// Admin-level guard over the admin namespace.
    Admin,
}

impl RouteGuard {
    /// True when the route can only be seen signed in.
    #[must_use]
    pub fn is_protected(self) -> bool {
        match self {
            Self::Public => false,
            Self::User { require_auth } => requires_auth(require_auth),
            Self::Admin => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(&'static str),
    /// The prefix itself and everything below it.
    Prefix(&'static str),
}

impl Pattern {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == *exact,
            Self::Prefix(prefix) => {
                path == *prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// Ordered list of route patterns and their guards.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(Pattern, RouteGuard)>,
}

impl RouteTable {
    /// The storefront's routes.
    #[must_use]
    pub fn storefront() -> Self {
        const PUBLIC: RouteGuard = RouteGuard::Public;
        const GUEST: RouteGuard = RouteGuard::User {
            require_auth: Some(false),
        };
        const SIGNED_IN: RouteGuard = RouteGuard::User {
            require_auth: Some(true),
        };

        Self {
            routes: vec![
                (Pattern::Exact("/"), PUBLIC),
                (Pattern::Prefix("/products"), PUBLIC),
                (Pattern::Exact("/services"), PUBLIC),
                (Pattern::Exact("/cart"), PUBLIC),
                (Pattern::Exact("/contact"), PUBLIC),
                (Pattern::Exact("/login"), GUEST),
                (Pattern::Exact("/register"), GUEST),
                (Pattern::Exact("/dashboard"), SIGNED_IN),
                (Pattern::Exact("/booking"), SIGNED_IN),
                (Pattern::Exact("/select-role"), SIGNED_IN),
                (Pattern::Exact("/admin/login"), PUBLIC),
                (Pattern::Prefix("/admin"), RouteGuard::Admin),
            ],
        }
    }

    /// Guard for `path`. Query strings, fragments and a trailing slash are
    /// ignored.
    #[must_use]
    pub fn resolve(&self, path: &str) -> RouteGuard {
        let path = normalize(path);
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map_or(RouteGuard::User { require_auth: None }, |(_, guard)| *guard)
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
