//! Profile returned by the upstream identity API.

use serde::{Deserialize, Serialize};

use super::{Identity, Role};

/// A user's profile as reported by the identity API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Who the profile belongs to.
    pub identity: Identity,
    /// Role recorded upstream (`unset` until role selection).
    #[serde(default)]
    pub role: Role,
    /// Whether the user may pick the admin role.
    #[serde(default)]
    pub eligible_for_admin: bool,
    /// Display name, when the user provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Profile {
    /// True when the profile may hold an admin session.
    #[must_use]
    pub const fn is_admin_capable(&self) -> bool {
        self.eligible_for_admin || matches!(self.role, Role::Admin)
    }

    /// Name shown in the admin panel, falling back to the identity.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.identity.as_str())
    }
}
