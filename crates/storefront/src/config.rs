//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `IDENTITY_API_URL` - Base URL of the identity/profile API
//!
//! ## Optional
//! - `LOGIN_PATH` - Login page path (default: /login)
//! - `DASHBOARD_PATH` - Landing page for signed-in users (default: /dashboard)
//! - `ADMIN_LOGIN_PATH` - Admin login page path (default: /admin/login)

use thiserror::Error;
use url::Url;

use crate::guard::GatePaths;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Identity API base URL (always ends with `/`)
    pub identity_api_url: Url,
    /// Redirect targets used by the route guards
    pub paths: GatePaths,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let identity_api_url = parse_base_url(
            "IDENTITY_API_URL",
            &get_required_env("IDENTITY_API_URL")?,
        )?;

        let defaults = GatePaths::default();
        let paths = GatePaths {
            login: get_path_or_default("LOGIN_PATH", &defaults.login)?,
            dashboard: get_path_or_default("DASHBOARD_PATH", &defaults.dashboard)?,
            admin_login: get_path_or_default("ADMIN_LOGIN_PATH", &defaults.admin_login)?,
        };

        Ok(Self {
            identity_api_url,
            paths,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an in-app path, checking it is absolute.
fn get_path_or_default(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    if !value.starts_with('/') {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must start with '/'".to_string(),
        ));
    }
    Ok(value)
}

/// Parse a base URL so that relative joins land underneath it.
fn parse_base_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_appends_slash() {
        let url = parse_base_url("X", "https://id.farm.example/v1").unwrap();
        assert_eq!(url.as_str(), "https://id.farm.example/v1/");
        assert_eq!(
            url.join("profiles/a").unwrap().as_str(),
            "https://id.farm.example/v1/profiles/a"
        );
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        let err = parse_base_url("X", "ftp://id.farm.example").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
        assert!(parse_base_url("X", "not a url").is_err());
    }

    #[test]
    fn test_default_paths() {
        let paths = GatePaths::default();
        assert_eq!(paths.login, "/login");
        assert_eq!(paths.dashboard, "/dashboard");
        assert_eq!(paths.admin_login, "/admin/login");
    }
}
