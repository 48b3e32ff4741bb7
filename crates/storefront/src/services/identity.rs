//! Identity API client.
//!
//! The identity API owns user profiles: who a user is, which role they picked,
//! and whether they may act as an admin. The storefront asks it to revalidate
//! a rehydrated session and tells it about role selections.

use async_trait::async_trait;
use henhouse_core::{Identity, Profile, Role};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Errors that can occur when talking to the identity API.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No profile exists for the identity.
    #[error("Profile not found for identity: {0}")]
    ProfileNotFound(String),

    /// Could not build a request URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Upstream profile operations the storefront depends on.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch the current profile for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the profile cannot be fetched.
    async fn fetch_profile(&self, identity: &Identity) -> Result<Profile, IdentityError>;

    /// Record `role` as the user's chosen role.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the update is rejected or fails.
    async fn update_role(&self, identity: &Identity, role: Role) -> Result<(), IdentityError>;
}

#[derive(Serialize)]
struct RoleUpdate {
    role: Role,
}

/// HTTP client for the identity API.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpIdentityClient {
    /// Create a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("henhouse-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn profile_url(&self, identity: &Identity, suffix: &str) -> Result<Url, IdentityError> {
        let path = format!(
            "profiles/{}{suffix}",
            urlencoding::encode(identity.as_str())
        );
        Ok(self.base_url.join(&path)?)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn fetch_profile(&self, identity: &Identity) -> Result<Profile, IdentityError> {
        let url = self.profile_url(identity, "")?;
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(IdentityError::ProfileNotFound(identity.to_string()));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn update_role(&self, identity: &Identity, role: Role) -> Result<(), IdentityError> {
        let url = self.profile_url(identity, "/role")?;
        let response = self
            .client
            .put(url)
            .json(&RoleUpdate { role })
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(IdentityError::ProfileNotFound(identity.to_string()));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IdentityError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!(identity = %identity, role = %role, "Role recorded upstream");
        Ok(())
    }
}
