//! Integration tests for Henhouse.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p henhouse-integration-tests
//! ```
//!
//! No external services are needed: the durable store is in memory, the
//! identity API and the SMTP transport are replaced by the doubles below, and
//! the API router is driven with `tower::ServiceExt::oneshot`.
//!
//! # Test Categories
//!
//! - `session_gates` - sessions, guards and role selection across tabs
//! - `api_forms` - contact and booking endpoints

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use henhouse_api::config::{ApiConfig, EmailConfig};
use henhouse_api::services::email::{EmailError, Mailer, OutgoingEmail};
use henhouse_core::{Email, Identity, Profile, Role};
use henhouse_storefront::{
    AuthContext, IdentityError, IdentityProvider, ManualClock, MemoryStore, Navigator, Redirect,
    SessionStore,
};
use secrecy::SecretString;

/// Fixed start time for clock-driven scenarios.
///
/// # Panics
///
/// Never; the timestamp is in range.
#[must_use]
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_760_000_000_000).expect("timestamp in range")
}

// =============================================================================
// Browser
// =============================================================================

/// One browser profile: a shared durable store and a controllable clock.
pub struct Browser {
    store: MemoryStore,
    pub clock: Arc<ManualClock>,
}

impl Browser {
    /// A browser with empty storage at [`t0`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    /// Open a new tab: its own handle onto the shared store.
    #[must_use]
    pub fn open_tab(&self) -> SessionStore {
        SessionStore::new(Arc::new(self.store.tab()), self.clock.clone())
    }

    /// Raw storage handle, for planting values.
    #[must_use]
    pub const fn storage(&self) -> &MemoryStore {
        &self.store
    }

    /// Move the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        self.clock.advance(by);
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

/// Start an auth context on `tab` and wait for rehydration.
pub async fn ready_context(tab: SessionStore, identity: Arc<StubIdentity>) -> AuthContext {
    let context = AuthContext::init(tab, identity);
    context.ready().await;
    context
}

// =============================================================================
// Identity API double
// =============================================================================

/// Identity API answering with one profile.
pub struct StubIdentity {
    profile: Mutex<Profile>,
    unavailable: AtomicBool,
}

impl StubIdentity {
    #[must_use]
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Mutex::new(profile),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail with a 503.
    pub fn go_down(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// The profile as last updated.
    #[must_use]
    pub fn profile(&self) -> Profile {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_up(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Api {
                status: 503,
                message: "identity service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn fetch_profile(&self, identity: &Identity) -> Result<Profile, IdentityError> {
        self.check_up()?;
        let profile = self.profile();
        if &profile.identity != identity {
            return Err(IdentityError::ProfileNotFound(identity.to_string()));
        }
        Ok(profile)
    }

    async fn update_role(&self, identity: &Identity, role: Role) -> Result<(), IdentityError> {
        self.check_up()?;
        let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        if &profile.identity != identity {
            return Err(IdentityError::ProfileNotFound(identity.to_string()));
        }
        profile.role = role;
        Ok(())
    }
}

/// A profile for `identity`.
#[must_use]
pub fn profile(identity: &str, role: Role, eligible_for_admin: bool) -> Profile {
    Profile {
        identity: Identity::new(identity),
        role,
        eligible_for_admin,
        name: None,
    }
}

// =============================================================================
// Navigator double
// =============================================================================

/// Navigator that records every navigation.
#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    /// Navigations so far.
    #[must_use]
    pub fn visits(&self) -> Vec<Redirect> {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, redirect: Redirect) {
        self.visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(redirect);
    }
}

// =============================================================================
// Mailer double
// =============================================================================

/// Mailer that keeps messages instead of sending them.
#[derive(Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: AtomicBool,
    unreachable: AtomicBool,
}

impl CapturingMailer {
    /// Reject every send.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Report the server as unreachable.
    pub fn go_offline(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailError::InvalidAddress(email.recipient.to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email);
        Ok(())
    }

    async fn test_connection(&self) -> Result<bool, EmailError> {
        Ok(!self.unreachable.load(Ordering::SeqCst))
    }
}

/// Farm inbox used by [`api_config`].
pub const FARM_INBOX: &str = "coop@henhouse.example";

/// API configuration pointing at nothing real.
///
/// # Panics
///
/// Never; the addresses are literals.
#[must_use]
pub fn api_config() -> ApiConfig {
    ApiConfig {
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 0,
        base_url: None,
        cors_allowed_origin: Some("https://henhouse.example".to_string()),
        email: EmailConfig {
            smtp_host: "smtp.henhouse.example".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("q8#Lm2!vR4zT"),
            from_address: Email::parse("noreply@henhouse.example").expect("valid address"),
            contact_recipient: Email::parse(FARM_INBOX).expect("valid address"),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}
