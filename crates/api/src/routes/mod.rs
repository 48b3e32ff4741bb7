//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health         - Liveness check
//! GET  /health/ready   - Readiness check (SMTP reachable)
//! POST /api/contact    - Contact form
//! POST /api/booking    - Service booking request
//! ```

pub mod booking;
pub mod contact;
pub mod health;

use axum::extract::rejection::JsonRejection;
use axum::{Router, routing::get, routing::post};
use henhouse_core::Email;

use crate::error::{AppError, Result};
use crate::middleware::{form_rate_limiter, json_rate_limit_response};
use crate::state::AppState;

/// Build the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", form_routes())
}

/// Form submission routes (rate limited).
fn form_routes() -> Router<AppState> {
    Router::new()
        .route("/contact", post(contact::submit))
        .route("/booking", post(booking::submit))
        .layer(form_rate_limiter())
        .layer(axum::middleware::map_response(json_rate_limit_response))
}

// =============================================================================
// Form field helpers
// =============================================================================

/// Turn an unreadable JSON body into a form error.
fn reject_body(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection, "Rejected form body");
    AppError::BadRequest("The form could not be read. Please try again.".to_string())
}

/// Trimmed, lowercased email or a form error.
fn parse_email(raw: &str) -> Result<Email> {
    Email::parse_normalized(raw)
        .map_err(|_| AppError::BadRequest("Please enter a valid email address.".to_string()))
}

/// Trimmed non-blank value of at most `max_len` characters.
fn required_field(raw: &str, label: &str, max_len: usize) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{label} is required.")));
    }
    if value.chars().count() > max_len {
        return Err(AppError::BadRequest(format!(
            "{label} must be at most {max_len} characters."
        )));
    }
    Ok(value.to_string())
}

/// Trimmed value, with blank treated as absent.
fn optional_field(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
