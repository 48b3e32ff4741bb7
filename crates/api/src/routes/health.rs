//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies the SMTP server is reachable. Returns 503 Service Unavailable
/// otherwise.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.mailer().test_connection().await {
        Ok(true) => StatusCode::OK,
        Ok(false) => {
            tracing::warn!("SMTP server not reachable");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            tracing::warn!(error = %e, "SMTP readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
