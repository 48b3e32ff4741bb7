//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. CORS (storefront origin)
//! 4. Request ID (add unique ID to each request)
//! 5. Rate limiting on the form routes (governor)

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{form_rate_limiter, json_rate_limit_response};
pub use request_id::request_id_middleware;
