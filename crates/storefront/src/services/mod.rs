//! Clients for upstream services.
//!
//! # Services
//!
//! - `identity` - Identity/profile API (profile lookup, role updates)

pub mod identity;
