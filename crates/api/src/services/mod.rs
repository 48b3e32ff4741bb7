//! Outbound services.

pub mod email;
