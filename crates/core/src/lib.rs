//! Henhouse Core - Shared types library.
//!
//! This crate provides the types shared by every Henhouse component:
//! - `storefront` - Client core of the single-page farm storefront
//! - `api` - Contact and booking email API
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and usable anywhere.
//!
//! # Modules
//!
//! - [`types`] - Email and identity newtypes, roles, session records and
//!   the session expiry rule

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
