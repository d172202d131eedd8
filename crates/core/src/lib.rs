//! Studyforge Core - Shared domain types.
//!
//! This crate provides the types shared by every Studyforge component:
//! - `server` - HTTP backend (learner and admin authentication, curricula)
//! - `cli` - Command-line tools for migrations and account management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The optional `postgres` feature adds `sqlx`
//! encode/decode impls so the server can bind these types directly.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, usernames, admin permissions and
//!   curriculum outline helpers, curriculum feedback ratings

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
