//! Pharmacy Core - Shared types library.
//!
//! This crate provides common types used across the back-office components:
//! - `admin` - Server-rendered administration panel
//! - `cli` - Command-line tools for migrations, bootstrap and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The optional `postgres` feature adds `sqlx`
//! encodings for the ID newtypes and enums.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, money, statuses, pagination and date ranges

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
