//! Pharmacy back-office library.
//!
//! Server-rendered admin for the pharmacy store: catalog, orders, customers,
//! discount codes and the sales dashboard, plus the account flows that gate
//! them (password and OAuth sign-in, email verification, email 2FA codes and
//! password resets).
//!
//! The binary in `main.rs` wires this into a server; the CLI reuses the
//! repositories and password hashing for seeding and admin bootstrap.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod components;
pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
