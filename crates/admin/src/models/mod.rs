//! Domain models for the back-office.
//!
//! Repositories convert database rows into these types; route handlers
//! turn them into template views.

pub mod catalog;
pub mod dashboard;
pub mod discount;
pub mod order;
pub mod session;
pub mod user;
pub mod validation;

pub use session::{CurrentAdmin, PendingLogin, keys as session_keys};
pub use user::User;
pub use validation::ValidationError;
