//! Core types for the pharmacy back-office.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod page;
pub mod range;
pub mod slug;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use page::{Page, PageRequest};
pub use range::{Bucket, DashboardRange};
pub use slug::slugify;
pub use status::*;
