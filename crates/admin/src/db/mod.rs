//! Database operations for the back-office `PostgreSQL` schema (`rx`).
//!
//! ## Tables
//!
//! - `app_user`, `oauth_account` - Accounts and linked OAuth identities
//! - `verification_token`, `password_reset_token`, `two_factor_token` - Emailed tokens
//! - `two_factor_confirmation` - One-shot proof that a login passed the 2FA step
//! - `category`, `manufacturer`, `product`, `product_variant` - Catalog
//! - `discount_code`, `customer_order`, `order_detail` - Sales
//! - `session` - tower-sessions store
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p pharmacy-cli -- migrate
//! ```
//!
//! Queries are built at runtime with `sqlx::query_as` and `sqlx::QueryBuilder`.
//! Postgres enums are read as `::text` and parsed in the row conversions, and
//! written with an explicit cast (`$1::rx.order_status`).

pub mod accounts;
pub mod categories;
pub mod dashboard;
pub mod discounts;
pub mod manufacturers;
pub mod orders;
pub mod products;
pub mod tokens;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use accounts::OAuthAccountRepository;
pub use categories::CategoryRepository;
pub use dashboard::DashboardRepository;
pub use discounts::DiscountRepository;
pub use manufacturers::ManufacturerRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use tokens::{TokenKind, TokenRepository};
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The row is still referenced by other rows.
    #[error("still in use: {0}")]
    InUse(String),
}

impl RepositoryError {
    /// Classify a write error: unique violations become `Conflict`,
    /// foreign-key violations become `InUse`.
    pub(crate) fn from_write(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return Self::Conflict(format!("{what} already exists"));
            }
            if db_err.is_foreign_key_violation() {
                return Self::InUse(format!("{what} is referenced by other records"));
            }
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Escape `LIKE` metacharacters and wrap the term in `%...%`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Parse `asc`/`desc`, falling back to the given default.
    #[must_use]
    pub fn parse_or(value: Option<&str>, default: Self) -> Self {
        match value {
            Some("asc") => Self::Asc,
            Some("desc") => Self::Desc,
            _ => default,
        }
    }

    /// SQL keyword.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Query-string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// The opposite direction (for header links).
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ibu"), "%ibu%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(
            SortDirection::parse_or(Some("asc"), SortDirection::Desc),
            SortDirection::Asc
        );
        assert_eq!(
            SortDirection::parse_or(Some("sideways"), SortDirection::Asc),
            SortDirection::Asc
        );
        assert_eq!(SortDirection::Desc.flipped(), SortDirection::Asc);
    }
}
