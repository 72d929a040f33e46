//! Account domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pharmacy_core::{Email, Money, UserId, UserRole};

/// An account (back-office staff or storefront customer).
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    /// When the current email address was confirmed.
    pub email_verified: Option<DateTime<Utc>>,
    /// Argon2 PHC string; `None` for OAuth-only accounts.
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub role: UserRole,
    pub is_two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Accounts without a password can only sign in through a provider.
    #[must_use]
    pub const fn is_oauth_only(&self) -> bool {
        self.password_hash.is_none()
    }

    /// Whether the email address has been confirmed.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.email_verified.is_some()
    }
}

/// Fields for inserting an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub role: UserRole,
    /// Pre-verified accounts (OAuth sign-up, CLI bootstrap).
    pub email_verified: bool,
}

/// Row in the users table.
#[derive(Debug, Clone)]
pub struct UserListItem {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
    pub is_verified: bool,
    pub is_oauth: bool,
    pub order_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A user with their purchase history summary.
#[derive(Debug, Clone)]
pub struct UserDetail {
    pub user: User,
    pub order_count: i64,
    /// Sum of non-cancelled order totals.
    pub lifetime_spend: Money,
    /// Linked OAuth providers (`github`, `google`).
    pub providers: Vec<String>,
}

/// JSON search result for pickers.
#[derive(Debug, Clone, Serialize)]
pub struct UserSearchHit {
    pub id: UserId,
    pub name: String,
    pub email: Email,
}

/// Filters for the users table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(password_hash: Option<&str>) -> User {
        User {
            id: UserId::new(1),
            name: "Dana".to_string(),
            email: Email::parse("dana@pharmacy.test").unwrap(),
            email_verified: None,
            password_hash: password_hash.map(String::from),
            image: None,
            role: UserRole::Admin,
            is_two_factor_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_oauth_only_has_no_password() {
        assert!(user(None).is_oauth_only());
        assert!(!user(Some("$argon2id$v=19$...")).is_oauth_only());
        assert!(!user(None).is_verified());
    }
}
