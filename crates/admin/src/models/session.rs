//! Session-related types for back-office authentication.

use serde::{Deserialize, Serialize};

use pharmacy_core::{Email, UserId, UserRole};

use super::User;

/// Session-stored identity of the signed-in account.
///
/// Minimal data stored in the session to identify the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentAdmin {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// User's display name.
    pub name: String,
    /// Role at sign-in time.
    pub role: UserRole,
    /// Whether the account signs in through an OAuth provider only.
    pub is_oauth: bool,
}

impl CurrentAdmin {
    /// Whether this account may use the back-office.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for CurrentAdmin {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_oauth: user.is_oauth_only(),
        }
    }
}

/// An account that passed the password step and owes a login code.
///
/// Kept in the session between the two login posts so the code form never
/// carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub user_id: UserId,
    pub email: Email,
}

impl From<&User> for PendingLogin {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
        }
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_ADMIN: &str = "current_admin";

    /// Key for the pending OAuth `state` value (CSRF protection).
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Key for the [`super::PendingLogin`] awaiting a login code.
    pub const PENDING_LOGIN: &str = "pending_login";
}
