//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::email::EmailError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] pharmacy_core::EmailError),

    /// Name missing or too long.
    #[error("invalid name")]
    InvalidName,

    /// Invalid credentials (wrong password, unknown email, or OAuth-only account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email already belongs to another account.
    #[error("email already in use")]
    EmailInUse,

    /// No account for this email.
    #[error("email not found")]
    EmailNotFound,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Link token does not exist.
    #[error("token not found")]
    TokenNotFound,

    /// Link token is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// Two-factor code does not match.
    #[error("invalid code")]
    InvalidCode,

    /// Two-factor code is past its expiry.
    #[error("code expired")]
    CodeExpired,

    /// OAuth-only accounts cannot change email, password or 2FA.
    #[error("managed by OAuth provider")]
    OAuthManaged,

    /// Current password did not match on a password change.
    #[error("incorrect current password")]
    IncorrectPassword,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Email delivery error.
    #[error("email error: {0}")]
    Email(#[from] EmailError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AuthError {
    /// Short code for `?error=` redirects.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "invalid_email",
            Self::InvalidName => "invalid_name",
            Self::InvalidCredentials => "invalid_credentials",
            Self::EmailInUse => "email_in_use",
            Self::EmailNotFound => "email_not_found",
            Self::WeakPassword(_) => "weak_password",
            Self::TokenNotFound => "token_not_found",
            Self::TokenExpired => "token_expired",
            Self::InvalidCode => "invalid_code",
            Self::CodeExpired => "code_expired",
            Self::OAuthManaged => "oauth_managed",
            Self::IncorrectPassword => "incorrect_password",
            Self::PasswordHash | Self::Email(_) | Self::Repository(_) => "server_error",
        }
    }

    /// Whether the failure is the server's fault rather than the user's.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::PasswordHash | Self::Email(_) | Self::Repository(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AuthError::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(AuthError::CodeExpired.code(), "code_expired");
        assert_eq!(
            AuthError::Repository(RepositoryError::NotFound).code(),
            "server_error"
        );
        assert!(AuthError::PasswordHash.is_server_error());
        assert!(!AuthError::EmailInUse.is_server_error());
    }
}
