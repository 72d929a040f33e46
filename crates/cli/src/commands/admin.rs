//! Admin account management commands.
//!
//! The first admin has to be created here: web sign-ups get the `user`
//! role, and only an admin can change roles.

use pharmacy_admin::db::{RepositoryError, UserRepository};
use pharmacy_admin::models::user::NewUser;
use pharmacy_admin::services::{AuthError, auth::hash_password};
use pharmacy_core::{Email, UserId, UserRole};
use sqlx::PgPool;
use thiserror::Error;

/// Shortest password accepted, matching the registration form.
const MIN_PASSWORD_LEN: usize = 6;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,

    #[error("Name is required")]
    MissingName,

    #[error("An account already exists with email: {0}")]
    UserExists(String),

    #[error("No account with email: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Create a verified admin account.
///
/// # Errors
///
/// Returns `AdminError` for invalid input, an existing account, or a
/// database failure.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
) -> Result<UserId, AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::MissingName);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AdminError::WeakPassword);
    }

    let repo = UserRepository::new(pool);
    if repo.get_by_email(&email).await?.is_some() {
        return Err(AdminError::UserExists(email.to_string()));
    }

    let user = repo
        .create(&NewUser {
            name: name.to_owned(),
            email,
            password_hash: Some(hash_password(password)?),
            image: None,
            role: UserRole::Admin,
            email_verified: true,
        })
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "Admin account created");
    Ok(user.id)
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns `AdminError::UnknownUser` if no account has this email.
pub async fn promote(pool: &PgPool, email: &str) -> Result<(), AdminError> {
    let parsed = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let repo = UserRepository::new(pool);
    let user = repo
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| AdminError::UnknownUser(email.to_owned()))?;

    if user.role == UserRole::Admin {
        tracing::info!(user_id = %user.id, "Account is already an admin");
        return Ok(());
    }

    repo.set_role(user.id, UserRole::Admin).await?;
    tracing::info!(user_id = %user.id, email = %user.email, "Account promoted to admin");
    Ok(())
}
