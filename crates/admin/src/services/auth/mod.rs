//! Authentication service.
//!
//! Email/password accounts with emailed verification links, optional
//! emailed login codes (2FA), password reset links, and GitHub/Google
//! sign-in through [`crate::services::oauth`].

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pharmacy_core::{Email, UserId, UserRole};

use crate::db::tokens::EmailToken;
use crate::db::{OAuthAccountRepository, RepositoryError, TokenKind, TokenRepository, UserRepository};
use crate::models::PendingLogin;
use crate::models::user::{NewUser, User};
use crate::services::email::{EmailService, generate_two_factor_code};
use crate::services::oauth::OAuthProfile;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// Result of a credentials login attempt.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials (and code, if required) accepted.
    Authenticated(User),
    /// The address is unconfirmed; a fresh link was emailed.
    VerificationSent,
    /// A login code was emailed; finish with [`AuthService::verify_two_factor`].
    TwoFactorRequired(PendingLogin),
}

/// Settings form after parsing.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub name: String,
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub is_two_factor_enabled: bool,
}

/// Settings that passed every check and are ready to write.
#[derive(Debug)]
struct SettingsChange {
    name: String,
    new_email: Option<Email>,
    password_hash: Option<String>,
    is_two_factor_enabled: bool,
}

/// Result of saving the settings form.
#[derive(Debug)]
pub struct SettingsOutcome {
    pub user: User,
    /// A confirmation link went to a new address; the email is unchanged
    /// until it is followed.
    pub verification_sent: bool,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: TokenRepository<'a>,
    accounts: OAuthAccountRepository<'a>,
    email: &'a EmailService,
    base_url: &'a str,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, email: &'a EmailService, base_url: &'a str) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenRepository::new(pool),
            accounts: OAuthAccountRepository::new(pool),
            email,
            base_url,
        }
    }

    // =========================================================================
    // Registration & Login
    // =========================================================================

    /// Create an unverified account and email a confirmation link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidName`, `InvalidEmail` or `WeakPassword`
    /// for bad input, and `AuthError::EmailInUse` if the email is taken.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AuthError> {
        let name = validate_name(name)?;
        let email = Email::parse(email)?;
        validate_password(password)?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .users
            .create(&NewUser {
                name,
                email: email.clone(),
                password_hash: Some(password_hash),
                image: None,
                role: UserRole::User,
                email_verified: false,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::EmailInUse,
                other => AuthError::Repository(other),
            })?;

        self.send_verification(&email, None).await?;
        tracing::info!(user_id = %user.id, "Account registered");
        Ok(user)
    }

    /// Check credentials and run the verification step.
    ///
    /// Two-factor accounts get a fresh code by email and
    /// [`LoginOutcome::TwoFactorRequired`]; the caller keeps the returned
    /// [`PendingLogin`] until the code comes back.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email, an
    /// OAuth-only account or a wrong password.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_verified() {
            self.send_verification(&user.email, None).await?;
            return Ok(LoginOutcome::VerificationSent);
        }

        verify_password(password, hash)?;

        if user.is_two_factor_enabled {
            self.send_two_factor_code(&user.email).await?;
            return Ok(LoginOutcome::TwoFactorRequired(PendingLogin::from(&user)));
        }

        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok(LoginOutcome::Authenticated(user))
    }

    /// Check the emailed code for a pending login.
    ///
    /// The code is spent and a two-factor confirmation is recorded; the
    /// sign-in is complete once [`Self::consume_two_factor_confirmation`]
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCode` / `CodeExpired` for a bad code and
    /// `InvalidCredentials` if the account changed since the password step.
    #[tracing::instrument(skip(self, code), fields(user_id = %pending.user_id))]
    pub async fn verify_two_factor(
        &self,
        pending: &PendingLogin,
        code: &str,
    ) -> Result<User, AuthError> {
        let user = self
            .users
            .get_by_id(pending.user_id)
            .await?
            .filter(|u| u.email == pending.email && u.is_two_factor_enabled)
            .ok_or(AuthError::InvalidCredentials)?;

        let token = self
            .tokens
            .find_by_email(TokenKind::TwoFactor, &user.email)
            .await?
            .ok_or(AuthError::InvalidCode)?;
        check_code(&token, code.trim(), Utc::now())?;
        self.tokens.delete(TokenKind::TwoFactor, token.id).await?;
        self.tokens.replace_confirmation(user.id).await?;

        tracing::info!(user_id = %user.id, "Login code accepted");
        Ok(user)
    }

    /// Spend the confirmation left by [`Self::verify_two_factor`].
    ///
    /// Returns `false` when there is none, so each accepted code opens
    /// exactly one session and the next login asks for a code again.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the query fails.
    pub async fn consume_two_factor_confirmation(&self, user_id: UserId) -> Result<bool, AuthError> {
        Ok(self.tokens.consume_confirmation(user_id).await?)
    }

    // =========================================================================
    // Email Verification & Password Reset
    // =========================================================================

    /// Confirm an address from an emailed link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenNotFound`, `TokenExpired` or `EmailNotFound`.
    pub async fn new_verification(&self, token: &str) -> Result<(), AuthError> {
        let token = self
            .tokens
            .find_by_token(TokenKind::Verification, token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        if token.is_expired(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }

        let user_id = match token.user_id {
            Some(id) => self.users.get_by_id(id).await?.map(|u| u.id),
            None => self.users.get_by_email(&token.email).await?.map(|u| u.id),
        }
        .ok_or(AuthError::EmailNotFound)?;

        self.users
            .mark_email_verified(user_id, &token.email)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::EmailInUse,
                RepositoryError::NotFound => AuthError::EmailNotFound,
                other => AuthError::Repository(other),
            })?;
        self.tokens.delete(TokenKind::Verification, token.id).await?;

        tracing::info!(user_id = %user_id, "Email verified");
        Ok(())
    }

    /// Email a password reset link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EmailNotFound` if no account uses the address.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = Email::parse(email)?;
        if self.users.get_by_email(&email).await?.is_none() {
            return Err(AuthError::EmailNotFound);
        }

        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + TokenKind::PasswordReset.lifetime();
        self.tokens
            .replace(TokenKind::PasswordReset, &email, &token, expires_at)
            .await?;

        let link = self.link("/auth/new-password", &token);
        self.email
            .send_password_reset_email(email.as_str(), &link)
            .await?;
        Ok(())
    }

    /// Set a new password from a reset link.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword`, `TokenNotFound`, `TokenExpired` or
    /// `EmailNotFound`.
    pub async fn new_password(&self, token: &str, password: &str) -> Result<(), AuthError> {
        validate_password(password)?;

        let token = self
            .tokens
            .find_by_token(TokenKind::PasswordReset, token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        if token.is_expired(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .users
            .get_by_email(&token.email)
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        let hash = hash_password(password)?;
        self.users.set_password_hash(user.id, &hash).await?;
        self.tokens.delete(TokenKind::PasswordReset, token.id).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    // =========================================================================
    // OAuth
    // =========================================================================

    /// Resolve a provider identity to an account, linking or creating one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if a database operation fails.
    #[tracing::instrument(skip(self, profile), fields(provider = %profile.provider))]
    pub async fn oauth_sign_in(&self, profile: &OAuthProfile) -> Result<User, AuthError> {
        let provider = profile.provider.as_str();

        if let Some(user_id) = self
            .accounts
            .find_user(provider, &profile.provider_account_id)
            .await?
            && let Some(user) = self.users.get_by_id(user_id).await?
        {
            return Ok(user);
        }

        let user = match self.users.get_by_email(&profile.email).await? {
            Some(user) => {
                // The provider vouches for the address.
                if !user.is_verified() {
                    self.users.mark_email_verified(user.id, &user.email).await?;
                }
                user
            }
            None => {
                self.users
                    .create(&NewUser {
                        name: profile.name.clone(),
                        email: profile.email.clone(),
                        password_hash: None,
                        image: profile.image.clone(),
                        role: UserRole::User,
                        email_verified: true,
                    })
                    .await?
            }
        };

        self.accounts
            .link(user.id, provider, &profile.provider_account_id)
            .await?;
        tracing::info!(user_id = %user.id, "OAuth account linked");
        Ok(user)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Apply the settings form for the signed-in account.
    ///
    /// Every check runs before anything is written. The profile is saved in
    /// one statement and the confirmation link for a new address goes out
    /// last.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::OAuthManaged` when an OAuth-only account tries to
    /// change email, password or 2FA; `EmailInUse`; `IncorrectPassword`; or
    /// validation errors.
    pub async fn update_settings(
        &self,
        user_id: UserId,
        update: &SettingsUpdate,
    ) -> Result<SettingsOutcome, AuthError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let change = prepare_settings(&user, update)?;

        if let Some(email) = &change.new_email
            && self.users.get_by_email(email).await?.is_some()
        {
            return Err(AuthError::EmailInUse);
        }

        let user = self
            .users
            .save_settings(
                user.id,
                &change.name,
                change.is_two_factor_enabled,
                change.password_hash.as_deref(),
            )
            .await?;

        let verification_sent = match &change.new_email {
            Some(email) => {
                self.send_verification(email, Some(user.id)).await?;
                true
            }
            None => false,
        };

        Ok(SettingsOutcome {
            user,
            verification_sent,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}{path}?token={}", self.base_url, urlencoding::encode(token))
    }

    async fn send_verification(&self, email: &Email, user_id: Option<UserId>) -> Result<(), AuthError> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + TokenKind::Verification.lifetime();
        match user_id {
            Some(user_id) => {
                self.tokens
                    .replace_email_change(user_id, email, &token, expires_at)
                    .await?;
            }
            None => {
                self.tokens
                    .replace(TokenKind::Verification, email, &token, expires_at)
                    .await?;
            }
        }

        let link = self.link("/auth/new-verification", &token);
        self.email
            .send_verification_email(email.as_str(), &link)
            .await?;
        Ok(())
    }

    async fn send_two_factor_code(&self, email: &Email) -> Result<(), AuthError> {
        let code = generate_two_factor_code();
        let expires_at = Utc::now() + TokenKind::TwoFactor.lifetime();
        self.tokens
            .replace(TokenKind::TwoFactor, email, &code, expires_at)
            .await?;
        self.email.send_two_factor_code(email.as_str(), &code).await?;
        Ok(())
    }
}

/// Validate the settings form against the stored account.
///
/// A password change needs the current password; an email change only
/// needs the new address to be confirmed later.
fn prepare_settings(user: &User, update: &SettingsUpdate) -> Result<SettingsChange, AuthError> {
    let name = validate_name(&update.name)?;

    let new_email = update
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(Email::parse)
        .transpose()?
        .filter(|e| *e != user.email);
    let new_password = update.new_password.as_deref().filter(|p| !p.is_empty());

    if user.is_oauth_only()
        && (new_email.is_some()
            || new_password.is_some()
            || update.is_two_factor_enabled != user.is_two_factor_enabled)
    {
        return Err(AuthError::OAuthManaged);
    }

    let password_hash = match (new_password, user.password_hash.as_deref()) {
        (Some(new_password), Some(hash)) => {
            let current = update.current_password.as_deref().unwrap_or_default();
            verify_password(current, hash).map_err(|_| AuthError::IncorrectPassword)?;
            validate_password(new_password)?;
            Some(hash_password(new_password)?)
        }
        _ => None,
    };

    Ok(SettingsChange {
        name,
        new_email,
        password_hash,
        is_two_factor_enabled: update.is_two_factor_enabled,
    })
}

/// Compare a submitted login code with the stored one.
fn check_code(token: &EmailToken, code: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
    if token.token != code {
        return Err(AuthError::InvalidCode);
    }
    if token.is_expired(now) {
        return Err(AuthError::CodeExpired);
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String, AuthError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName);
    }
    Ok(name.to_string())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
