//! Emailed one-time tokens and two-factor confirmations.
//!
//! The three token tables share one layout, so a single repository serves
//! them all keyed by [`TokenKind`]. Each email holds at most one live token
//! per kind: issuing a new one replaces the old.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use pharmacy_core::{Email, UserId};

use super::RepositoryError;
use super::users::parse_email;

/// Which token table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Email address confirmation (UUID, 1 hour).
    Verification,
    /// Password reset link (UUID, 1 hour).
    PasswordReset,
    /// Login code (6 digits, 5 minutes).
    TwoFactor,
}

impl TokenKind {
    /// Table name. Only these literals ever reach SQL.
    const fn table(self) -> &'static str {
        match self {
            Self::Verification => "rx.verification_token",
            Self::PasswordReset => "rx.password_reset_token",
            Self::TwoFactor => "rx.two_factor_token",
        }
    }

    /// Selected columns; only verification tokens link to an account.
    const fn columns(self) -> &'static str {
        match self {
            Self::Verification => "id, email, token, expires_at, user_id",
            Self::PasswordReset | Self::TwoFactor => {
                "id, email, token, expires_at, NULL::int4 AS user_id"
            }
        }
    }

    /// How long a freshly issued token stays valid.
    #[must_use]
    pub fn lifetime(self) -> Duration {
        match self {
            Self::Verification | Self::PasswordReset => Duration::hours(1),
            Self::TwoFactor => Duration::minutes(5),
        }
    }
}

/// A stored token.
#[derive(Debug, Clone)]
pub struct EmailToken {
    pub id: i32,
    pub email: Email,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Account changing its address to `email`.
    pub user_id: Option<UserId>,
}

impl EmailToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    id: i32,
    email: String,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: Option<i32>,
}

impl TryFrom<TokenRow> for EmailToken {
    type Error = RepositoryError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: parse_email(&row.email)?,
            token: row.token,
            expires_at: row.expires_at,
            user_id: row.user_id.map(UserId::new),
        })
    }
}

/// Repository for token and confirmation tables.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a token for `email`, replacing any existing one of this kind.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn replace(
        &self,
        kind: TokenKind,
        email: &Email,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<EmailToken, RepositoryError> {
        self.replace_inner(kind, email, token, expires_at, None).await
    }

    /// Store a verification token confirming that `user_id` owns `email`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn replace_email_change(
        &self,
        user_id: UserId,
        email: &Email,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<EmailToken, RepositoryError> {
        self.replace_inner(TokenKind::Verification, email, token, expires_at, Some(user_id))
            .await
    }

    async fn replace_inner(
        &self,
        kind: TokenKind,
        email: &Email,
        token: &str,
        expires_at: DateTime<Utc>,
        user_id: Option<UserId>,
    ) -> Result<EmailToken, RepositoryError> {
        let table = kind.table();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {table} WHERE email = $1"))
            .bind(email.as_str())
            .execute(&mut *tx)
            .await?;

        let mut insert =
            QueryBuilder::<Postgres>::new(format!("INSERT INTO {table} (email, token, expires_at"));
        if user_id.is_some() {
            insert.push(", user_id");
        }
        insert
            .push(") VALUES (")
            .push_bind(email.as_str())
            .push(", ")
            .push_bind(token)
            .push(", ")
            .push_bind(expires_at);
        if let Some(user_id) = user_id {
            insert.push(", ").push_bind(user_id.as_i32());
        }
        insert.push(") RETURNING ").push(kind.columns());

        let row: TokenRow = insert
            .build_query_as()
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "token"))?;

        tx.commit().await?;
        row.try_into()
    }

    /// Look a token up by its value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_token(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<Option<EmailToken>, RepositoryError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM {} WHERE token = $1",
            kind.columns(),
            kind.table()
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// The live token for an email, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_email(
        &self,
        kind: TokenKind,
        email: &Email,
    ) -> Result<Option<EmailToken>, RepositoryError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM {} WHERE email = $1",
            kind.columns(),
            kind.table()
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Delete a token once used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, kind: TokenKind, id: i32) -> Result<(), RepositoryError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", kind.table()))
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record that `user_id` passed the code step, replacing any previous
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn replace_confirmation(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM rx.two_factor_confirmation WHERE user_id = $1")
            .bind(user_id.as_i32())
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO rx.two_factor_confirmation (user_id) VALUES ($1)")
            .bind(user_id.as_i32())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete the confirmation for `user_id`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_confirmation(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.two_factor_confirmation WHERE user_id = $1")
            .bind(user_id.as_i32())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetimes() {
        assert_eq!(TokenKind::Verification.lifetime(), Duration::hours(1));
        assert_eq!(TokenKind::PasswordReset.lifetime(), Duration::hours(1));
        assert_eq!(TokenKind::TwoFactor.lifetime(), Duration::minutes(5));
    }

    #[test]
    fn test_only_verification_tokens_carry_user() {
        assert!(TokenKind::Verification.columns().ends_with(", user_id"));
        assert!(TokenKind::TwoFactor.columns().contains("NULL::int4 AS user_id"));
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let now = Utc::now();
        let token = EmailToken {
            id: 1,
            email: Email::parse("a@b.co").unwrap(),
            token: "123456".to_string(),
            expires_at: now,
            user_id: None,
        };
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }
}
