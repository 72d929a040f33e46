//! Linked OAuth identities.

use sqlx::PgPool;

use pharmacy_core::UserId;

use super::RepositoryError;

/// Repository for `rx.oauth_account`.
pub struct OAuthAccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OAuthAccountRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The account linked to a provider identity, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_user(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<UserId>, RepositoryError> {
        let id: Option<i32> = sqlx::query_scalar(
            "SELECT user_id FROM rx.oauth_account \
             WHERE provider = $1 AND provider_account_id = $2",
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(id.map(UserId::new))
    }

    /// Link a provider identity to an account. Linking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn link(
        &self,
        user_id: UserId,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rx.oauth_account (user_id, provider, provider_account_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (provider, provider_account_id) DO NOTHING",
        )
        .bind(user_id.as_i32())
        .bind(provider)
        .bind(provider_account_id)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "account link"))?;

        Ok(())
    }
}
