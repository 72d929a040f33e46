//! Account repository.
//!
//! Covers both back-office staff and storefront customers; they share
//! `rx.app_user` and differ only by `role`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use pharmacy_core::{Email, Money, Page, PageRequest, UserId, UserRole};

use super::{RepositoryError, like_pattern};
use crate::models::user::{NewUser, User, UserDetail, UserFilter, UserListItem, UserSearchHit};

// =============================================================================
// Internal Row Types
// =============================================================================

const USER_COLUMNS: &str = "id, name, email, email_verified, password_hash, image, \
     role::text AS role, is_two_factor_enabled, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    email_verified: Option<DateTime<Utc>>,
    password_hash: Option<String>,
    image: Option<String>,
    role: String,
    is_two_factor_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(super) fn parse_email(raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))
}

fn parse_role(raw: &str) -> Result<UserRole, RepositoryError> {
    raw.parse().map_err(RepositoryError::DataCorruption)
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email: parse_email(&row.email)?,
            email_verified: row.email_verified,
            password_hash: row.password_hash,
            image: row.image,
            role: parse_role(&row.role)?,
            is_two_factor_enabled: row.is_two_factor_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserListRow {
    id: i32,
    name: String,
    email: String,
    role: String,
    is_verified: bool,
    is_oauth: bool,
    order_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserListRow> for UserListItem {
    type Error = RepositoryError;

    fn try_from(row: UserListRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email: parse_email(&row.email)?,
            role: parse_role(&row.role)?,
            is_verified: row.is_verified,
            is_oauth: row.is_oauth,
            order_count: row.order_count,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SearchRow {
    id: i32,
    name: String,
    email: String,
}

impl TryFrom<SearchRow> for UserSearchHit {
    type Error = RepositoryError;

    fn try_from(row: SearchRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email: parse_email(&row.email)?,
        })
    }
}

/// Append `WHERE` clauses for the users table filter.
fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q UserFilter) {
    qb.push(" WHERE TRUE");
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = filter.role {
        qb.push(" AND u.role::text = ").push_bind(role.as_str());
    }
}

fn count_query(filter: &UserFilter) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM rx.app_user u");
    push_filters(&mut qb, filter);
    qb
}

fn list_query(filter: &UserFilter, page: PageRequest) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT u.id, u.name, u.email, u.role::text AS role, \
         u.email_verified IS NOT NULL AS is_verified, \
         u.password_hash IS NULL AS is_oauth, \
         (SELECT COUNT(*) FROM rx.customer_order o WHERE o.user_id = u.id) AS order_count, \
         u.created_at \
         FROM rx.app_user u",
    );
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY u.created_at DESC, u.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    qb
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for account database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM rx.app_user WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get an account by email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the data is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM rx.app_user WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert an account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    pub async fn create(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO rx.app_user (name, email, password_hash, image, role, email_verified) \
             VALUES ($1, $2, $3, $4, $5::rx.user_role, CASE WHEN $6 THEN now() END) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(new.email.as_str())
        .bind(new.password_hash.as_deref())
        .bind(new.image.as_deref())
        .bind(new.role.as_str())
        .bind(new.email_verified)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "an account with this email"))?;

        row.try_into()
    }

    /// Mark an address as verified, switching the account to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account is gone.
    /// Returns `RepositoryError::Conflict` if another account took the address.
    pub async fn mark_email_verified(&self, id: UserId, email: &Email) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE rx.app_user SET email = $2, email_verified = now(), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(email.as_str())
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "an account with this email"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Replace the password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account is gone.
    pub async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE rx.app_user SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(hash)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Save the settings page: name, 2FA flag and, when given, a new
    /// password hash, all in one statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account is gone.
    pub async fn save_settings(
        &self,
        id: UserId,
        name: &str,
        is_two_factor_enabled: bool,
        password_hash: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE rx.app_user SET name = $2, is_two_factor_enabled = $3, \
             password_hash = COALESCE($4, password_hash), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(name)
        .bind(is_two_factor_enabled)
        .bind(password_hash)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Change an account's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account does not exist.
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE rx.app_user SET role = $2::rx.user_role, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(role.as_str())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete an account. Orders keep their row with `user_id` cleared.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the account does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.app_user WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Page through accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<UserListItem>, RepositoryError> {
        let (total,): (i64,) = count_query(filter)
            .build_query_as()
            .fetch_one(self.pool)
            .await?;

        let rows: Vec<UserListRow> = list_query(filter, page)
            .build_query_as()
            .fetch_all(self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page))
    }

    /// An account with order statistics and linked providers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(&self, id: UserId) -> Result<Option<UserDetail>, RepositoryError> {
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let (order_count, lifetime_spend): (i64, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total) FILTER (WHERE status <> 'cancelled'), 0) \
             FROM rx.customer_order WHERE user_id = $1",
        )
        .bind(id.as_i32())
        .fetch_one(self.pool)
        .await?;

        let providers: Vec<String> = sqlx::query_scalar(
            "SELECT provider FROM rx.oauth_account WHERE user_id = $1 ORDER BY provider",
        )
        .bind(id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(Some(UserDetail {
            user,
            order_count,
            lifetime_spend: Money::new(lifetime_spend),
            providers,
        }))
    }

    /// Name/email search for pickers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<UserSearchHit>, RepositoryError> {
        let pattern = like_pattern(term);
        let rows = sqlx::query_as::<_, SearchRow>(
            "SELECT id, name, email FROM rx.app_user \
             WHERE name ILIKE $1 OR email ILIKE $1 \
             ORDER BY name LIMIT $2",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Number of admin accounts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_admins(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM rx.app_user WHERE role = 'admin'")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
