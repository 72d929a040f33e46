//! Discount code repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use pharmacy_core::{DiscountCodeId, DiscountKind, Money, Page, PageRequest};

use super::{RepositoryError, like_pattern};
use crate::models::discount::{DiscountCode, DiscountFilter, DiscountInput};

const DISCOUNT_COLUMNS: &str = "id, code, kind::text AS kind, value, min_order_total, max_uses, \
     times_used, starts_at, expires_at, is_active, created_at";

#[derive(Debug, sqlx::FromRow)]
struct DiscountRow {
    id: i32,
    code: String,
    kind: String,
    value: Decimal,
    min_order_total: Option<Decimal>,
    max_uses: Option<i32>,
    times_used: i32,
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for DiscountCode {
    type Error = RepositoryError;

    fn try_from(row: DiscountRow) -> Result<Self, Self::Error> {
        let kind: DiscountKind = row.kind.parse().map_err(RepositoryError::DataCorruption)?;
        Ok(Self {
            id: DiscountCodeId::new(row.id),
            code: row.code,
            kind,
            value: row.value,
            min_order_total: row.min_order_total.map(Money::new),
            max_uses: row.max_uses,
            times_used: row.times_used,
            starts_at: row.starts_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q DiscountFilter) {
    qb.push(" WHERE TRUE");
    if let Some(search) = &filter.search {
        qb.push(" AND code ILIKE ").push_bind(like_pattern(search));
    }
    if let Some(active) = filter.active {
        qb.push(" AND is_active = ").push_bind(active);
    }
}

/// Repository for `rx.discount_code`.
pub struct DiscountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DiscountRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Page through codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        filter: &DiscountFilter,
        page: PageRequest,
    ) -> Result<Page<DiscountCode>, RepositoryError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM rx.discount_code");
        push_filters(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(self.pool).await?;

        let mut qb = QueryBuilder::new(format!("SELECT {DISCOUNT_COLUMNS} FROM rx.discount_code"));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows: Vec<DiscountRow> = qb.build_query_as().fetch_all(self.pool).await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, page))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: DiscountCodeId) -> Result<Option<DiscountCode>, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM rx.discount_code WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code exists.
    pub async fn create(&self, input: &DiscountInput) -> Result<DiscountCode, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            "INSERT INTO rx.discount_code \
                 (code, kind, value, min_order_total, max_uses, starts_at, expires_at, is_active) \
             VALUES ($1, $2::rx.discount_kind, $3, $4, $5, $6, $7, $8) \
             RETURNING {DISCOUNT_COLUMNS}"
        ))
        .bind(&input.code)
        .bind(input.kind.as_str())
        .bind(input.value)
        .bind(input.min_order_total.map(|m| m.amount()))
        .bind(input.max_uses)
        .bind(input.starts_at)
        .bind(input.expires_at)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "this discount code"))?;

        row.try_into()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new code exists.
    /// Returns `RepositoryError::NotFound` if the discount does not exist.
    pub async fn update(
        &self,
        id: DiscountCodeId,
        input: &DiscountInput,
    ) -> Result<DiscountCode, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountRow>(&format!(
            "UPDATE rx.discount_code SET code = $2, kind = $3::rx.discount_kind, value = $4, \
                 min_order_total = $5, max_uses = $6, starts_at = $7, expires_at = $8, \
                 is_active = $9 \
             WHERE id = $1 RETURNING {DISCOUNT_COLUMNS}"
        ))
        .bind(id.as_i32())
        .bind(&input.code)
        .bind(input.kind.as_str())
        .bind(input.value)
        .bind(input.min_order_total.map(|m| m.amount()))
        .bind(input.max_uses)
        .bind(input.starts_at)
        .bind(input.expires_at)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "this discount code"))?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Flip `is_active`, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the discount does not exist.
    pub async fn toggle_active(&self, id: DiscountCodeId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            "UPDATE rx.discount_code SET is_active = NOT is_active WHERE id = $1 \
             RETURNING is_active",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a code. Orders that used it keep their totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the discount does not exist.
    pub async fn delete(&self, id: DiscountCodeId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.discount_code WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
