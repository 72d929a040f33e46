//! Order repository.
//!
//! The list query is assembled with `QueryBuilder`: every user-supplied
//! value is bound, and sort columns come from [`OrderSortColumn::sql`].

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use pharmacy_core::{
    DiscountCodeId, Money, OrderDetailId, OrderId, OrderStatus, Page, ProductId, UserId, VariantId,
};

use super::users::parse_email;
use super::{RepositoryError, like_pattern};
use crate::models::order::{
    Order, OrderCustomer, OrderDetail, OrderLine, OrderListItem, OrderQuery,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: Option<i32>,
    status: String,
    subtotal: Decimal,
    discount_total: Decimal,
    total: Decimal,
    discount_code_id: Option<i32>,
    shipping_name: String,
    shipping_address: String,
    shipping_city: String,
    shipping_postal_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(super) fn parse_status(raw: &str) -> Result<OrderStatus, RepositoryError> {
    raw.parse().map_err(RepositoryError::DataCorruption)
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            user_id: row.user_id.map(UserId::new),
            status: parse_status(&row.status)?,
            subtotal: Money::new(row.subtotal),
            discount_total: Money::new(row.discount_total),
            total: Money::new(row.total),
            discount_code_id: row.discount_code_id.map(DiscountCodeId::new),
            shipping_name: row.shipping_name,
            shipping_address: row.shipping_address,
            shipping_city: row.shipping_city,
            shipping_postal_code: row.shipping_postal_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct OrderListRow {
    id: i32,
    status: String,
    total: Decimal,
    customer_name: String,
    customer_email: Option<String>,
    item_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderListRow> for OrderListItem {
    type Error = RepositoryError;

    fn try_from(row: OrderListRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            status: parse_status(&row.status)?,
            total: Money::new(row.total),
            customer_name: row.customer_name,
            customer_email: row.customer_email.as_deref().map(parse_email).transpose()?,
            item_count: row.item_count,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: i32,
    product_id: i32,
    product_name: String,
    variant_id: i32,
    variant_name: String,
    sku: String,
    quantity: i32,
    unit_price: Decimal,
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        Self {
            id: OrderDetailId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            variant_id: VariantId::new(row.variant_id),
            variant_name: row.variant_name,
            sku: row.sku,
            quantity: row.quantity,
            unit_price: Money::new(row.unit_price),
        }
    }
}

// =============================================================================
// List Query
// =============================================================================

/// Shared `SELECT ... FROM` for order rows in tables.
pub(super) const ORDER_LIST_SELECT: &str =
    "SELECT o.id, o.status::text AS status, o.total, \
     COALESCE(u.name, o.shipping_name) AS customer_name, u.email AS customer_email, \
     (SELECT COALESCE(SUM(d.quantity), 0)::int8 FROM rx.order_detail d WHERE d.order_id = o.id) AS item_count, \
     o.created_at \
     FROM rx.customer_order o LEFT JOIN rx.app_user u ON u.id = o.user_id";

/// Midnight UTC at the start of `date`.
pub(super) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, query: &'q OrderQuery) {
    qb.push(" WHERE TRUE");

    if let Some(search) = &query.search {
        let trimmed = search.trim_start_matches('#');
        let pattern = like_pattern(trimmed);
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.shipping_name ILIKE ")
            .push_bind(pattern);
        if let Ok(id) = trimmed.parse::<i32>() {
            qb.push(" OR o.id = ").push_bind(id);
        }
        qb.push(")");
    }

    if !query.statuses.is_empty() {
        let statuses: Vec<&'static str> = query.statuses.iter().map(OrderStatus::as_str).collect();
        qb.push(" AND o.status::text = ANY(").push_bind(statuses).push(")");
    }

    if let Some(from) = query.from {
        qb.push(" AND o.created_at >= ").push_bind(day_start(from));
    }
    if let Some(to) = query.to {
        // Inclusive of the whole `to` day.
        let end = to.checked_add_days(Days::new(1)).unwrap_or(to);
        qb.push(" AND o.created_at < ").push_bind(day_start(end));
    }

    if let Some(customer) = query.customer_id {
        qb.push(" AND o.user_id = ").push_bind(customer.as_i32());
    }
}

fn count_query(query: &OrderQuery) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(*) FROM rx.customer_order o LEFT JOIN rx.app_user u ON u.id = o.user_id",
    );
    push_filters(&mut qb, query);
    qb
}

fn list_query(query: &OrderQuery) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(ORDER_LIST_SELECT);
    push_filters(&mut qb, query);
    qb.push(" ORDER BY ")
        .push(query.sort.sql())
        .push(" ")
        .push(query.direction.sql())
        .push(", o.id ")
        .push(query.direction.sql())
        .push(" LIMIT ")
        .push_bind(query.page.limit())
        .push(" OFFSET ")
        .push_bind(query.page.offset());
    qb
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders and order lines.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Filtered, sorted page of orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if a row is invalid.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: &OrderQuery) -> Result<Page<OrderListItem>, RepositoryError> {
        let (total,): (i64,) = count_query(query)
            .build_query_as()
            .fetch_one(self.pool)
            .await?;

        let rows: Vec<OrderListRow> = list_query(query)
            .build_query_as()
            .fetch_all(self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, total, query.page))
    }

    /// An order with its customer and line items.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, status::text AS status, subtotal, discount_total, total, \
                    discount_code_id, shipping_name, shipping_address, shipping_city, \
                    shipping_postal_code, created_at, updated_at \
             FROM rx.customer_order WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order: Order = row.try_into()?;

        let customer = match order.user_id {
            Some(user_id) => {
                let row: Option<(i32, String, String)> =
                    sqlx::query_as("SELECT id, name, email FROM rx.app_user WHERE id = $1")
                        .bind(user_id.as_i32())
                        .fetch_optional(self.pool)
                        .await?;
                row.map(|(id, name, email)| {
                    Ok::<_, RepositoryError>(OrderCustomer {
                        id: UserId::new(id),
                        name,
                        email: parse_email(&email)?,
                    })
                })
                .transpose()?
            }
            None => None,
        };

        let discount_code: Option<String> = match order.discount_code_id {
            Some(code_id) => {
                sqlx::query_scalar("SELECT code FROM rx.discount_code WHERE id = $1")
                    .bind(code_id.as_i32())
                    .fetch_optional(self.pool)
                    .await?
            }
            None => None,
        };

        let lines = sqlx::query_as::<_, LineRow>(
            "SELECT d.id, p.id AS product_id, p.name AS product_name, v.id AS variant_id, \
                    v.name AS variant_name, v.sku, d.quantity, d.unit_price \
             FROM rx.order_detail d \
             JOIN rx.product_variant v ON v.id = d.product_variant_id \
             JOIN rx.product p ON p.id = v.product_id \
             WHERE d.order_id = $1 ORDER BY d.id",
        )
        .bind(id.as_i32())
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        Ok(Some(OrderDetail {
            order,
            customer,
            lines,
            discount_code,
        }))
    }

    /// Write a new status if the order is still in `from`.
    ///
    /// The transition itself is validated by the caller; the `status = from`
    /// guard makes concurrent edits lose instead of skipping a state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or
    /// changed status in the meantime.
    pub async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE rx.customer_order SET status = $3::rx.order_status, updated_at = now() \
             WHERE id = $1 AND status = $2::rx.order_status",
        )
        .bind(id.as_i32())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tracing::info!(order_id = %id, from = %from, to = %to, "Order status changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SortDirection;
    use crate::models::order::OrderSortColumn;

    #[test]
    fn test_default_sort_is_newest_first() {
        let query = OrderQuery::default();
        let qb = list_query(&query);
        let sql = qb.sql();
        assert!(sql.contains("WHERE TRUE ORDER BY o.created_at DESC, o.id DESC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn test_all_filters_bind_in_order() {
        let query = OrderQuery {
            search: Some("#42".to_string()),
            statuses: vec![OrderStatus::Pending, OrderStatus::Processing],
            from: NaiveDate::from_ymd_opt(2026, 3, 1),
            to: NaiveDate::from_ymd_opt(2026, 3, 31),
            customer_id: Some(UserId::new(9)),
            sort: OrderSortColumn::Customer,
            direction: SortDirection::Asc,
            ..OrderQuery::default()
        };
        let qb = list_query(&query);
        let sql = qb.sql();
        assert!(sql.contains("u.name ILIKE $1 OR u.email ILIKE $2 OR o.shipping_name ILIKE $3 OR o.id = $4)"));
        assert!(sql.contains("o.status::text = ANY($5)"));
        assert!(sql.contains("o.created_at >= $6"));
        assert!(sql.contains("o.created_at < $7"));
        assert!(sql.contains("o.user_id = $8"));
        assert!(sql.contains("ORDER BY lower(COALESCE(u.name, o.shipping_name)) ASC, o.id ASC"));
        assert!(!sql.contains("42"));
    }

    #[test]
    fn test_non_numeric_search_skips_id_match() {
        let query = OrderQuery {
            search: Some("smith".to_string()),
            ..OrderQuery::default()
        };
        let sql = count_query(&query).sql().to_string();
        assert!(!sql.contains("o.id ="));
    }

    #[test]
    fn test_day_start_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap_or_default();
        assert_eq!(day_start(date).to_rfc3339(), "2026-03-01T00:00:00+00:00");
    }
}
