//! Reporting queries behind the dashboard.
//!
//! All windows are half-open `[start, end)` on calendar dates in UTC.
//! Cancelled orders never count towards revenue, order counts or units.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use pharmacy_core::{Bucket, CategoryId, Money, ProductId};

use super::RepositoryError;
use super::orders::{ORDER_LIST_SELECT, OrderListRow, day_start, parse_status};
use crate::models::dashboard::{CategorySales, PeriodTotals, StatusCount, TopProduct};
use crate::models::order::OrderListItem;

/// Revenue per category, rolled up to each top-level ancestor.
const CATEGORY_ROLLUP_SQL: &str = "\
WITH RECURSIVE tree AS ( \
    SELECT id, id AS root_id FROM rx.category WHERE parent_id IS NULL \
    UNION ALL \
    SELECT c.id, t.root_id FROM rx.category c JOIN tree t ON c.parent_id = t.id \
), sales AS ( \
    SELECT p.category_id, SUM(d.quantity * d.unit_price) AS revenue, SUM(d.quantity)::int8 AS units \
    FROM rx.order_detail d \
    JOIN rx.customer_order o ON o.id = d.order_id \
    JOIN rx.product_variant v ON v.id = d.product_variant_id \
    JOIN rx.product p ON p.id = v.product_id \
    WHERE o.status <> 'cancelled' AND o.created_at >= $1 AND o.created_at < $2 \
    GROUP BY p.category_id \
) \
SELECT r.id AS category_id, r.name, \
       COALESCE(SUM(s.revenue), 0) AS revenue, COALESCE(SUM(s.units), 0)::int8 AS units \
FROM tree t \
JOIN rx.category r ON r.id = t.root_id \
LEFT JOIN sales s ON s.category_id = t.id \
GROUP BY r.id, r.name \
ORDER BY revenue DESC, r.name";

#[derive(Debug, sqlx::FromRow)]
struct CategorySalesRow {
    category_id: i32,
    name: String,
    revenue: Decimal,
    units: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TopProductRow {
    product_id: i32,
    name: String,
    revenue: Decimal,
    units: i64,
}

/// One `GROUP BY date_trunc` row of the revenue series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct SeriesRow {
    pub bucket: NaiveDate,
    pub revenue: Decimal,
    pub order_count: i64,
}

/// Repository for dashboard aggregates.
pub struct DashboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Revenue, order count and customer sign-ups in a window.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn period_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PeriodTotals, RepositoryError> {
        let (revenue, order_count, new_customers): (Decimal, i64, i64) = sqlx::query_as(
            "SELECT \
                 (SELECT COALESCE(SUM(total), 0) FROM rx.customer_order \
                  WHERE status <> 'cancelled' AND created_at >= $1 AND created_at < $2), \
                 (SELECT COUNT(*) FROM rx.customer_order \
                  WHERE status <> 'cancelled' AND created_at >= $1 AND created_at < $2), \
                 (SELECT COUNT(*) FROM rx.app_user \
                  WHERE role = 'user' AND created_at >= $1 AND created_at < $2)",
        )
        .bind(day_start(start))
        .bind(day_start(end))
        .fetch_one(self.pool)
        .await?;

        Ok(PeriodTotals {
            revenue: Money::new(revenue),
            order_count,
            new_customers,
        })
    }

    /// Sparse revenue series; buckets without orders are absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue_series(
        &self,
        bucket: Bucket,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeriesRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, SeriesRow>(
            "SELECT (date_trunc($1, created_at AT TIME ZONE 'UTC'))::date AS bucket, \
                    COALESCE(SUM(total), 0) AS revenue, COUNT(*) AS order_count \
             FROM rx.customer_order \
             WHERE status <> 'cancelled' AND created_at >= $2 AND created_at < $3 \
             GROUP BY 1 ORDER BY 1",
        )
        .bind(bucket.date_trunc_unit())
        .bind(day_start(start))
        .bind(day_start(end))
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Sales per top-level category, including descendants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn category_sales(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CategorySales>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategorySalesRow>(CATEGORY_ROLLUP_SQL)
            .bind(day_start(start))
            .bind(day_start(end))
            .fetch_all(self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategorySales {
                category_id: CategoryId::new(row.category_id),
                name: row.name,
                revenue: Money::new(row.revenue),
                units: row.units,
            })
            .collect())
    }

    /// Best-selling products by revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        limit: i64,
    ) -> Result<Vec<TopProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopProductRow>(
            "SELECT p.id AS product_id, p.name, \
                    SUM(d.quantity * d.unit_price) AS revenue, SUM(d.quantity)::int8 AS units \
             FROM rx.order_detail d \
             JOIN rx.customer_order o ON o.id = d.order_id \
             JOIN rx.product_variant v ON v.id = d.product_variant_id \
             JOIN rx.product p ON p.id = v.product_id \
             WHERE o.status <> 'cancelled' AND o.created_at >= $1 AND o.created_at < $2 \
             GROUP BY p.id, p.name \
             ORDER BY revenue DESC, p.name \
             LIMIT $3",
        )
        .bind(day_start(start))
        .bind(day_start(end))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TopProduct {
                product_id: ProductId::new(row.product_id),
                name: row.name,
                revenue: Money::new(row.revenue),
                units: row.units,
            })
            .collect())
    }

    /// Latest orders regardless of window.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent_orders(&self, limit: i64) -> Result<Vec<OrderListItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderListRow>(&format!(
            "{ORDER_LIST_SELECT} ORDER BY o.created_at DESC, o.id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Orders per status in a window (cancelled included).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn status_counts(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status::text, COUNT(*) FROM rx.customer_order \
             WHERE created_at >= $1 AND created_at < $2 \
             GROUP BY status ORDER BY status",
        )
        .bind(day_start(start))
        .bind(day_start(end))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: parse_status(&status)?,
                    count,
                })
            })
            .collect()
    }
}
