//! Dashboard assembly.
//!
//! Runs the dashboard queries concurrently, zero-fills the revenue series and
//! derives the period-over-period metrics. The result is cached under the
//! `dashboard` tag.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::PgPool;
use tracing::instrument;

use pharmacy_core::{DashboardRange, Money};

use crate::db::dashboard::SeriesRow;
use crate::db::{DashboardRepository, RepositoryError};
use crate::models::dashboard::{DashboardData, Metric, PeriodTotals, RevenuePoint};
use crate::services::cache::{CacheKey, CacheTag, CacheValue, QueryCache};

const TOP_PRODUCTS_LIMIT: i64 = 5;
const RECENT_ORDERS_LIMIT: i64 = 5;

/// Builds [`DashboardData`] for a reporting window.
pub struct DashboardService<'a> {
    pool: &'a PgPool,
    cache: &'a QueryCache,
}

impl<'a> DashboardService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a QueryCache) -> Self {
        Self { pool, cache }
    }

    /// Load the dashboard for `range` ending on `today`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if any query fails.
    #[instrument(skip(self))]
    pub async fn load(
        &self,
        range: DashboardRange,
        today: NaiveDate,
    ) -> Result<Arc<DashboardData>, RepositoryError> {
        let key = CacheKey::new(CacheTag::Dashboard, format!("{}:{today}", range.as_str()));
        if let Some(CacheValue::Dashboard(data)) = self.cache.get(&key).await {
            return Ok(data);
        }

        let repo = DashboardRepository::new(self.pool);
        let (start, end) = range.bounds(today);
        let (prev_start, prev_end) = range.previous_bounds(today);

        let (current, previous, rows, categories, top_products, recent_orders, status_counts) =
            tokio::try_join!(
                repo.period_totals(start, end),
                repo.period_totals(prev_start, prev_end),
                repo.revenue_series(range.bucket(), start, end),
                repo.category_sales(start, end),
                repo.top_products(start, end, TOP_PRODUCTS_LIMIT),
                repo.recent_orders(RECENT_ORDERS_LIMIT),
                repo.status_counts(start, end),
            )?;

        let data = Arc::new(DashboardData {
            range,
            metrics: metrics(&current, &previous),
            current,
            previous,
            series: fill_series(&range.buckets(today), rows),
            categories,
            top_products,
            recent_orders,
            status_counts,
        });

        self.cache
            .insert(key, CacheValue::Dashboard(Arc::clone(&data)))
            .await;
        Ok(data)
    }
}

/// Place sparse SQL rows into the full bucket list; missing buckets are zero.
///
/// Both inputs are ascending, so a single merge pass is enough. Rows whose
/// bucket is not in the list are dropped.
#[must_use]
pub fn fill_series(buckets: &[NaiveDate], rows: Vec<SeriesRow>) -> Vec<RevenuePoint> {
    let mut rows = rows.into_iter().peekable();
    buckets
        .iter()
        .map(|&bucket| {
            while rows.next_if(|row| row.bucket < bucket).is_some() {}
            match rows.next_if(|row| row.bucket == bucket) {
                Some(row) => RevenuePoint {
                    bucket,
                    revenue: Money::new(row.revenue),
                    order_count: row.order_count,
                },
                None => RevenuePoint {
                    bucket,
                    revenue: Money::ZERO,
                    order_count: 0,
                },
            }
        })
        .collect()
}

/// Percentage change from `previous` to `current`; `None` when `previous` is zero.
#[must_use]
pub fn pct_change(current: Decimal, previous: Decimal) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    ((current - previous) / previous * Decimal::ONE_HUNDRED)
        .round_dp(1)
        .to_f64()
}

fn metrics(current: &PeriodTotals, previous: &PeriodTotals) -> Vec<Metric> {
    let aov = current.average_order_value();
    let prev_aov = previous.average_order_value();
    vec![
        Metric {
            label: "Revenue",
            value: current.revenue.to_string(),
            change_pct: pct_change(current.revenue.amount(), previous.revenue.amount()),
        },
        Metric {
            label: "Orders",
            value: current.order_count.to_string(),
            change_pct: pct_change(current.order_count.into(), previous.order_count.into()),
        },
        Metric {
            label: "New customers",
            value: current.new_customers.to_string(),
            change_pct: pct_change(current.new_customers.into(), previous.new_customers.into()),
        },
        Metric {
            label: "Average order value",
            value: aov.to_string(),
            change_pct: pct_change(aov.amount(), prev_aov.amount()),
        },
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn row(d: u32, cents: i64, count: i64) -> SeriesRow {
        SeriesRow {
            bucket: date(d),
            revenue: Decimal::new(cents, 2),
            order_count: count,
        }
    }

    #[test]
    fn test_fill_series_zero_fills_gaps() {
        let buckets: Vec<_> = (1..=5).map(date).collect();
        let series = fill_series(&buckets, vec![row(2, 1500, 1), row(4, 2500, 2)]);

        assert_eq!(series.len(), 5);
        assert_eq!(series[0].revenue, Money::ZERO);
        assert_eq!(series[1].revenue.amount(), Decimal::new(1500, 2));
        assert_eq!(series[2].order_count, 0);
        assert_eq!(series[3].order_count, 2);
        assert_eq!(series[4].bucket, date(5));
    }

    #[test]
    fn test_fill_series_ignores_rows_outside_buckets() {
        let buckets: Vec<_> = (3..=4).map(date).collect();
        let series = fill_series(&buckets, vec![row(1, 100, 1), row(4, 200, 1), row(9, 300, 1)]);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].order_count, 0);
        assert_eq!(series[1].revenue.amount(), Decimal::new(200, 2));
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(Decimal::from(150), Decimal::from(100)), Some(50.0));
        assert_eq!(pct_change(Decimal::from(50), Decimal::from(200)), Some(-75.0));
        assert_eq!(pct_change(Decimal::from(10), Decimal::ZERO), None);
        assert_eq!(pct_change(Decimal::ONE, Decimal::from(8)), Some(-87.5));
    }

    #[test]
    fn test_metrics_order_and_labels() {
        let current = PeriodTotals {
            revenue: Money::new(Decimal::from(200)),
            order_count: 4,
            new_customers: 0,
        };
        let previous = PeriodTotals {
            revenue: Money::new(Decimal::from(100)),
            order_count: 4,
            new_customers: 0,
        };

        let metrics = metrics(&current, &previous);
        let labels: Vec<_> = metrics.iter().map(|m| m.label).collect();
        assert_eq!(labels, ["Revenue", "Orders", "New customers", "Average order value"]);
        assert_eq!(metrics[0].value, "$200.00");
        assert_eq!(metrics[0].change_pct, Some(100.0));
        assert_eq!(metrics[1].change_pct, Some(0.0));
        assert_eq!(metrics[2].change_pct, None);
        assert_eq!(metrics[3].value, "$50.00");
    }
}
