//! Dashboard figures.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use pharmacy_core::{CategoryId, DashboardRange, Money, OrderStatus, ProductId};

use super::order::OrderListItem;

/// Aggregates for one reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodTotals {
    /// Sum of non-cancelled order totals.
    pub revenue: Money,
    pub order_count: i64,
    pub new_customers: i64,
}

impl PeriodTotals {
    #[must_use]
    pub fn average_order_value(&self) -> Money {
        if self.order_count == 0 {
            return Money::ZERO;
        }
        Money::new((self.revenue.amount() / Decimal::from(self.order_count)).round_dp(2))
    }
}

/// A summary figure with its change against the previous window.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub label: &'static str,
    pub value: String,
    /// `None` when the previous value was zero.
    pub change_pct: Option<f64>,
}

impl Metric {
    /// `+12.5%`, or `n/a` when there is nothing to compare against.
    #[must_use]
    pub fn change_label(&self) -> String {
        self.change_pct
            .map_or_else(|| "n/a".to_string(), |pct| format!("{pct:+.1}%"))
    }

    #[must_use]
    pub fn is_decrease(&self) -> bool {
        self.change_pct.is_some_and(|pct| pct < 0.0)
    }
}

/// One bucket of the revenue series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevenuePoint {
    pub bucket: NaiveDate,
    pub revenue: Money,
    pub order_count: i64,
}

/// Sales rolled up into a top-level category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySales {
    pub category_id: CategoryId,
    pub name: String,
    pub revenue: Money,
    pub units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub revenue: Money,
    pub units: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Everything the dashboard page renders.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub range: DashboardRange,
    pub current: PeriodTotals,
    pub previous: PeriodTotals,
    pub metrics: Vec<Metric>,
    pub series: Vec<RevenuePoint>,
    pub categories: Vec<CategorySales>,
    pub top_products: Vec<TopProduct>,
    pub recent_orders: Vec<OrderListItem>,
    pub status_counts: Vec<StatusCount>,
}
