//! Dashboard route handler.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::{Query, State};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use pharmacy_core::{Bucket, DashboardRange};

use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::dashboard::{DashboardData, RevenuePoint};
use crate::services::DashboardService;
use crate::state::AppState;

use super::{AdminUserView, Flash, MessageQuery};

/// Dashboard query parameters.
#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub range: Option<String>,
}

/// One bar of the revenue chart.
#[derive(Debug, Clone)]
pub struct ChartBar {
    pub label: String,
    pub revenue: String,
    pub order_count: i64,
    /// Bar height as a percentage of the tallest bar.
    pub height_pct: u32,
}

/// A range selector option.
#[derive(Debug, Clone)]
pub struct RangeOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard/index.html")]
pub struct DashboardTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub ranges: Vec<RangeOption>,
    pub data: Arc<DashboardData>,
    pub chart: Vec<ChartBar>,
}

/// Dashboard page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    Query(message): Query<MessageQuery>,
) -> Result<DashboardTemplate, AppError> {
    let range = DashboardRange::from_param(query.range.as_deref());
    let today = chrono::Utc::now().date_naive();

    let data = DashboardService::new(state.pool(), state.cache())
        .load(range, today)
        .await?;

    Ok(DashboardTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/".to_string(),
        flash: message.into(),
        ranges: DashboardRange::ALL
            .iter()
            .map(|r| RangeOption {
                value: r.as_str(),
                label: r.label(),
                selected: *r == range,
            })
            .collect(),
        chart: chart_bars(&data.series, range.bucket()),
        data,
    })
}

/// Scale the revenue series to bar heights.
fn chart_bars(series: &[RevenuePoint], bucket: Bucket) -> Vec<ChartBar> {
    let max = series
        .iter()
        .map(|p| p.revenue.amount())
        .max()
        .unwrap_or(Decimal::ZERO);

    series
        .iter()
        .map(|point| {
            let height_pct = if max.is_zero() {
                0
            } else {
                (point.revenue.amount() / max * Decimal::ONE_HUNDRED)
                    .round()
                    .to_u32()
                    .unwrap_or(0)
            };
            let label = match bucket {
                Bucket::Day => point.bucket.format("%b %-d").to_string(),
                Bucket::Month => point.bucket.format("%b %Y").to_string(),
            };
            ChartBar {
                label,
                revenue: point.revenue.to_string(),
                order_count: point.order_count,
                height_pct,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pharmacy_core::Money;

    fn point(day: u32, dollars: i64) -> RevenuePoint {
        RevenuePoint {
            bucket: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            revenue: Money::new(Decimal::from(dollars)),
            order_count: 1,
        }
    }

    #[test]
    fn test_chart_bars_scale_to_tallest() {
        let bars = chart_bars(&[point(1, 50), point(2, 200), point(3, 0)], Bucket::Day);
        let heights: Vec<_> = bars.iter().map(|b| b.height_pct).collect();
        assert_eq!(heights, [25, 100, 0]);
        assert_eq!(bars[0].label, "Mar 1");
        assert_eq!(bars[1].revenue, "$200.00");
    }

    #[test]
    fn test_chart_bars_all_zero() {
        let bars = chart_bars(&[point(1, 0), point(2, 0)], Bucket::Month);
        assert!(bars.iter().all(|b| b.height_pct == 0));
        assert_eq!(bars[0].label, "Mar 2026");
    }
}
