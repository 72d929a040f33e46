//! Order domain types and the order list query.

use chrono::{DateTime, NaiveDate, Utc};

use pharmacy_core::{
    DiscountCodeId, Email, Money, OrderDetailId, OrderId, OrderStatus, PageRequest, ProductId,
    UserId, VariantId,
};

use crate::db::SortDirection;

/// A customer order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub discount_total: Money,
    pub total: Money,
    pub discount_code_id: Option<DiscountCodeId>,
    pub shipping_name: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row in the orders table.
#[derive(Debug, Clone)]
pub struct OrderListItem {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: Money,
    /// Account name, or the shipping name when the account is gone.
    pub customer_name: String,
    pub customer_email: Option<Email>,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

/// The account that placed an order.
#[derive(Debug, Clone)]
pub struct OrderCustomer {
    pub id: UserId,
    pub name: String,
    pub email: Email,
}

/// A line item joined to its variant and product.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub id: OrderDetailId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variant_id: VariantId,
    pub variant_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderLine {
    #[must_use]
    pub fn line_total(&self) -> Money {
        Money::new(self.unit_price.amount() * rust_decimal::Decimal::from(self.quantity))
    }
}

/// Full order view.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub order: Order,
    pub customer: Option<OrderCustomer>,
    pub lines: Vec<OrderLine>,
    pub discount_code: Option<String>,
}

/// Sortable order columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderSortColumn {
    #[default]
    CreatedAt,
    Total,
    Status,
    Customer,
}

impl OrderSortColumn {
    pub const ALL: [Self; 4] = [Self::CreatedAt, Self::Total, Self::Status, Self::Customer];

    /// Parse a `sort` query value; unknown columns fall back to `created_at`.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| Some(c.as_str()) == value)
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Total => "total",
            Self::Status => "status",
            Self::Customer => "customer",
        }
    }

    /// SQL expression for `ORDER BY`. Only these fixed strings ever reach SQL.
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::CreatedAt => "o.created_at",
            Self::Total => "o.total",
            Self::Status => "o.status",
            Self::Customer => "lower(COALESCE(u.name, o.shipping_name))",
        }
    }
}

/// Parsed `/orders` query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OrderQuery {
    /// Order number, customer name/email or shipping name.
    pub search: Option<String>,
    pub statuses: Vec<OrderStatus>,
    /// Inclusive first day.
    pub from: Option<NaiveDate>,
    /// Inclusive last day.
    pub to: Option<NaiveDate>,
    pub customer_id: Option<UserId>,
    pub sort: OrderSortColumn,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl OrderQuery {
    /// Build from raw query pairs. `status` may repeat; unknown values and
    /// unparseable dates are ignored.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = Self::default();
        let mut sort = None;
        let mut direction = None;
        let mut page = None;
        let mut per_page = None;

        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "q" => query.search = Some(value.to_string()),
                "status" => {
                    if let Ok(status) = value.parse::<OrderStatus>()
                        && !query.statuses.contains(&status)
                    {
                        query.statuses.push(status);
                    }
                }
                "from" => query.from = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
                "to" => query.to = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
                "customer" => query.customer_id = value.parse().ok(),
                "sort" => sort = Some(value),
                "dir" => direction = Some(value),
                "page" => page = value.parse().ok(),
                "per_page" => per_page = value.parse().ok(),
                _ => {}
            }
        }

        query.sort = OrderSortColumn::parse(sort);
        query.direction = SortDirection::parse_or(direction, SortDirection::Desc);
        query.page = PageRequest::new(page, per_page);
        query
    }

    /// Query string reproducing the filters (without page), for links.
    #[must_use]
    pub fn filter_query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(search) = &self.search {
            parts.push(format!("q={}", urlencoding::encode(search)));
        }
        for status in &self.statuses {
            parts.push(format!("status={}", status.as_str()));
        }
        if let Some(from) = self.from {
            parts.push(format!("from={from}"));
        }
        if let Some(to) = self.to {
            parts.push(format!("to={to}"));
        }
        if let Some(customer) = self.customer_id {
            parts.push(format!("customer={customer}"));
        }
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let query = OrderQuery::from_pairs(&[]);
        assert_eq!(query.sort, OrderSortColumn::CreatedAt);
        assert_eq!(query.direction, SortDirection::Desc);
        assert_eq!(query.page.page(), 1);
        assert_eq!(query.page.per_page(), 20);
        assert!(query.statuses.is_empty());
    }

    #[test]
    fn test_multiple_statuses_and_dates() {
        let query = OrderQuery::from_pairs(&pairs(&[
            ("status", "pending"),
            ("status", "shipped"),
            ("status", "pending"),
            ("status", "lost"),
            ("from", "2026-03-01"),
            ("to", "not-a-date"),
            ("sort", "customer"),
            ("dir", "asc"),
            ("page", "0"),
            ("per_page", "500"),
        ]));
        assert_eq!(query.statuses, vec![OrderStatus::Pending, OrderStatus::Shipped]);
        assert_eq!(query.from, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(query.to, None);
        assert_eq!(query.sort, OrderSortColumn::Customer);
        assert_eq!(query.direction, SortDirection::Asc);
        assert_eq!(query.page.page(), 1);
        assert_eq!(query.page.per_page(), 100);
    }

    #[test]
    fn test_unknown_sort_column_falls_back() {
        let query = OrderQuery::from_pairs(&pairs(&[("sort", "id; DROP TABLE rx.app_user")]));
        assert_eq!(query.sort, OrderSortColumn::CreatedAt);
    }

    #[test]
    fn test_filter_query_string() {
        let query = OrderQuery::from_pairs(&pairs(&[
            ("q", "jane doe"),
            ("status", "processing"),
            ("customer", "7"),
        ]));
        assert_eq!(
            query.filter_query_string(),
            "q=jane%20doe&status=processing&customer=7"
        );
    }
}
