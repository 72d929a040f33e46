//! Dashboard reporting queries against real rows.
//!
//! Fixtures live in a month far in the past so seeded or live orders never
//! fall inside the windows under test.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use chrono::{Days, NaiveDate};
use pharmacy_admin::db::DashboardRepository;
use pharmacy_core::{Bucket, OrderStatus};
use pharmacy_integration_tests::{pool, unique};
use rust_decimal::Decimal;
use sqlx::PgPool;

struct Fixture {
    root_id: i32,
    child_id: i32,
    manufacturer_id: i32,
    product_id: i32,
    variant_id: i32,
    order_ids: Vec<i32>,
}

impl Fixture {
    async fn new(db: &PgPool) -> Self {
        let name = unique("dash");
        let (root_id,): (i32,) = sqlx::query_as(
            "INSERT INTO rx.category (name, slug) VALUES ($1, $1) RETURNING id",
        )
        .bind(format!("{name}-root"))
        .fetch_one(db)
        .await
        .expect("root category");
        let (child_id,): (i32,) = sqlx::query_as(
            "INSERT INTO rx.category (name, slug, parent_id) VALUES ($1, $1, $2) RETURNING id",
        )
        .bind(format!("{name}-child"))
        .bind(root_id)
        .fetch_one(db)
        .await
        .expect("child category");
        let (manufacturer_id,): (i32,) =
            sqlx::query_as("INSERT INTO rx.manufacturer (name) VALUES ($1) RETURNING id")
                .bind(&name)
                .fetch_one(db)
                .await
                .expect("manufacturer");
        let (product_id,): (i32,) = sqlx::query_as(
            "INSERT INTO rx.product (name, slug, category_id, manufacturer_id) \
             VALUES ($1, $1, $2, $3) RETURNING id",
        )
        .bind(&name)
        .bind(child_id)
        .bind(manufacturer_id)
        .fetch_one(db)
        .await
        .expect("product");
        let (variant_id,): (i32,) = sqlx::query_as(
            "INSERT INTO rx.product_variant (product_id, name, sku, price, stock) \
             VALUES ($1, 'Box', $2, 10, 100) RETURNING id",
        )
        .bind(product_id)
        .bind(&name)
        .fetch_one(db)
        .await
        .expect("variant");

        Self {
            root_id,
            child_id,
            manufacturer_id,
            product_id,
            variant_id,
            order_ids: Vec::new(),
        }
    }

    /// One order of `quantity` boxes at 10.00 each, placed at 10:00 UTC.
    async fn order(&mut self, db: &PgPool, day: NaiveDate, status: &str, quantity: i32) {
        let placed = day.and_hms_opt(10, 0, 0).expect("valid time").and_utc();
        let total = Decimal::from(quantity * 10);
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO rx.customer_order \
                 (status, subtotal, total, shipping_name, shipping_address, shipping_city, \
                  shipping_postal_code, created_at, updated_at) \
             VALUES ($1::rx.order_status, $2, $2, 'Test Customer', '1 Test Way', 'Testville', \
                     '00001', $3, $3) \
             RETURNING id",
        )
        .bind(status)
        .bind(total)
        .bind(placed)
        .fetch_one(db)
        .await
        .expect("order");
        sqlx::query(
            "INSERT INTO rx.order_detail (order_id, product_variant_id, quantity, unit_price) \
             VALUES ($1, $2, $3, 10)",
        )
        .bind(id)
        .bind(self.variant_id)
        .bind(quantity)
        .execute(db)
        .await
        .expect("order line");
        self.order_ids.push(id);
    }

    async fn remove(self, db: &PgPool) {
        sqlx::query("DELETE FROM rx.customer_order WHERE id = ANY($1)")
            .bind(&self.order_ids)
            .execute(db)
            .await
            .expect("delete orders");
        sqlx::query("DELETE FROM rx.product WHERE id = $1")
            .bind(self.product_id)
            .execute(db)
            .await
            .expect("delete product");
        sqlx::query("DELETE FROM rx.category WHERE id = ANY($1)")
            .bind(vec![self.child_id, self.root_id])
            .execute(db)
            .await
            .expect("delete categories");
        sqlx::query("DELETE FROM rx.manufacturer WHERE id = $1")
            .bind(self.manufacturer_id)
            .execute(db)
            .await
            .expect("delete manufacturer");
    }
}

/// First day of a month between 1950 and 1999, picked per run.
fn quiet_month() -> NaiveDate {
    let [a, b, ..] = uuid::Uuid::new_v4().into_bytes();
    let year = 1950 + i32::from(a % 50);
    let month = 1 + u32::from(b % 12);
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid date")
}

fn day(start: NaiveDate, offset: u64) -> NaiveDate {
    start.checked_add_days(Days::new(offset)).expect("valid date")
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_dashboard_aggregates() {
    let db = pool().await;
    let mut fixture = Fixture::new(&db).await;

    let start = quiet_month();
    let end = day(start, 20);
    let previous_start = start.checked_sub_days(Days::new(20)).expect("valid date");

    fixture.order(&db, day(start, 2), "delivered", 2).await;
    fixture.order(&db, day(start, 5), "pending", 1).await;
    fixture.order(&db, day(start, 5), "cancelled", 5).await;
    fixture.order(&db, day(previous_start, 10), "shipped", 3).await;

    let dashboard = DashboardRepository::new(&db);

    // Sales on the child category land on its top-level parent.
    let sales = dashboard.category_sales(start, end).await.expect("category sales");
    let root = sales
        .iter()
        .find(|s| s.category_id.as_i32() == fixture.root_id)
        .expect("root category row");
    assert_eq!(root.revenue.amount(), Decimal::from(30));
    assert_eq!(root.units, 3);
    assert!(sales.iter().all(|s| s.category_id.as_i32() != fixture.child_id));

    let current = dashboard.period_totals(start, end).await.expect("current totals");
    assert_eq!(current.revenue.amount(), Decimal::from(30));
    assert_eq!(current.order_count, 2);

    let previous = dashboard
        .period_totals(previous_start, start)
        .await
        .expect("previous totals");
    assert_eq!(previous.revenue.amount(), Decimal::from(30));
    assert_eq!(previous.order_count, 1);

    let daily = dashboard
        .revenue_series(Bucket::Day, start, end)
        .await
        .expect("daily series");
    let daily: Vec<(NaiveDate, Decimal, i64)> = daily
        .into_iter()
        .map(|row| (row.bucket, row.revenue, row.order_count))
        .collect();
    assert_eq!(
        daily,
        vec![
            (day(start, 2), Decimal::from(20), 1),
            (day(start, 5), Decimal::from(10), 1),
        ]
    );

    let monthly = dashboard
        .revenue_series(Bucket::Month, start, end)
        .await
        .expect("monthly series");
    assert_eq!(monthly.len(), 1);
    assert!(monthly.iter().all(|row| row.bucket == start && row.order_count == 2));

    let statuses = dashboard.status_counts(start, end).await.expect("status counts");
    assert!(
        statuses
            .iter()
            .any(|s| s.status == OrderStatus::Cancelled && s.count == 1)
    );

    fixture.remove(&db).await;
}
