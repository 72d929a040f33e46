//! Order status workflow.
//!
//! These tests require a running server, database and `TEST_ADMIN_*`
//! credentials.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_integration_tests::{admin_client, location, pool, url};
use sqlx::PgPool;

async fn insert_order(db: &PgPool, status: &str) -> i32 {
    let (id,): (i32,) = sqlx::query_as(
        r"
        INSERT INTO rx.customer_order
            (status, subtotal, discount_total, total,
             shipping_name, shipping_address, shipping_city, shipping_postal_code)
        VALUES ($1::rx.order_status, 20, 0, 20, 'Test Customer', '1 Test Way', 'Testville', '00001')
        RETURNING id
        ",
    )
    .bind(status)
    .fetch_one(db)
    .await
    .expect("insert order");
    id
}

async fn order_status(db: &PgPool, id: i32) -> String {
    let (status,): (String,) =
        sqlx::query_as("SELECT status::text FROM rx.customer_order WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await
            .expect("order status");
    status
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_forward_transition_is_applied() {
    let client = admin_client().await;
    let db = pool().await;
    let id = insert_order(&db, "pending").await;

    let resp = client
        .post(url(&format!("/orders/{id}/status")))
        .form(&[("status", "processing")])
        .send()
        .await
        .expect("update status");

    assert_eq!(
        location(&resp),
        Some(format!("/orders/{id}?success=status_updated"))
    );
    assert_eq!(order_status(&db, id).await, "processing");
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_backward_transition_is_rejected() {
    let client = admin_client().await;
    let db = pool().await;
    let id = insert_order(&db, "delivered").await;

    let resp = client
        .post(url(&format!("/orders/{id}/status")))
        .form(&[("status", "pending")])
        .send()
        .await
        .expect("update status");

    assert_eq!(
        location(&resp),
        Some(format!("/orders/{id}?error=invalid_transition"))
    );
    assert_eq!(order_status(&db, id).await, "delivered");
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_orders_list_filters_by_status() {
    let client = admin_client().await;
    let db = pool().await;
    let id = insert_order(&db, "shipped").await;

    let body = client
        .get(url("/orders?status=shipped&sort=created_at&dir=desc"))
        .send()
        .await
        .expect("orders page")
        .text()
        .await
        .expect("body");
    assert!(body.contains(&format!("/orders/{id}")));

    let body = client
        .get(url("/orders?status=cancelled"))
        .send()
        .await
        .expect("orders page")
        .text()
        .await
        .expect("body");
    assert!(!body.contains(&format!("\"/orders/{id}\"")));
}
