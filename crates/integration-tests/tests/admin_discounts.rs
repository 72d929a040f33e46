//! Discount code management.
//!
//! These tests require a running server, database and `TEST_ADMIN_*`
//! credentials.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_integration_tests::{admin_client, location, pool, unique, url};
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_discount_create_toggle_delete() {
    let client = admin_client().await;
    let db = pool().await;
    let code = unique("it").replace('-', "").to_uppercase();

    let resp = client
        .post(url("/discounts"))
        .form(&[
            ("code", code.to_lowercase().as_str()),
            ("kind", "percentage"),
            ("value", "15"),
            ("is_active", "on"),
        ])
        .send()
        .await
        .expect("create discount");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    // Codes are stored upper-cased.
    let (id, active): (i32, bool) =
        sqlx::query_as("SELECT id, is_active FROM rx.discount_code WHERE code = $1")
            .bind(&code)
            .fetch_one(&db)
            .await
            .expect("discount row");
    assert!(active);

    let resp = client
        .post(url(&format!("/discounts/{id}/toggle")))
        .send()
        .await
        .expect("toggle");
    assert_eq!(location(&resp).as_deref(), Some("/discounts?success=toggled"));

    let (active,): (bool,) = sqlx::query_as("SELECT is_active FROM rx.discount_code WHERE id = $1")
        .bind(id)
        .fetch_one(&db)
        .await
        .expect("discount row");
    assert!(!active);

    let resp = client
        .post(url(&format!("/discounts/{id}/delete")))
        .send()
        .await
        .expect("delete");
    assert_eq!(location(&resp).as_deref(), Some("/discounts?success=deleted"));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_percentage_over_100_is_rejected() {
    let client = admin_client().await;
    let code = unique("over").replace('-', "").to_uppercase();

    let resp = client
        .post(url("/discounts"))
        .form(&[
            ("code", code.as_str()),
            ("kind", "percentage"),
            ("value", "150"),
        ])
        .send()
        .await
        .expect("create discount");

    assert_eq!(resp.status(), StatusCode::OK, "form re-renders with the error");
}
