//! Catalog management through the admin UI.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied
//! - The admin server running (cargo run -p pharmacy-admin)
//! - `TEST_ADMIN_EMAIL` / `TEST_ADMIN_PASSWORD` for an admin account
//!
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_integration_tests::{admin_client, location, pool, unique, url};
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_category_create_and_duplicate_slug() {
    let client = admin_client().await;
    let name = unique("Test Category");

    let resp = client
        .post(url("/categories"))
        .form(&[("name", name.as_str())])
        .send()
        .await
        .expect("create category");
    assert_eq!(location(&resp).as_deref(), Some("/categories?success=created"));

    let resp = client
        .post(url("/categories"))
        .form(&[("name", name.as_str())])
        .send()
        .await
        .expect("duplicate category");
    assert_eq!(location(&resp).as_deref(), Some("/categories?error=conflict"));

    let body = client
        .get(url("/categories"))
        .send()
        .await
        .expect("categories page")
        .text()
        .await
        .expect("body");
    assert!(body.contains(&name));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_category_requires_name() {
    let client = admin_client().await;
    let resp = client
        .post(url("/categories"))
        .form(&[("name", "   ")])
        .send()
        .await
        .expect("create category");
    assert_eq!(location(&resp).as_deref(), Some("/categories?error=name"));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_product_lifecycle() {
    let client = admin_client().await;
    let db = pool().await;

    let category = unique("Product Test Category");
    let manufacturer = unique("Product Test Maker");
    for (path, name) in [("/categories", &category), ("/manufacturers", &manufacturer)] {
        let resp = client
            .post(url(path))
            .form(&[("name", name.as_str())])
            .send()
            .await
            .expect("create parent");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    let (category_id,): (i32,) = sqlx::query_as("SELECT id FROM rx.category WHERE name = $1")
        .bind(&category)
        .fetch_one(&db)
        .await
        .expect("category id");
    let (manufacturer_id,): (i32,) =
        sqlx::query_as("SELECT id FROM rx.manufacturer WHERE name = $1")
            .bind(&manufacturer)
            .fetch_one(&db)
            .await
            .expect("manufacturer id");

    let product = unique("Test Tablets");
    let sku = unique("SKU").to_uppercase();
    let category_id = category_id.to_string();
    let manufacturer_id = manufacturer_id.to_string();
    let resp = client
        .post(url("/products"))
        .form(&[
            ("name", product.as_str()),
            ("description", "Integration test product"),
            ("category_id", category_id.as_str()),
            ("manufacturer_id", manufacturer_id.as_str()),
            ("variant_name", "10 tablets"),
            ("variant_sku", sku.as_str()),
            ("variant_price", "4.50"),
            ("variant_stock", "12"),
        ])
        .send()
        .await
        .expect("create product");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let redirect = location(&resp).expect("redirect to product");
    assert!(redirect.ends_with("?success=created"), "{redirect}");
    let product_path = redirect.split('?').next().unwrap_or_default().to_owned();
    assert!(product_path.starts_with("/products/"), "{product_path}");

    let body = client
        .get(url("/products"))
        .send()
        .await
        .expect("products page")
        .text()
        .await
        .expect("body");
    assert!(body.contains(&product));

    // The same SKU on another product is rejected.
    let other = unique("Other Tablets");
    let resp = client
        .post(url("/products"))
        .form(&[
            ("name", other.as_str()),
            ("category_id", category_id.as_str()),
            ("manufacturer_id", manufacturer_id.as_str()),
            ("variant_name", "10 tablets"),
            ("variant_sku", sku.as_str()),
            ("variant_price", "4.50"),
            ("variant_stock", "1"),
        ])
        .send()
        .await
        .expect("duplicate sku");
    assert_eq!(resp.status(), StatusCode::OK, "form re-renders with the error");

    // Manufacturer with products cannot be deleted.
    let resp = client
        .post(url(&format!("/manufacturers/{manufacturer_id}/delete")))
        .send()
        .await
        .expect("delete manufacturer");
    assert_eq!(
        location(&resp),
        Some(format!("/manufacturers/{manufacturer_id}?error=in_use"))
    );

    let resp = client
        .post(url(&format!("{product_path}/delete")))
        .send()
        .await
        .expect("delete product");
    assert_eq!(location(&resp).as_deref(), Some("/products?success=deleted"));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_product_search_api() {
    let client = admin_client().await;

    let resp = client
        .get(url("/api/products/search?q=%20%20"))
        .send()
        .await
        .expect("blank search");
    assert_eq!(resp.status(), StatusCode::OK);
    let hits: Vec<serde_json::Value> = resp.json().await.expect("json");
    assert!(hits.is_empty());

    let resp = client
        .get(url("/api/products/search?q=a"))
        .send()
        .await
        .expect("search");
    let hits: Vec<serde_json::Value> = resp.json().await.expect("json");
    assert!(hits.len() <= 10);
}
