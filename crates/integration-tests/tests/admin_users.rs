//! User management guards.
//!
//! These tests require a running server, database and `TEST_ADMIN_*`
//! credentials.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_integration_tests::{admin_client, client, location, pool, unique, url};

async fn own_id() -> i32 {
    let email = std::env::var("TEST_ADMIN_EMAIL").expect("TEST_ADMIN_EMAIL must be set");
    let (id,): (i32,) = sqlx::query_as("SELECT id FROM rx.app_user WHERE email = $1")
        .bind(email.to_lowercase())
        .fetch_one(&pool().await)
        .await
        .expect("admin row");
    id
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_admin_cannot_demote_self() {
    let client = admin_client().await;
    let id = own_id().await;

    let resp = client
        .post(url(&format!("/users/{id}/role")))
        .form(&[("role", "user")])
        .send()
        .await
        .expect("update role");

    assert_eq!(location(&resp), Some(format!("/users/{id}?error=self_demote")));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_admin_cannot_delete_self() {
    let client = admin_client().await;
    let id = own_id().await;

    let resp = client
        .post(url(&format!("/users/{id}/delete")))
        .send()
        .await
        .expect("delete user");

    assert_eq!(location(&resp), Some(format!("/users/{id}?error=self_delete")));
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_user_search_api_returns_json() {
    let client = admin_client().await;
    let resp = client
        .get(url("/api/users/search?q=example"))
        .send()
        .await
        .expect("search");
    assert!(resp.status().is_success());
    let hits: Vec<serde_json::Value> = resp.json().await.expect("json");
    assert!(hits.len() <= 10);
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_new_registration_shows_in_cached_user_list() {
    let admin = admin_client().await;
    let name = unique("signup");
    let email = format!("{name}@pharmacy.test");
    let list = url(&format!("/users?q={email}"));

    // Warm the cached page for this search before the account exists.
    let before = admin.get(&list).send().await.expect("users page");
    assert!(!before.text().await.expect("body").contains(&format!(">{name}<")));

    let resp = client()
        .post(url("/auth/register"))
        .form(&[("name", name.as_str()), ("email", email.as_str()), ("password", "secret-pass")])
        .send()
        .await
        .expect("register");
    assert_eq!(
        location(&resp).as_deref(),
        Some("/auth/login?success=confirmation_sent")
    );

    let after = admin.get(&list).send().await.expect("users page");
    assert!(after.text().await.expect("body").contains(&format!(">{name}<")));
}
