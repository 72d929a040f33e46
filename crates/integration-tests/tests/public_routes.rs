//! Unauthenticated surface: health checks, auth pages and access control.
//!
//! These tests require the admin server to be running.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_integration_tests::{client, location, url};
use reqwest::StatusCode;

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_health_endpoints() {
    let client = client();

    let resp = client.get(url("/health")).send().await.expect("health");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "ok");

    let resp = client.get(url("/health/ready")).send().await.expect("ready");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_login_page_renders() {
    let resp = client()
        .get(url("/auth/login"))
        .send()
        .await
        .expect("login page");

    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("body");
    assert!(body.contains(r#"name="email""#));
    assert!(body.contains(r#"name="password""#));
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_flash_codes_render_messages() {
    let resp = client()
        .get(url("/auth/login?error=invalid_credentials"))
        .send()
        .await
        .expect("login page");

    let body = resp.text().await.expect("body");
    assert!(body.contains("Invalid email or password."));
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_admin_pages_redirect_to_login() {
    let client = client();
    for path in ["/", "/orders", "/products", "/users", "/discounts", "/settings"] {
        let resp = client.get(url(path)).send().await.expect("request");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&resp).as_deref(), Some("/auth/login"), "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_api_requires_session() {
    let client = client();

    let resp = client
        .get(url("/api/products/search?q=ibu"))
        .send()
        .await
        .expect("search");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(url("/api/uploads/sign"))
        .json(&serde_json::json!({"filename": "a.png", "content_type": "image/png"}))
        .send()
        .await
        .expect("sign");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_wrong_password_is_rejected() {
    let resp = client()
        .post(url("/auth/login"))
        .form(&[("email", "nobody@example.com"), ("password", "not-the-password")])
        .send()
        .await
        .expect("login");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let to = location(&resp).unwrap_or_default();
    assert!(to.starts_with("/auth/login?error="), "{to}");
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_security_headers_present() {
    let resp = client()
        .get(url("/auth/login"))
        .send()
        .await
        .expect("login page");

    let headers = resp.headers();
    assert_eq!(headers.get("x-frame-options").map(|v| v.as_bytes()), Some(&b"DENY"[..]));
    assert_eq!(
        headers.get("x-content-type-options").map(|v| v.as_bytes()),
        Some(&b"nosniff"[..])
    );
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("x-request-id"));
}
