//! Shared helpers for the back-office integration tests.
//!
//! The tests drive a running server over HTTP and are `#[ignore]`d by
//! default.
//!
//! ```bash
//! rx-cli migrate
//! rx-cli admin create -e admin@example.com -n Admin -p 'test-password'
//! cargo run -p pharmacy-admin &
//!
//! ADMIN_BASE_URL=http://localhost:3000 \
//! TEST_ADMIN_EMAIL=admin@example.com TEST_ADMIN_PASSWORD=test-password \
//!     cargo test -p pharmacy-integration-tests -- --ignored
//! ```

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, redirect::Policy};
use secrecy::SecretString;
use sqlx::PgPool;

/// Base URL of the server under test (`ADMIN_BASE_URL`).
#[must_use]
pub fn base_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("ADMIN_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Build a URL on the server under test.
#[must_use]
pub fn url(path: &str) -> String {
    format!("{}{path}", base_url())
}

/// A cookie-keeping client that does not follow redirects, so tests can
/// assert on `Location`.
///
/// Each client presents its own `X-Forwarded-For` address so the auth rate
/// limiter buckets tests separately.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn client() -> Client {
    let [a, b, c, ..] = uuid::Uuid::new_v4().into_bytes();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_str(&format!("10.{a}.{b}.{c}")).expect("valid header value"),
    );

    Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// The `Location` header of a redirect response.
#[must_use]
pub fn location(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Sign in with `TEST_ADMIN_EMAIL` / `TEST_ADMIN_PASSWORD` and return the
/// client holding the session cookie.
///
/// The account must be an admin without two-factor enabled.
///
/// # Panics
///
/// Panics if the variables are unset or sign-in does not redirect to the
/// dashboard.
pub async fn admin_client() -> Client {
    dotenvy::dotenv().ok();
    let email = std::env::var("TEST_ADMIN_EMAIL").expect("TEST_ADMIN_EMAIL must be set");
    let password = std::env::var("TEST_ADMIN_PASSWORD").expect("TEST_ADMIN_PASSWORD must be set");

    let client = client();
    let resp = client
        .post(url("/auth/login"))
        .form(&[("email", email.as_str()), ("password", password.as_str())])
        .send()
        .await
        .expect("Failed to submit login");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login should redirect");
    assert_eq!(location(&resp).as_deref(), Some("/"), "login should land on dashboard");
    client
}

/// Connect to `DATABASE_URL` for fixture setup and assertions.
///
/// # Panics
///
/// Panics if the variable is unset or the database is unreachable.
pub async fn pool() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .expect("DATABASE_URL must be set");
    pharmacy_admin::db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database")
}

/// A unique suffix for fixture names and emails.
#[must_use]
pub fn unique(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", id.get(..8).unwrap_or(&id))
}
