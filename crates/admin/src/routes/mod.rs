//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health, /health/ready                 - Liveness / readiness
//!
//! # Dashboard
//! GET  /                                      - Overview (?range=7d|30d|90d|12m)
//!
//! # Auth
//! GET  /auth/login          POST /auth/login
//! GET  /auth/register       POST /auth/register
//! GET  /auth/new-verification?token=
//! GET  /auth/reset          POST /auth/reset
//! GET  /auth/new-password   POST /auth/new-password
//! GET  /auth/oauth/{provider}
//! GET  /auth/oauth/{provider}/callback
//! POST /auth/logout
//!
//! # Account
//! GET  /settings            POST /settings
//!
//! # Catalog
//! GET  /products            GET /products/new      POST /products
//! GET  /products/{id}       POST /products/{id}
//! POST /products/{id}/archive                      POST /products/{id}/delete
//! GET  /categories          POST /categories
//! GET  /categories/{id}     POST /categories/{id}  POST /categories/{id}/delete
//! GET  /manufacturers       POST /manufacturers
//! GET  /manufacturers/{id}  POST /manufacturers/{id}
//! POST /manufacturers/{id}/delete
//!
//! # Orders, users, discounts
//! GET  /orders              GET /orders/{id}       POST /orders/{id}/status
//! GET  /users               GET /users/{id}
//! POST /users/{id}/role     POST /users/{id}/delete
//! GET  /discounts           GET /discounts/new     POST /discounts
//! GET  /discounts/{id}      POST /discounts/{id}
//! POST /discounts/{id}/toggle                      POST /discounts/{id}/delete
//!
//! # JSON API
//! GET  /api/products/search GET /api/users/search  POST /api/uploads/sign
//! ```

pub mod api;
pub mod auth;
pub mod categories;
pub mod dashboard;
pub mod discounts;
pub mod health;
pub mod manufacturers;
pub mod orders;
pub mod products;
pub mod settings;
pub mod users;

use axum::{
    Router,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::db::RepositoryError;
use crate::error::AppError;
use crate::middleware::auth_rate_limiter;
use crate::models::CurrentAdmin;
use crate::state::AppState;

// =============================================================================
// Shared View Types
// =============================================================================

/// Signed-in account shown in the sidebar.
#[derive(Debug, Clone)]
pub struct AdminUserView {
    pub name: String,
    pub email: String,
}

impl From<&CurrentAdmin> for AdminUserView {
    fn from(admin: &CurrentAdmin) -> Self {
        Self {
            name: admin.name.clone(),
            email: admin.email.to_string(),
        }
    }
}

/// Query parameters for error/success display.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Toast messages rendered by the layouts.
#[derive(Debug, Clone, Default)]
pub struct Flash {
    pub error: Option<String>,
    pub success: Option<String>,
}

impl Flash {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            success: None,
        }
    }
}

impl From<MessageQuery> for Flash {
    fn from(query: MessageQuery) -> Self {
        Self {
            error: query.error.as_deref().map(flash_message),
            success: query.success.as_deref().map(flash_message),
        }
    }
}

/// Human-readable text for a redirect `?error=` / `?success=` code.
///
/// Validation failures redirect with the field name as the code.
#[must_use]
pub fn flash_message(code: &str) -> String {
    let message = match code {
        // Auth
        "invalid_credentials" => "Invalid email or password.",
        "invalid_email" => "Please enter a valid email address.",
        "invalid_name" => "Please enter your name.",
        "email_in_use" => "An account with this email already exists.",
        "email_not_found" => "No account exists for that email.",
        "weak_password" => "Password must be at least 6 characters.",
        "token_not_found" => "This link is invalid or has already been used.",
        "token_expired" => "This link has expired. Please request a new one.",
        "invalid_code" => "That login code is not valid.",
        "code_expired" => "That login code has expired. Sign in again for a new one.",
        "oauth_managed" => "This account signs in with an OAuth provider; email, password and two-factor settings are managed there.",
        "incorrect_password" => "Your current password is incorrect.",
        "missing_token" => "The link is missing its token.",
        "oauth_state" => "The sign-in attempt expired. Please try again.",
        "oauth_denied" => "Sign-in was cancelled.",
        "oauth_failed" => "Could not sign in with that provider.",
        "oauth_unavailable" => "That sign-in provider is not available.",
        "session" => "Could not start your session. Please try again.",
        "login_expired" => "Your sign-in attempt expired. Please sign in again.",
        "server_error" => "Something went wrong. Please try again.",
        "confirmation_sent" => "Confirmation email sent! Check your inbox.",
        "verification_sent" => "Your email is not confirmed yet. We sent you a new confirmation link.",
        "email_verified" => "Email verified! You can now sign in.",
        "reset_sent" => "Reset email sent! Check your inbox.",
        "password_updated" => "Password updated. You can now sign in.",
        "logged_out" => "You have been signed out.",
        // Settings
        "settings_updated" => "Settings updated.",
        "email_change_sent" => "Settings updated. Confirm your new email address via the link we sent.",
        // Records
        "created" => "Created successfully.",
        "updated" => "Saved.",
        "deleted" => "Deleted.",
        "archived" => "Product archived.",
        "unarchived" => "Product restored.",
        "toggled" => "Discount status updated.",
        "status_updated" => "Order status updated.",
        "role_updated" => "Role updated.",
        "not_found" => "That record no longer exists.",
        "conflict" => "That conflicts with an existing record.",
        "in_use" => "This record is still in use and cannot be deleted.",
        "invalid_transition" => "That status change is not allowed.",
        "stale_status" => "The order changed while you were editing it. Please review and try again.",
        "self_demote" => "You cannot remove your own admin role.",
        "self_delete" => "You cannot delete your own account.",
        field if is_field_code(field) => {
            return format!("Please check the {} field.", field.replace('_', " "));
        }
        _ => "Something went wrong. Please try again.",
    };
    message.to_string()
}

fn is_field_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 32
        && code.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

// =============================================================================
// Redirect Helpers
// =============================================================================

/// Redirect to `path` with `?<key>=<code>` appended.
#[must_use]
pub fn redirect_with(path: &str, key: &str, code: &str) -> Response {
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!(
        "{path}{separator}{key}={}",
        urlencoding::encode(code)
    ))
    .into_response()
}

/// Redirect to `path` with an error code.
#[must_use]
pub fn redirect_error(path: &str, code: &str) -> Response {
    redirect_with(path, "error", code)
}

/// Redirect to `path` with a success code.
#[must_use]
pub fn redirect_success(path: &str, code: &str) -> Response {
    redirect_with(path, "success", code)
}

/// Redirect code for a repository error the user can act on.
///
/// Returns `None` for server-side failures.
#[must_use]
pub const fn repository_error_code(error: &RepositoryError) -> Option<&'static str> {
    match error {
        RepositoryError::NotFound => Some("not_found"),
        RepositoryError::Conflict(_) => Some("conflict"),
        RepositoryError::InUse(_) => Some("in_use"),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => None,
    }
}

/// Turn a failed form mutation into a redirect back to `path`, or an
/// `AppError` when the failure is on our side.
///
/// # Errors
///
/// Returns `AppError::Database` for server-side repository failures.
pub fn form_failure(path: &str, error: RepositoryError) -> Result<Response, AppError> {
    match repository_error_code(&error) {
        Some(code) => {
            tracing::info!(error = %error, "Form submission rejected");
            Ok(redirect_error(path, code))
        }
        None => Err(error.into()),
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the application router (without the outer middleware stack).
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        // Dashboard
        .route("/", get(dashboard::index))
        // Auth
        .merge(auth_routes())
        .merge(auth_form_routes())
        // Settings
        .route("/settings", get(settings::show).post(settings::update))
        // Products
        .route("/products", get(products::index).post(products::create))
        .route("/products/new", get(products::new_product))
        .route("/products/{id}", get(products::show).post(products::update))
        .route("/products/{id}/archive", post(products::archive))
        .route("/products/{id}/delete", post(products::delete))
        // Categories
        .route("/categories", get(categories::index).post(categories::create))
        .route("/categories/{id}", get(categories::show).post(categories::update))
        .route("/categories/{id}/delete", post(categories::delete))
        // Manufacturers
        .route(
            "/manufacturers",
            get(manufacturers::index).post(manufacturers::create),
        )
        .route(
            "/manufacturers/{id}",
            get(manufacturers::show).post(manufacturers::update),
        )
        .route("/manufacturers/{id}/delete", post(manufacturers::delete))
        // Orders
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", post(orders::update_status))
        // Users
        .route("/users", get(users::index))
        .route("/users/{id}", get(users::show))
        .route("/users/{id}/role", post(users::update_role))
        .route("/users/{id}/delete", post(users::delete))
        // Discounts
        .route("/discounts", get(discounts::index).post(discounts::create))
        .route("/discounts/new", get(discounts::new_discount))
        .route("/discounts/{id}", get(discounts::show).post(discounts::update))
        .route("/discounts/{id}/toggle", post(discounts::toggle))
        .route("/discounts/{id}/delete", post(discounts::delete))
        // JSON API
        .nest("/api", api::routes())
}

/// Auth pages and OAuth redirects.
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(auth::login_page))
        .route("/auth/register", get(auth::register_page))
        .route("/auth/new-verification", get(auth::new_verification))
        .route("/auth/reset", get(auth::reset_page))
        .route("/auth/new-password", get(auth::new_password_page))
        .route("/auth/oauth/{provider}", get(auth::oauth_start))
        .route("/auth/oauth/{provider}/callback", get(auth::oauth_callback))
        .route("/auth/logout", post(auth::logout))
}

/// Credential-submitting auth forms, rate limited per client IP.
fn auth_form_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/reset", post(auth::reset))
        .route("/auth/new-password", post(auth::new_password))
        .layer(auth_rate_limiter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_flash_message_known_and_field_codes() {
        assert_eq!(
            flash_message("invalid_credentials"),
            "Invalid email or password."
        );
        assert_eq!(
            flash_message("variant_sku"),
            "Please check the variant sku field."
        );
        assert_eq!(
            flash_message("<script>alert(1)</script>"),
            "Something went wrong. Please try again."
        );
    }

    #[test]
    fn test_redirect_with_appends_to_existing_query() {
        let response = redirect_error("/auth/new-password?token=abc", "token_expired");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "/auth/new-password?token=abc&error=token_expired"
        );

        let response = redirect_success("/orders/4", "status_updated");
        assert_eq!(
            response.headers()["location"],
            "/orders/4?success=status_updated"
        );
    }

    #[test]
    fn test_form_failure_splits_client_and_server_errors() {
        let response = form_failure("/categories/3", RepositoryError::InUse("category".into()))
            .ok()
            .map(|r| r.headers()["location"].clone());
        assert_eq!(
            response.as_ref().and_then(|l| l.to_str().ok()),
            Some("/categories/3?error=in_use")
        );

        assert!(
            form_failure(
                "/categories",
                RepositoryError::DataCorruption("bad".into())
            )
            .is_err()
        );
    }

    #[test]
    fn test_flash_from_query() {
        let flash = Flash::from(MessageQuery {
            error: None,
            success: Some("deleted".to_string()),
        });
        assert_eq!(flash.success.as_deref(), Some("Deleted."));
        assert!(flash.error.is_none());
    }
}
