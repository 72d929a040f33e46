//! JSON endpoints used by the admin pages' scripts.
//!
//! Mounted under `/api`; every handler requires an admin session.

pub mod search;
pub mod uploads;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Build the API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products/search", get(search::products))
        .route("/users/search", get(search::users))
        .route("/uploads/sign", post(uploads::sign))
}
