//! Typeahead search over products and users.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::db::{ProductRepository, UserRepository};
use crate::error::AppError;
use crate::middleware::RequireAdminAuth;
use crate::models::catalog::ProductSearchHit;
use crate::models::user::UserSearchHit;
use crate::state::AppState;

/// Maximum hits returned per request.
pub const SEARCH_LIMIT: i64 = 10;

/// Search query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

impl SearchQuery {
    /// Trimmed search term, or `None` when there is nothing to search for.
    fn term(&self) -> Option<&str> {
        Some(self.q.trim()).filter(|t| !t.is_empty())
    }
}

/// `GET /api/products/search?q=`
#[tracing::instrument(skip(_admin, state))]
pub async fn products(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductSearchHit>>, AppError> {
    let Some(term) = query.term() else {
        return Ok(Json(Vec::new()));
    };
    let hits = ProductRepository::new(state.pool())
        .search(term, SEARCH_LIMIT)
        .await?;
    Ok(Json(hits))
}

/// `GET /api/users/search?q=`
#[tracing::instrument(skip(_admin, state))]
pub async fn users(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSearchHit>>, AppError> {
    let Some(term) = query.term() else {
        return Ok(Json(Vec::new()));
    };
    let hits = UserRepository::new(state.pool())
        .search(term, SEARCH_LIMIT)
        .await?;
    Ok(Json(hits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_term_is_skipped() {
        let query = SearchQuery { q: "   ".to_string() };
        assert_eq!(query.term(), None);

        let query = SearchQuery { q: " ibuprofen ".to_string() };
        assert_eq!(query.term(), Some("ibuprofen"));
    }
}
