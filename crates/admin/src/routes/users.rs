//! User management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use pharmacy_core::{Page, PageRequest, UserId, UserRole};

use crate::components::data_table::{DataTableConfig, TableState, users_table_config};
use crate::db::{SortDirection, UserRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::user::{UserDetail, UserFilter, UserListItem};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::auth::ACCOUNT_TAGS;
use super::{AdminUserView, Flash, MessageQuery, form_failure, redirect_error, redirect_success};

/// Parse the `/users` query string into a filter and page.
#[must_use]
pub fn parse_list_query(pairs: &[(String, String)]) -> (UserFilter, PageRequest) {
    let mut filter = UserFilter::default();
    let mut page = None;
    let mut per_page = None;
    for (key, value) in pairs {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "q" => filter.search = Some(value.to_string()),
            "role" => filter.role = value.parse().ok(),
            "page" => page = value.parse().ok(),
            "per_page" => per_page = value.parse().ok(),
            _ => {}
        }
    }
    (filter, PageRequest::new(page, per_page))
}

fn filter_query_string(filter: &UserFilter) -> String {
    let mut parts = Vec::new();
    if let Some(search) = &filter.search {
        parts.push(format!("q={}", urlencoding::encode(search)));
    }
    if let Some(role) = filter.role {
        parts.push(format!("role={role}"));
    }
    parts.join("&")
}

/// Users list page template.
#[derive(Template, WebTemplate)]
#[template(path = "users/index.html")]
pub struct UsersIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub table: DataTableConfig,
    pub state: TableState,
    pub users: Arc<Page<UserListItem>>,
}

/// User detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "users/show.html")]
pub struct UserShowTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub detail: UserDetail,
    /// The signed-in admin is looking at their own account.
    pub is_self: bool,
    pub roles: [UserRole; 2],
}

/// Role change form data.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
}

/// Users list page handler.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    Query(message): Query<MessageQuery>,
) -> Result<UsersIndexTemplate, AppError> {
    let (filter, page) = parse_list_query(&pairs);

    let key = CacheKey::new(CacheTag::Users, format!("{filter:?}|{page:?}"));
    let users = if let Some(CacheValue::Users(users)) = state.cache().get(&key).await {
        users
    } else {
        let users = Arc::new(UserRepository::new(state.pool()).list(&filter, page).await?);
        state
            .cache()
            .insert(key, CacheValue::Users(Arc::clone(&users)))
            .await;
        users
    };

    Ok(UsersIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/users".to_string(),
        flash: message.into(),
        table: users_table_config().with_values(&pairs),
        state: TableState::new(
            "/users",
            filter_query_string(&filter),
            "created_at",
            SortDirection::Desc,
            &*users,
        ),
        users,
    })
}

/// User detail page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<MessageQuery>,
) -> Result<UserShowTemplate, AppError> {
    let detail = UserRepository::new(state.pool())
        .detail(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    Ok(UserShowTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/users".to_string(),
        flash: query.into(),
        is_self: id == admin.id,
        roles: UserRole::ALL,
        detail,
    })
}

/// Change a user's role. Admins cannot demote themselves.
///
/// The new role applies from the user's next sign-in.
#[tracing::instrument(skip(admin, state))]
pub async fn update_role(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Form(form): Form<RoleForm>,
) -> Result<Response, AppError> {
    let path = format!("/users/{id}");
    let Ok(role) = form.role.parse::<UserRole>() else {
        return Ok(redirect_error(&path, "role"));
    };
    if id == admin.id && role != UserRole::Admin {
        return Ok(redirect_error(&path, "self_demote"));
    }

    match UserRepository::new(state.pool()).set_role(id, role).await {
        Ok(()) => {
            state.cache().revalidate_many(ACCOUNT_TAGS);
            tracing::info!(user_id = %id, %role, admin_id = %admin.id, "User role changed");
            Ok(redirect_success(&path, "role_updated"))
        }
        Err(e) => form_failure(&path, e),
    }
}

/// Delete a user. Admins cannot delete themselves.
#[tracing::instrument(skip(admin, state))]
pub async fn delete(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Response, AppError> {
    let path = format!("/users/{id}");
    if id == admin.id {
        return Ok(redirect_error(&path, "self_delete"));
    }

    match UserRepository::new(state.pool()).delete(id).await {
        Ok(()) => {
            state.cache().revalidate_many(ACCOUNT_TAGS);
            tracing::info!(user_id = %id, admin_id = %admin.id, "User deleted");
            Ok(redirect_success("/users", "deleted"))
        }
        Err(e) => form_failure(&path, e),
    }
}
