//! Manufacturer management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use pharmacy_core::ManufacturerId;

use crate::db::{ManufacturerRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::catalog::{ManufacturerInput, ManufacturerListItem};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::{AdminUserView, Flash, MessageQuery, form_failure, redirect_error, redirect_success};

const REVALIDATE: [CacheTag; 2] = [CacheTag::Manufacturers, CacheTag::Products];

/// Manufacturer form data.
#[derive(Debug, Deserialize)]
pub struct ManufacturerForm {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}

/// Manufacturers list page template.
#[derive(Template, WebTemplate)]
#[template(path = "manufacturers/index.html")]
pub struct ManufacturersIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub manufacturers: Arc<Vec<ManufacturerListItem>>,
}

/// Manufacturer edit page template.
#[derive(Template, WebTemplate)]
#[template(path = "manufacturers/edit.html")]
pub struct ManufacturerEditTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub item: ManufacturerListItem,
}

/// Load manufacturers with product counts through the query cache.
///
/// # Errors
///
/// Returns `RepositoryError` if the query fails.
pub async fn load_all(state: &AppState) -> Result<Arc<Vec<ManufacturerListItem>>, RepositoryError> {
    let key = CacheKey::new(CacheTag::Manufacturers, "all");
    if let Some(CacheValue::Manufacturers(list)) = state.cache().get(&key).await {
        return Ok(list);
    }
    let list = Arc::new(ManufacturerRepository::new(state.pool()).list().await?);
    state
        .cache()
        .insert(key, CacheValue::Manufacturers(Arc::clone(&list)))
        .await;
    Ok(list)
}

/// Manufacturers list page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<ManufacturersIndexTemplate, AppError> {
    Ok(ManufacturersIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/manufacturers".to_string(),
        flash: query.into(),
        manufacturers: load_all(&state).await?,
    })
}

/// Create manufacturer handler.
#[tracing::instrument(skip(admin, state, form), fields(name = %form.name))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Form(form): Form<ManufacturerForm>,
) -> Result<Response, AppError> {
    let input = match ManufacturerInput::parse(&form.name, form.website.as_deref()) {
        Ok(input) => input,
        Err(e) => return Ok(redirect_error("/manufacturers", e.field)),
    };

    match ManufacturerRepository::new(state.pool()).create(&input).await {
        Ok(manufacturer) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(manufacturer_id = %manufacturer.id, admin_id = %admin.id, "Manufacturer created");
            Ok(redirect_success("/manufacturers", "created"))
        }
        Err(e) => form_failure("/manufacturers", e),
    }
}

/// Manufacturer edit page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ManufacturerId>,
    Query(query): Query<MessageQuery>,
) -> Result<ManufacturerEditTemplate, AppError> {
    let item = load_all(&state)
        .await?
        .iter()
        .find(|m| m.manufacturer.id == id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("manufacturer {id}")))?;

    Ok(ManufacturerEditTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/manufacturers".to_string(),
        flash: query.into(),
        item,
    })
}

/// Update manufacturer handler.
#[tracing::instrument(skip(admin, state, form))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ManufacturerId>,
    Form(form): Form<ManufacturerForm>,
) -> Result<Response, AppError> {
    let path = format!("/manufacturers/{id}");
    let input = match ManufacturerInput::parse(&form.name, form.website.as_deref()) {
        Ok(input) => input,
        Err(e) => return Ok(redirect_error(&path, e.field)),
    };

    match ManufacturerRepository::new(state.pool()).update(id, &input).await {
        Ok(_) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(manufacturer_id = %id, admin_id = %admin.id, "Manufacturer updated");
            Ok(redirect_success(&path, "updated"))
        }
        Err(e) => form_failure(&path, e),
    }
}

/// Delete manufacturer handler. Refused while products reference it.
#[tracing::instrument(skip(admin, state))]
pub async fn delete(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ManufacturerId>,
) -> Result<Response, AppError> {
    match ManufacturerRepository::new(state.pool()).delete(id).await {
        Ok(()) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(manufacturer_id = %id, admin_id = %admin.id, "Manufacturer deleted");
            Ok(redirect_success("/manufacturers", "deleted"))
        }
        Err(e) => form_failure(&format!("/manufacturers/{id}"), e),
    }
}
