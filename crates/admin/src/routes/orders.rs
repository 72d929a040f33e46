//! Order management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use pharmacy_core::{OrderId, OrderStatus, Page};

use crate::components::data_table::{DataTableConfig, TableState, orders_table_config};
use crate::db::{OrderRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::order::{OrderDetail, OrderListItem, OrderQuery};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::{AdminUserView, Flash, MessageQuery, redirect_error, redirect_success};

/// Orders list page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub table: DataTableConfig,
    pub state: TableState,
    pub orders: Arc<Page<OrderListItem>>,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub detail: OrderDetail,
    /// Statuses the order may move to next.
    pub next_statuses: &'static [OrderStatus],
}

/// Status change form data.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Orders list page handler.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    Query(message): Query<MessageQuery>,
) -> Result<OrdersIndexTemplate, AppError> {
    let query = OrderQuery::from_pairs(&pairs);

    let key = CacheKey::new(CacheTag::Orders, format!("{query:?}"));
    let orders = if let Some(CacheValue::Orders(page)) = state.cache().get(&key).await {
        page
    } else {
        let page = Arc::new(OrderRepository::new(state.pool()).list(&query).await?);
        state
            .cache()
            .insert(key, CacheValue::Orders(Arc::clone(&page)))
            .await;
        page
    };

    Ok(OrdersIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/orders".to_string(),
        flash: message.into(),
        table: orders_table_config().with_values(&pairs),
        state: TableState::new(
            "/orders",
            query.filter_query_string(),
            query.sort.as_str(),
            query.direction,
            &*orders,
        ),
        orders,
    })
}

/// Order detail page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Query(query): Query<MessageQuery>,
) -> Result<OrderShowTemplate, AppError> {
    let detail = OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

    Ok(OrderShowTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/orders".to_string(),
        flash: query.into(),
        next_statuses: detail.order.status.next_statuses(),
        detail,
    })
}

/// Move an order to a new status.
///
/// Only the forward transitions in [`OrderStatus::next_statuses`] are
/// accepted. The update is guarded on the status we read, so a concurrent
/// change is reported instead of silently skipped.
#[tracing::instrument(skip(admin, state))]
pub async fn update_status(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Result<Response, AppError> {
    let path = format!("/orders/{id}");
    let repo = OrderRepository::new(state.pool());

    let current = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?
        .order
        .status;

    let Ok(next) = form.status.parse::<OrderStatus>() else {
        return Ok(redirect_error(&path, "invalid_transition"));
    };
    if !current.can_transition_to(next) {
        tracing::info!(order_id = %id, from = %current, to = %next, "Rejected status transition");
        return Ok(redirect_error(&path, "invalid_transition"));
    }

    match repo.update_status(id, current, next).await {
        Ok(()) => {
            state
                .cache()
                .revalidate_many(&[CacheTag::Orders, CacheTag::Dashboard]);
            tracing::info!(order_id = %id, admin_id = %admin.id, "Order status updated");
            Ok(redirect_success(&path, "status_updated"))
        }
        Err(RepositoryError::NotFound) => Ok(redirect_error(&path, "stale_status")),
        Err(e) => Err(e.into()),
    }
}
