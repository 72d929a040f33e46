//! Discount code management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use pharmacy_core::{DiscountCodeId, DiscountKind, Page, PageRequest};

use crate::components::data_table::{DataTableConfig, TableState, discounts_table_config};
use crate::db::{DiscountRepository, RepositoryError, SortDirection};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::CurrentAdmin;
use crate::models::discount::{DiscountCode, DiscountFilter, DiscountForm};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::{AdminUserView, Flash, MessageQuery, form_failure, redirect_success};

/// Value for `<input type="datetime-local">`.
fn datetime_input(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|v| v.format("%Y-%m-%dT%H:%M").to_string())
        .unwrap_or_default()
}

/// Parse the `/discounts` query string into a filter and page.
#[must_use]
pub fn parse_list_query(pairs: &[(String, String)]) -> (DiscountFilter, PageRequest) {
    let mut filter = DiscountFilter::default();
    let mut page = None;
    let mut per_page = None;
    for (key, value) in pairs {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "q" => filter.search = Some(value.to_string()),
            "active" => filter.active = value.parse().ok(),
            "page" => page = value.parse().ok(),
            "per_page" => per_page = value.parse().ok(),
            _ => {}
        }
    }
    (filter, PageRequest::new(page, per_page))
}

fn filter_query_string(filter: &DiscountFilter) -> String {
    let mut parts = Vec::new();
    if let Some(search) = &filter.search {
        parts.push(format!("q={}", urlencoding::encode(search)));
    }
    if let Some(active) = filter.active {
        parts.push(format!("active={active}"));
    }
    parts.join("&")
}

/// Discount row for the list template.
#[derive(Debug, Clone)]
pub struct DiscountRowView {
    pub code: DiscountCode,
    pub usable: bool,
}

/// Discount form values, either from the database or a rejected submission.
#[derive(Debug, Clone)]
pub struct DiscountFormView {
    pub code: String,
    pub kind: String,
    pub value: String,
    pub min_order_total: String,
    pub max_uses: String,
    pub starts_at: String,
    pub expires_at: String,
    pub is_active: bool,
}

impl Default for DiscountFormView {
    fn default() -> Self {
        Self {
            code: String::new(),
            kind: DiscountKind::Percentage.as_str().to_string(),
            value: String::new(),
            min_order_total: String::new(),
            max_uses: String::new(),
            starts_at: String::new(),
            expires_at: String::new(),
            is_active: true,
        }
    }
}

impl From<&DiscountCode> for DiscountFormView {
    fn from(discount: &DiscountCode) -> Self {
        Self {
            code: discount.code.clone(),
            kind: discount.kind.as_str().to_string(),
            value: discount.value.normalize().to_string(),
            min_order_total: discount
                .min_order_total
                .map(|m| m.amount().to_string())
                .unwrap_or_default(),
            max_uses: discount.max_uses.map(|m| m.to_string()).unwrap_or_default(),
            starts_at: datetime_input(discount.starts_at),
            expires_at: datetime_input(discount.expires_at),
            is_active: discount.is_active,
        }
    }
}

impl From<DiscountForm> for DiscountFormView {
    fn from(form: DiscountForm) -> Self {
        Self {
            code: form.code,
            kind: form.kind,
            value: form.value,
            min_order_total: form.min_order_total.unwrap_or_default(),
            max_uses: form.max_uses.unwrap_or_default(),
            starts_at: form.starts_at.unwrap_or_default(),
            expires_at: form.expires_at.unwrap_or_default(),
            is_active: form.is_active.is_some(),
        }
    }
}

/// Discounts list page template.
#[derive(Template, WebTemplate)]
#[template(path = "discounts/index.html")]
pub struct DiscountsIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub table: DataTableConfig,
    pub state: TableState,
    pub discounts: Vec<DiscountRowView>,
}

/// Discount create/edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "discounts/form.html")]
pub struct DiscountFormTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    /// `None` on the create page.
    pub discount: Option<DiscountCode>,
    pub form: DiscountFormView,
    pub kinds: [DiscountKind; 2],
}

impl DiscountFormTemplate {
    /// Form action URL.
    #[must_use]
    pub fn action(&self) -> String {
        self.discount.as_ref().map_or_else(
            || "/discounts".to_string(),
            |d| format!("/discounts/{}", d.id),
        )
    }
}

fn form_page(
    admin: &CurrentAdmin,
    flash: Flash,
    discount: Option<DiscountCode>,
    form: DiscountFormView,
) -> Response {
    DiscountFormTemplate {
        admin_user: AdminUserView::from(admin),
        current_path: "/discounts".to_string(),
        flash,
        discount,
        form,
        kinds: [DiscountKind::Percentage, DiscountKind::FixedAmount],
    }
    .into_response()
}

/// Discounts list page handler.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    Query(message): Query<MessageQuery>,
) -> Result<DiscountsIndexTemplate, AppError> {
    let (filter, page) = parse_list_query(&pairs);

    let key = CacheKey::new(CacheTag::Discounts, format!("{filter:?}|{page:?}"));
    let discounts: Arc<Page<DiscountCode>> =
        if let Some(CacheValue::Discounts(discounts)) = state.cache().get(&key).await {
            discounts
        } else {
            let discounts = Arc::new(DiscountRepository::new(state.pool()).list(&filter, page).await?);
            state
                .cache()
                .insert(key, CacheValue::Discounts(Arc::clone(&discounts)))
                .await;
            discounts
        };

    let now = Utc::now();
    Ok(DiscountsIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/discounts".to_string(),
        flash: message.into(),
        table: discounts_table_config().with_values(&pairs),
        state: TableState::new(
            "/discounts",
            filter_query_string(&filter),
            "created_at",
            SortDirection::Desc,
            &*discounts,
        ),
        discounts: discounts
            .items
            .iter()
            .map(|code| DiscountRowView {
                usable: code.is_usable(now),
                code: code.clone(),
            })
            .collect(),
    })
}

/// New discount form handler.
#[tracing::instrument(skip(admin))]
pub async fn new_discount(RequireAdminAuth(admin): RequireAdminAuth) -> Response {
    form_page(&admin, Flash::default(), None, DiscountFormView::default())
}

/// Create discount handler.
#[tracing::instrument(skip(admin, state, form), fields(code = %form.code))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Form(form): Form<DiscountForm>,
) -> Result<Response, AppError> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return Ok(form_page(&admin, Flash::error(e.to_string()), None, form.into())),
    };

    match DiscountRepository::new(state.pool()).create(&input).await {
        Ok(discount) => {
            state.cache().revalidate(CacheTag::Discounts);
            tracing::info!(discount_id = %discount.id, code = %discount.code, admin_id = %admin.id, "Discount created");
            Ok(redirect_success(&format!("/discounts/{}", discount.id), "created"))
        }
        Err(RepositoryError::Conflict(message)) => {
            Ok(form_page(&admin, Flash::error(message), None, form.into()))
        }
        Err(e) => form_failure("/discounts/new", e),
    }
}

/// Discount edit page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
    Query(query): Query<MessageQuery>,
) -> Result<Response, AppError> {
    let discount = DiscountRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("discount {id}")))?;

    let form = DiscountFormView::from(&discount);
    Ok(form_page(&admin, query.into(), Some(discount), form))
}

/// Update discount handler.
#[tracing::instrument(skip(admin, state, form))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
    Form(form): Form<DiscountForm>,
) -> Result<Response, AppError> {
    let path = format!("/discounts/{id}");
    let repo = DiscountRepository::new(state.pool());

    let rejection = match form.validate() {
        Ok(input) => match repo.update(id, &input).await {
            Ok(_) => {
                state.cache().revalidate(CacheTag::Discounts);
                tracing::info!(discount_id = %id, admin_id = %admin.id, "Discount updated");
                return Ok(redirect_success(&path, "updated"));
            }
            Err(RepositoryError::Conflict(message)) => message,
            Err(e) => return form_failure(&path, e),
        },
        Err(e) => e.to_string(),
    };

    let discount = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("discount {id}")))?;
    Ok(form_page(&admin, Flash::error(rejection), Some(discount), form.into()))
}

/// Flip a discount between active and inactive.
#[tracing::instrument(skip(admin, state))]
pub async fn toggle(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
) -> Result<Response, AppError> {
    match DiscountRepository::new(state.pool()).toggle_active(id).await {
        Ok(active) => {
            state.cache().revalidate(CacheTag::Discounts);
            tracing::info!(discount_id = %id, active, admin_id = %admin.id, "Discount toggled");
            Ok(redirect_success("/discounts", "toggled"))
        }
        Err(e) => form_failure("/discounts", e),
    }
}

/// Delete discount handler.
#[tracing::instrument(skip(admin, state))]
pub async fn delete(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<DiscountCodeId>,
) -> Result<Response, AppError> {
    match DiscountRepository::new(state.pool()).delete(id).await {
        Ok(()) => {
            state.cache().revalidate(CacheTag::Discounts);
            tracing::info!(discount_id = %id, admin_id = %admin.id, "Discount deleted");
            Ok(redirect_success("/discounts", "deleted"))
        }
        Err(e) => form_failure(&format!("/discounts/{id}"), e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    #[test]
    fn test_parse_list_query() {
        let pairs = vec![
            ("q".to_string(), "spring".to_string()),
            ("active".to_string(), "false".to_string()),
        ];
        let (filter, page) = parse_list_query(&pairs);
        assert_eq!(filter.search.as_deref(), Some("spring"));
        assert_eq!(filter.active, Some(false));
        assert_eq!(page.page(), 1);
        assert_eq!(filter_query_string(&filter), "q=spring&active=false");
    }

    #[test]
    fn test_form_view_from_discount() {
        let discount = DiscountCode {
            id: DiscountCodeId::new(1),
            code: "SPRING10".to_string(),
            kind: DiscountKind::Percentage,
            value: Decimal::new(1000, 2),
            min_order_total: None,
            max_uses: Some(50),
            times_used: 3,
            starts_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()),
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        };

        let view = DiscountFormView::from(&discount);
        assert_eq!(view.value, "10");
        assert_eq!(view.max_uses, "50");
        assert_eq!(view.starts_at, "2026-03-01T09:30");
        assert_eq!(view.expires_at, "");
        assert_eq!(view.kind, "percentage");
    }
}
