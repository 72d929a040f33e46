//! Product management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use pharmacy_core::{Page, PageRequest, ProductId};

use crate::components::data_table::{
    DataTableConfig, FilterOption, TableState, products_table_config,
};
use crate::db::{ProductRepository, RepositoryError, SortDirection};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::CurrentAdmin;
use crate::models::catalog::{
    ProductDetail, ProductFilter, ProductForm, ProductListItem, ProductSort, StockState,
};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::categories::{CategoryOption, category_options, load_tree};
use super::manufacturers::load_all as load_manufacturers;
use super::{AdminUserView, Flash, MessageQuery, form_failure, redirect_success};

/// Product counts show up in the category and manufacturer lists, and
/// product names on the dashboard.
const REVALIDATE: [CacheTag; 4] = [
    CacheTag::Products,
    CacheTag::Categories,
    CacheTag::Manufacturers,
    CacheTag::Dashboard,
];

// =============================================================================
// List Query
// =============================================================================

/// Parsed `/products` query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductListQuery {
    pub filter: ProductFilter,
    pub sort: ProductSort,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl ProductListQuery {
    /// Parse query pairs; unknown keys and malformed values are ignored.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = Self::default();
        let mut sort = None;
        let mut direction = None;
        let mut page = None;
        let mut per_page = None;

        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "q" => query.filter.search = Some(value.to_string()),
                "category" => query.filter.category_id = value.parse().ok(),
                "manufacturer" => query.filter.manufacturer_id = value.parse().ok(),
                "stock" => query.filter.stock = StockState::parse(value),
                "archived" => query.filter.archived = value.parse().ok(),
                "sort" => sort = Some(value),
                "dir" => direction = Some(value),
                "page" => page = value.parse().ok(),
                "per_page" => per_page = value.parse().ok(),
                _ => {}
            }
        }

        query.sort = ProductSort::parse(sort);
        query.direction = SortDirection::parse_or(direction, SortDirection::Desc);
        query.page = PageRequest::new(page, per_page);
        query
    }

    /// Active filters as a query string, for sort and pager links.
    #[must_use]
    pub fn filter_query_string(&self) -> String {
        let filter = &self.filter;
        let mut parts = Vec::new();
        if let Some(search) = &filter.search {
            parts.push(format!("q={}", urlencoding::encode(search)));
        }
        if let Some(category) = filter.category_id {
            parts.push(format!("category={category}"));
        }
        if let Some(manufacturer) = filter.manufacturer_id {
            parts.push(format!("manufacturer={manufacturer}"));
        }
        if let Some(stock) = filter.stock {
            parts.push(format!("stock={}", stock.as_str()));
        }
        if let Some(archived) = filter.archived {
            parts.push(format!("archived={archived}"));
        }
        parts.join("&")
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            CacheTag::Products,
            format!(
                "{}|{}|{}|{}|{}",
                self.filter_query_string(),
                self.sort.as_str(),
                self.direction.as_str(),
                self.page.page(),
                self.page.per_page()
            ),
        )
    }
}

// =============================================================================
// Form Views
// =============================================================================

/// One variant row of the product form.
#[derive(Debug, Clone, Default)]
pub struct VariantRowView {
    pub name: String,
    pub sku: String,
    pub price: String,
    pub stock: String,
}

/// Product form values, either from the database or a rejected submission.
#[derive(Debug, Clone, Default)]
pub struct ProductFormView {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category_id: String,
    pub manufacturer_id: String,
    pub requires_prescription: bool,
    pub is_featured: bool,
    pub image_urls: Vec<String>,
    pub variants: Vec<VariantRowView>,
}

impl From<&ProductDetail> for ProductFormView {
    fn from(detail: &ProductDetail) -> Self {
        let product = &detail.product;
        Self {
            name: product.name.clone(),
            slug: product.slug.clone(),
            description: product.description.clone(),
            category_id: product.category_id.to_string(),
            manufacturer_id: product.manufacturer_id.to_string(),
            requires_prescription: product.requires_prescription,
            is_featured: product.is_featured,
            image_urls: product.image_urls.clone(),
            variants: detail
                .variants
                .iter()
                .map(|v| VariantRowView {
                    name: v.name.clone(),
                    sku: v.sku.clone(),
                    price: v.price.amount().to_string(),
                    stock: v.stock.to_string(),
                })
                .collect(),
        }
    }
}

impl From<ProductForm> for ProductFormView {
    fn from(form: ProductForm) -> Self {
        let variants = form
            .variant_names
            .into_iter()
            .zip(form.variant_skus)
            .zip(form.variant_prices)
            .zip(form.variant_stocks)
            .filter(|(((name, sku), price), stock)| {
                [name, sku, price, stock].iter().any(|v| !v.trim().is_empty())
            })
            .map(|(((name, sku), price), stock)| VariantRowView {
                name,
                sku,
                price,
                stock,
            })
            .collect();

        Self {
            name: form.name,
            slug: form.slug.unwrap_or_default(),
            description: form.description.unwrap_or_default(),
            category_id: form.category_id.unwrap_or_default(),
            manufacturer_id: form.manufacturer_id.unwrap_or_default(),
            requires_prescription: form.requires_prescription,
            is_featured: form.is_featured,
            image_urls: form
                .image_urls
                .into_iter()
                .filter(|u| !u.trim().is_empty())
                .collect(),
            variants,
        }
    }
}

/// A plain `<option>`.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Products list page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub table: DataTableConfig,
    pub state: TableState,
    pub products: Arc<Page<ProductListItem>>,
}

/// Product create/edit form template.
#[derive(Template, WebTemplate)]
#[template(path = "products/form.html")]
pub struct ProductFormTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    /// `None` on the create page.
    pub product_id: Option<ProductId>,
    pub is_archived: bool,
    pub form: ProductFormView,
    pub categories: Vec<CategoryOption>,
    pub manufacturers: Vec<SelectOption>,
    pub uploads_enabled: bool,
}

impl ProductFormTemplate {
    /// Form action URL.
    #[must_use]
    pub fn action(&self) -> String {
        self.product_id
            .map_or_else(|| "/products".to_string(), |id| format!("/products/{id}"))
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Products list page handler.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    Query(message): Query<MessageQuery>,
) -> Result<ProductsIndexTemplate, AppError> {
    let query = ProductListQuery::from_pairs(&pairs);

    let key = query.cache_key();
    let products = if let Some(CacheValue::Products(page)) = state.cache().get(&key).await {
        page
    } else {
        let page = Arc::new(
            ProductRepository::new(state.pool())
                .list(&query.filter, query.sort, query.direction, query.page)
                .await?,
        );
        state
            .cache()
            .insert(key, CacheValue::Products(Arc::clone(&page)))
            .await;
        page
    };

    let tree = load_tree(&state).await?;
    let manufacturers = load_manufacturers(&state).await?;
    let table = products_table_config(
        tree.iter()
            .map(|n| {
                FilterOption::new(
                    n.category.id.to_string(),
                    format!("{}{}", "\u{2014} ".repeat(n.depth), n.category.name),
                )
            })
            .collect(),
        manufacturers
            .iter()
            .map(|m| FilterOption::new(m.manufacturer.id.to_string(), m.manufacturer.name.clone()))
            .collect(),
    )
    .with_values(&pairs);

    Ok(ProductsIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/products".to_string(),
        flash: message.into(),
        state: TableState::new(
            "/products",
            query.filter_query_string(),
            query.sort.as_str(),
            query.direction,
            &*products,
        ),
        table,
        products,
    })
}

/// Render the product form with the shared select options.
async fn form_page(
    state: &AppState,
    admin: &CurrentAdmin,
    flash: Flash,
    product_id: Option<ProductId>,
    is_archived: bool,
    form: ProductFormView,
) -> Result<Response, AppError> {
    let tree = load_tree(state).await?;
    let manufacturers = load_manufacturers(state).await?;
    let selected_category = form.category_id.parse().ok();

    Ok(ProductFormTemplate {
        admin_user: AdminUserView::from(admin),
        current_path: "/products".to_string(),
        flash,
        product_id,
        is_archived,
        categories: category_options(&tree, selected_category, None),
        manufacturers: manufacturers
            .iter()
            .map(|m| SelectOption {
                value: m.manufacturer.id.to_string(),
                label: m.manufacturer.name.clone(),
            })
            .collect(),
        uploads_enabled: state.uploads().is_some(),
        form,
    }
    .into_response())
}

/// New product form handler.
#[tracing::instrument(skip(admin, state))]
pub async fn new_product(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    form_page(&state, &admin, Flash::default(), None, false, ProductFormView::default()).await
}

/// Create product handler.
///
/// Invalid submissions re-render the form with the entered values.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let form = ProductForm::from_pairs(pairs);
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => {
            let flash = Flash::error(e.to_string());
            return form_page(&state, &admin, flash, None, false, form.into()).await;
        }
    };

    match ProductRepository::new(state.pool()).create(&input).await {
        Ok(id) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(product_id = %id, admin_id = %admin.id, "Product created");
            Ok(redirect_success(&format!("/products/{id}"), "created"))
        }
        Err(RepositoryError::Conflict(message)) => {
            let flash = Flash::error(message);
            form_page(&state, &admin, flash, None, false, form.into()).await
        }
        Err(e) => form_failure("/products/new", e),
    }
}

/// Product edit page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(query): Query<MessageQuery>,
) -> Result<Response, AppError> {
    let detail = ProductRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    let form = ProductFormView::from(&detail);
    form_page(
        &state,
        &admin,
        query.into(),
        Some(id),
        detail.product.is_archived,
        form,
    )
    .await
}

/// Update product handler. Variant rows are replaced wholesale.
#[tracing::instrument(skip(admin, state, pairs))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let path = format!("/products/{id}");
    let repo = ProductRepository::new(state.pool());
    let form = ProductForm::from_pairs(pairs);

    let rejection = match form.validate() {
        Ok(input) => match repo.update(id, &input).await {
            Ok(()) => {
                state.cache().revalidate_many(&REVALIDATE);
                tracing::info!(product_id = %id, admin_id = %admin.id, "Product updated");
                return Ok(redirect_success(&path, "updated"));
            }
            Err(RepositoryError::Conflict(message) | RepositoryError::InUse(message)) => message,
            Err(e) => return form_failure(&path, e),
        },
        Err(e) => e.to_string(),
    };

    let is_archived = repo
        .get(id)
        .await?
        .is_some_and(|detail| detail.product.is_archived);
    form_page(
        &state,
        &admin,
        Flash::error(rejection),
        Some(id),
        is_archived,
        form.into(),
    )
    .await
}

/// Archive form data.
#[derive(Debug, Deserialize)]
pub struct ArchiveForm {
    pub archived: bool,
}

/// Archive or restore a product.
#[tracing::instrument(skip(admin, state))]
pub async fn archive(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Form(form): Form<ArchiveForm>,
) -> Result<Response, AppError> {
    let path = format!("/products/{id}");
    match ProductRepository::new(state.pool())
        .set_archived(id, form.archived)
        .await
    {
        Ok(()) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(product_id = %id, admin_id = %admin.id, archived = form.archived, "Product visibility changed");
            let code = if form.archived { "archived" } else { "unarchived" };
            Ok(redirect_success(&path, code))
        }
        Err(e) => form_failure(&path, e),
    }
}

/// Delete a product. Products that appear on orders must be archived instead.
#[tracing::instrument(skip(admin, state))]
pub async fn delete(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Response, AppError> {
    match ProductRepository::new(state.pool()).delete(id).await {
        Ok(()) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(product_id = %id, admin_id = %admin.id, "Product deleted");
            Ok(redirect_success("/products", "deleted"))
        }
        Err(RepositoryError::NotFound) => Ok(Redirect::to("/products").into_response()),
        Err(e) => form_failure(&format!("/products/{id}"), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_core::CategoryId;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_list_query_defaults() {
        let query = ProductListQuery::from_pairs(&[]);
        assert_eq!(query.sort, ProductSort::CreatedAt);
        assert_eq!(query.direction, SortDirection::Desc);
        assert_eq!(query.filter, ProductFilter::default());
        assert_eq!(query.filter_query_string(), "");
    }

    #[test]
    fn test_list_query_filters_round_into_links() {
        let query = ProductListQuery::from_pairs(&pairs(&[
            ("q", "ibuprofen 200"),
            ("category", "3"),
            ("manufacturer", "x"),
            ("stock", "low_stock"),
            ("archived", "true"),
            ("sort", "price"),
            ("dir", "asc"),
            ("page", "2"),
        ]));

        assert_eq!(query.filter.category_id, Some(CategoryId::new(3)));
        assert_eq!(query.filter.manufacturer_id, None);
        assert_eq!(query.filter.stock, Some(StockState::LowStock));
        assert_eq!(query.filter.archived, Some(true));
        assert_eq!(query.sort, ProductSort::Price);
        assert_eq!(query.direction, SortDirection::Asc);
        assert_eq!(query.page.page(), 2);
        assert_eq!(
            query.filter_query_string(),
            "q=ibuprofen%20200&category=3&stock=low_stock&archived=true"
        );
    }

    #[test]
    fn test_cache_key_differs_by_page() {
        let first = ProductListQuery::from_pairs(&pairs(&[("page", "1")]));
        let second = ProductListQuery::from_pairs(&pairs(&[("page", "2")]));
        assert_ne!(first.cache_key(), second.cache_key());
    }

    #[test]
    fn test_rejected_form_keeps_entered_rows() {
        let form = ProductForm::from_pairs(pairs(&[
            ("name", "Ibuprofen"),
            ("variant_name", "200mg x 24"),
            ("variant_sku", "IBU-200-24"),
            ("variant_price", "abc"),
            ("variant_stock", "5"),
            ("variant_name", ""),
            ("variant_sku", ""),
            ("variant_price", ""),
            ("variant_stock", ""),
            ("image_url", ""),
        ]));
        let view = ProductFormView::from(form);

        assert_eq!(view.name, "Ibuprofen");
        assert_eq!(view.variants.len(), 1);
        assert_eq!(view.variants[0].price, "abc");
        assert!(view.image_urls.is_empty());
    }
}
