//! Category management route handlers.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use pharmacy_core::CategoryId;

use crate::db::{CategoryRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::catalog::{Category, CategoryInput, CategoryTreeNode};
use crate::services::{CacheKey, CacheTag, CacheValue};
use crate::state::AppState;

use super::{AdminUserView, Flash, MessageQuery, form_failure, redirect_error, redirect_success};

/// Tags whose cached results show category names or counts.
const REVALIDATE: [CacheTag; 3] = [CacheTag::Categories, CacheTag::Products, CacheTag::Dashboard];

/// Category form data.
#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl CategoryForm {
    fn validate(&self) -> Result<CategoryInput, crate::models::ValidationError> {
        CategoryInput::parse(&self.name, self.slug.as_deref(), self.parent_id.as_deref())
    }
}

/// An indented `<option>` for a category select.
#[derive(Debug, Clone)]
pub struct CategoryOption {
    pub id: CategoryId,
    pub label: String,
    pub selected: bool,
}

/// Categories list page template.
#[derive(Template, WebTemplate)]
#[template(path = "categories/index.html")]
pub struct CategoriesIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub tree: Arc<Vec<CategoryTreeNode>>,
    pub parent_options: Vec<CategoryOption>,
}

/// Category edit page template.
#[derive(Template, WebTemplate)]
#[template(path = "categories/edit.html")]
pub struct CategoryEditTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub category: Category,
    pub product_count: i64,
    pub parent_options: Vec<CategoryOption>,
}

/// Load the category tree through the query cache.
///
/// # Errors
///
/// Returns `RepositoryError` if the query fails.
pub async fn load_tree(state: &AppState) -> Result<Arc<Vec<CategoryTreeNode>>, RepositoryError> {
    let key = CacheKey::new(CacheTag::Categories, "tree");
    if let Some(CacheValue::CategoryTree(tree)) = state.cache().get(&key).await {
        return Ok(tree);
    }
    let tree = Arc::new(CategoryRepository::new(state.pool()).tree().await?);
    state
        .cache()
        .insert(key, CacheValue::CategoryTree(Arc::clone(&tree)))
        .await;
    Ok(tree)
}

/// Select options in tree order, indented by depth.
///
/// With `exclude`, that category and its whole subtree are left out, so a
/// category cannot be offered as its own parent.
#[must_use]
pub fn category_options(
    tree: &[CategoryTreeNode],
    selected: Option<CategoryId>,
    exclude: Option<CategoryId>,
) -> Vec<CategoryOption> {
    let mut options = Vec::with_capacity(tree.len());
    let mut skip_below: Option<usize> = None;
    for node in tree {
        if let Some(depth) = skip_below {
            if node.depth > depth {
                continue;
            }
            skip_below = None;
        }
        if Some(node.category.id) == exclude {
            skip_below = Some(node.depth);
            continue;
        }
        options.push(CategoryOption {
            id: node.category.id,
            label: format!("{}{}", "\u{2014} ".repeat(node.depth), node.category.name),
            selected: Some(node.category.id) == selected,
        });
    }
    options
}

/// Categories list page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<CategoriesIndexTemplate, AppError> {
    let tree = load_tree(&state).await?;
    Ok(CategoriesIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/categories".to_string(),
        flash: query.into(),
        parent_options: category_options(&tree, None, None),
        tree,
    })
}

/// Create category handler.
#[tracing::instrument(skip(admin, state, form), fields(name = %form.name))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Form(form): Form<CategoryForm>,
) -> Result<Response, AppError> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return Ok(redirect_error("/categories", e.field)),
    };

    match CategoryRepository::new(state.pool()).create(&input).await {
        Ok(category) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(category_id = %category.id, admin_id = %admin.id, "Category created");
            Ok(redirect_success("/categories", "created"))
        }
        Err(e) => form_failure("/categories", e),
    }
}

/// Category edit page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Query(query): Query<MessageQuery>,
) -> Result<CategoryEditTemplate, AppError> {
    let tree = load_tree(&state).await?;
    let node = tree
        .iter()
        .find(|n| n.category.id == id)
        .ok_or_else(|| AppError::NotFound(format!("category {id}")))?;

    Ok(CategoryEditTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/categories".to_string(),
        flash: query.into(),
        category: node.category.clone(),
        product_count: node.product_count,
        parent_options: category_options(&tree, node.category.parent_id, Some(id)),
    })
}

/// Update category handler.
#[tracing::instrument(skip(admin, state, form))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    Form(form): Form<CategoryForm>,
) -> Result<Response, AppError> {
    let path = format!("/categories/{id}");
    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => return Ok(redirect_error(&path, e.field)),
    };

    match CategoryRepository::new(state.pool()).update(id, &input).await {
        Ok(_) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(category_id = %id, admin_id = %admin.id, "Category updated");
            Ok(redirect_success(&path, "updated"))
        }
        Err(e) => form_failure(&path, e),
    }
}

/// Delete category handler. Refused while products reference it.
#[tracing::instrument(skip(admin, state))]
pub async fn delete(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Response, AppError> {
    match CategoryRepository::new(state.pool()).delete(id).await {
        Ok(()) => {
            state.cache().revalidate_many(&REVALIDATE);
            tracing::info!(category_id = %id, admin_id = %admin.id, "Category deleted");
            Ok(redirect_success("/categories", "deleted"))
        }
        Err(e) => form_failure(&format!("/categories/{id}"), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(id: i32, name: &str, parent: Option<i32>, depth: usize) -> CategoryTreeNode {
        CategoryTreeNode {
            category: Category {
                id: CategoryId::new(id),
                name: name.to_string(),
                slug: name.to_lowercase(),
                parent_id: parent.map(CategoryId::new),
                created_at: Utc::now(),
            },
            depth,
            product_count: 0,
        }
    }

    fn tree() -> Vec<CategoryTreeNode> {
        vec![
            node(1, "Medicine", None, 0),
            node(2, "Pain Relief", Some(1), 1),
            node(3, "Ibuprofen", Some(2), 2),
            node(4, "Vitamins", Some(1), 1),
            node(5, "Personal Care", None, 0),
        ]
    }

    #[test]
    fn test_category_options_indent_by_depth() {
        let options = category_options(&tree(), Some(CategoryId::new(4)), None);
        assert_eq!(options.len(), 5);
        assert_eq!(options[2].label, "\u{2014} \u{2014} Ibuprofen");
        assert!(options[3].selected);
        assert!(!options[0].selected);
    }

    #[test]
    fn test_category_options_exclude_subtree() {
        let options = category_options(&tree(), None, Some(CategoryId::new(2)));
        let ids: Vec<_> = options.iter().map(|o| o.id.as_i32()).collect();
        assert_eq!(ids, [1, 4, 5]);
    }
}
