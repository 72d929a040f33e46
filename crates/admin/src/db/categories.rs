//! Category repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pharmacy_core::CategoryId;

use super::RepositoryError;
use crate::models::catalog::{Category, CategoryInput, CategoryTreeNode, flatten_tree, would_create_cycle};

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    slug: String,
    parent_id: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            slug: row.slug,
            parent_id: row.parent_id.map(CategoryId::new),
            created_at: row.created_at,
        }
    }
}

/// Repository for `rx.category`.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All categories, unordered.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, slug, parent_id, created_at FROM rx.category",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Categories in display order with depth and direct product counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn tree(&self) -> Result<Vec<CategoryTreeNode>, RepositoryError> {
        let categories = self.list_all().await?;
        let counts: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT category_id, COUNT(*) FROM rx.product GROUP BY category_id",
        )
        .fetch_all(self.pool)
        .await?;

        let counts: HashMap<CategoryId, i64> = counts
            .into_iter()
            .map(|(id, n)| (CategoryId::new(id), n))
            .collect();
        Ok(flatten_tree(categories, &counts))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, slug, parent_id, created_at FROM rx.category WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    /// Returns `RepositoryError::NotFound` if the parent does not exist.
    pub async fn create(&self, input: &CategoryInput) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO rx.category (name, slug, parent_id) VALUES ($1, $2, $3) \
             RETURNING id, name, slug, parent_id, created_at",
        )
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.parent_id.map(|p| p.as_i32()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| match RepositoryError::from_write(e, "a category with this slug") {
            RepositoryError::InUse(_) => RepositoryError::NotFound,
            other => other,
        })?;

        Ok(row.into())
    }

    /// Update a category, refusing to move it under itself or a descendant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a taken slug or a cyclic parent.
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn update(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError> {
        if let Some(parent) = input.parent_id {
            let parents: HashMap<CategoryId, Option<CategoryId>> = self
                .list_all()
                .await?
                .into_iter()
                .map(|c| (c.id, c.parent_id))
                .collect();
            if would_create_cycle(&parents, id, parent) {
                return Err(RepositoryError::Conflict(
                    "a category cannot be moved under itself or its subcategories".to_string(),
                ));
            }
        }

        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE rx.category SET name = $2, slug = $3, parent_id = $4 WHERE id = $1 \
             RETURNING id, name, slug, parent_id, created_at",
        )
        .bind(id.as_i32())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(input.parent_id.map(|p| p.as_i32()))
        .fetch_optional(self.pool)
        .await
        .map_err(|e| match RepositoryError::from_write(e, "a category with this slug") {
            RepositoryError::InUse(_) => RepositoryError::NotFound,
            other => other,
        })?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a category. Subcategories become top-level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InUse` while products reference it.
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn delete(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.category WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "category"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
