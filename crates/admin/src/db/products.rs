//! Product and variant repository.
//!
//! Variants are owned by their product: create inserts them alongside the
//! product and update replaces the whole set inside one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use pharmacy_core::{
    CategoryId, ManufacturerId, Money, Page, PageRequest, ProductId, VariantId,
};

use super::{RepositoryError, SortDirection, like_pattern};
use crate::models::catalog::{
    LOW_STOCK_THRESHOLD, Product, ProductDetail, ProductFilter, ProductInput, ProductListItem,
    ProductSearchHit, ProductSort, ProductVariant, StockState, VariantInput,
};

// =============================================================================
// Internal Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, name, slug, description, category_id, manufacturer_id, \
     requires_prescription, is_featured, is_archived, image_urls, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    category_id: i32,
    manufacturer_id: i32,
    requires_prescription: bool,
    is_featured: bool,
    is_archived: bool,
    image_urls: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            category_id: CategoryId::new(row.category_id),
            manufacturer_id: ManufacturerId::new(row.manufacturer_id),
            requires_prescription: row.requires_prescription,
            is_featured: row.is_featured,
            is_archived: row.is_archived,
            image_urls: row.image_urls,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: i32,
    product_id: i32,
    name: String,
    sku: String,
    price: Decimal,
    stock: i32,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: VariantId::new(row.id),
            product_id: ProductId::new(row.product_id),
            name: row.name,
            sku: row.sku,
            price: Money::new(row.price),
            stock: row.stock,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductListRow {
    id: i32,
    name: String,
    slug: String,
    category_name: String,
    manufacturer_name: String,
    min_price: Decimal,
    max_price: Decimal,
    total_stock: i64,
    variant_count: i64,
    requires_prescription: bool,
    is_featured: bool,
    is_archived: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductListRow> for ProductListItem {
    fn from(row: ProductListRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            category_name: row.category_name,
            manufacturer_name: row.manufacturer_name,
            min_price: Money::new(row.min_price),
            max_price: Money::new(row.max_price),
            total_stock: row.total_stock,
            variant_count: row.variant_count,
            requires_prescription: row.requires_prescription,
            is_featured: row.is_featured,
            is_archived: row.is_archived,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SearchRow {
    product_id: i32,
    product_name: String,
    variant_id: i32,
    variant_name: String,
    sku: String,
    price: Decimal,
    stock: i32,
}

impl From<SearchRow> for ProductSearchHit {
    fn from(row: SearchRow) -> Self {
        Self {
            id: ProductId::new(row.product_id),
            name: row.product_name,
            sku: row.sku,
            variant_id: VariantId::new(row.variant_id),
            variant_name: row.variant_name,
            price: Money::new(row.price),
            stock: row.stock,
        }
    }
}

// =============================================================================
// List Query
// =============================================================================

/// Per-product variant aggregates, joined into list queries.
const VARIANT_AGG: &str = "LEFT JOIN LATERAL ( \
     SELECT COALESCE(MIN(v.price), 0) AS min_price, COALESCE(MAX(v.price), 0) AS max_price, \
            COALESCE(SUM(v.stock), 0)::int8 AS total_stock, COUNT(*) AS variant_count \
     FROM rx.product_variant v WHERE v.product_id = p.id) agg ON TRUE";

fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q ProductFilter) {
    qb.push(" WHERE p.is_archived = ")
        .push_bind(filter.archived.unwrap_or(false));

    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM rx.product_variant sv WHERE sv.product_id = p.id AND sv.sku ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
    if let Some(category) = filter.category_id {
        qb.push(" AND p.category_id = ").push_bind(category.as_i32());
    }
    if let Some(manufacturer) = filter.manufacturer_id {
        qb.push(" AND p.manufacturer_id = ").push_bind(manufacturer.as_i32());
    }
    match filter.stock {
        Some(StockState::OutOfStock) => {
            qb.push(" AND agg.total_stock <= 0");
        }
        Some(StockState::LowStock) => {
            qb.push(" AND agg.total_stock > 0 AND agg.total_stock <= ")
                .push_bind(LOW_STOCK_THRESHOLD);
        }
        Some(StockState::InStock) => {
            qb.push(" AND agg.total_stock > ").push_bind(LOW_STOCK_THRESHOLD);
        }
        None => {}
    }
}

fn count_query(filter: &ProductFilter) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM rx.product p ");
    qb.push(VARIANT_AGG);
    push_filters(&mut qb, filter);
    qb
}

fn sort_sql(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Name => "lower(p.name)",
        ProductSort::CreatedAt => "p.created_at",
        ProductSort::Price => "agg.min_price",
        ProductSort::Stock => "agg.total_stock",
    }
}

fn list_query(
    filter: &ProductFilter,
    sort: ProductSort,
    direction: SortDirection,
    page: PageRequest,
) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT p.id, p.name, p.slug, c.name AS category_name, m.name AS manufacturer_name, \
         agg.min_price, agg.max_price, agg.total_stock, agg.variant_count, \
         p.requires_prescription, p.is_featured, p.is_archived, p.created_at \
         FROM rx.product p \
         JOIN rx.category c ON c.id = p.category_id \
         JOIN rx.manufacturer m ON m.id = p.manufacturer_id ",
    );
    qb.push(VARIANT_AGG);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY ")
        .push(sort_sql(sort))
        .push(" ")
        .push(direction.sql())
        .push(", p.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    qb
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for products and their variants.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Page through products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &ProductFilter,
        sort: ProductSort,
        direction: SortDirection,
        page: PageRequest,
    ) -> Result<Page<ProductListItem>, RepositoryError> {
        let (total,): (i64,) = count_query(filter)
            .build_query_as()
            .fetch_one(self.pool)
            .await?;

        let rows: Vec<ProductListRow> = list_query(filter, sort, direction, page)
            .build_query_as()
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(rows.into_iter().map(Into::into).collect(), total, page))
    }

    /// A product with its variants and category/manufacturer names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<ProductDetail>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM rx.product WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let product: Product = row.into();

        let (category_name, manufacturer_name): (String, String) = sqlx::query_as(
            "SELECT c.name, m.name FROM rx.category c, rx.manufacturer m \
             WHERE c.id = $1 AND m.id = $2",
        )
        .bind(product.category_id.as_i32())
        .bind(product.manufacturer_id.as_i32())
        .fetch_one(self.pool)
        .await?;

        let variants = self.variants(id).await?;

        Ok(Some(ProductDetail {
            product,
            variants,
            category_name,
            manufacturer_name,
        }))
    }

    /// Variants of a product, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn variants(&self, id: ProductId) -> Result<Vec<ProductVariant>, RepositoryError> {
        let rows = sqlx::query_as::<_, VariantRow>(
            "SELECT id, product_id, name, sku, price, stock FROM rx.product_variant \
             WHERE product_id = $1 ORDER BY id",
        )
        .bind(id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Insert a product and its variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a taken slug or SKU.
    /// Returns `RepositoryError::InUse` if the category or manufacturer is missing.
    pub async fn create(&self, input: &ProductInput) -> Result<ProductId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO rx.product (name, slug, description, category_id, manufacturer_id, \
                 requires_prescription, is_featured, image_urls) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.category_id.as_i32())
        .bind(input.manufacturer_id.as_i32())
        .bind(input.requires_prescription)
        .bind(input.is_featured)
        .bind(&input.image_urls)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "a product with this slug"))?;

        let id = ProductId::new(id);
        insert_variants(&mut tx, id, &input.variants).await?;
        tx.commit().await?;

        tracing::info!(product_id = %id, variants = input.variants.len(), "Product created");
        Ok(id)
    }

    /// Update a product and replace its variant rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` for a taken slug or SKU.
    /// Returns `RepositoryError::InUse` if a removed variant appears on orders.
    pub async fn update(&self, id: ProductId, input: &ProductInput) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE rx.product SET name = $2, slug = $3, description = $4, category_id = $5, \
                 manufacturer_id = $6, requires_prescription = $7, is_featured = $8, \
                 image_urls = $9, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.category_id.as_i32())
        .bind(input.manufacturer_id.as_i32())
        .bind(input.requires_prescription)
        .bind(input.is_featured)
        .bind(&input.image_urls)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "a product with this slug"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        // Keep variant IDs stable for SKUs that survive the edit so order
        // lines referencing them stay valid.
        let skus: Vec<String> = input.variants.iter().map(|v| v.sku.clone()).collect();
        sqlx::query("DELETE FROM rx.product_variant WHERE product_id = $1 AND sku <> ALL($2)")
            .bind(id.as_i32())
            .bind(&skus)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "variant"))?;

        for variant in &input.variants {
            sqlx::query(
                "INSERT INTO rx.product_variant (product_id, name, sku, price, stock) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (sku) DO UPDATE SET name = EXCLUDED.name, price = EXCLUDED.price, \
                     stock = EXCLUDED.stock \
                 WHERE rx.product_variant.product_id = EXCLUDED.product_id",
            )
            .bind(id.as_i32())
            .bind(&variant.name)
            .bind(&variant.sku)
            .bind(variant.price.amount())
            .bind(variant.stock)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "a variant with this SKU"))
            .and_then(|r| {
                // Zero rows: the SKU belongs to another product.
                if r.rows_affected() == 0 {
                    Err(RepositoryError::Conflict(format!(
                        "SKU {} is used by another product",
                        variant.sku
                    )))
                } else {
                    Ok(())
                }
            })?;
        }

        tx.commit().await?;
        tracing::info!(product_id = %id, "Product updated");
        Ok(())
    }

    /// Archive or restore a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_archived(&self, id: ProductId, archived: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE rx.product SET is_archived = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(archived)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Delete a product and its variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InUse` if any variant appears on an order.
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM rx.product WHERE id = $1")
            .bind(id.as_i32())
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "product"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Variant-level name/SKU search over active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, term: &str, limit: i64) -> Result<Vec<ProductSearchHit>, RepositoryError> {
        let rows = sqlx::query_as::<_, SearchRow>(
            "SELECT p.id AS product_id, p.name AS product_name, v.id AS variant_id, \
                    v.name AS variant_name, v.sku, v.price, v.stock \
             FROM rx.product_variant v JOIN rx.product p ON p.id = v.product_id \
             WHERE NOT p.is_archived AND (p.name ILIKE $1 OR v.sku ILIKE $1) \
             ORDER BY p.name, v.id LIMIT $2",
        )
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

async fn insert_variants(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
    variants: &[VariantInput],
) -> Result<(), RepositoryError> {
    for variant in variants {
        sqlx::query(
            "INSERT INTO rx.product_variant (product_id, name, sku, price, stock) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(product_id.as_i32())
        .bind(&variant.name)
        .bind(&variant.sku)
        .bind(variant.price.amount())
        .bind(variant.stock)
        .execute(&mut **tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "a variant with this SKU"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_list_shows_active_products() {
        let filter = ProductFilter::default();
        let qb = list_query(&filter, ProductSort::default(), SortDirection::Desc, PageRequest::default());
        let sql = qb.sql();
        assert!(sql.contains("WHERE p.is_archived = $1"));
        assert!(sql.contains("ORDER BY p.created_at DESC, p.id DESC LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_stock_filter_and_sort() {
        let filter = ProductFilter {
            search: Some("ibu".to_string()),
            category_id: Some(CategoryId::new(3)),
            stock: Some(StockState::LowStock),
            ..ProductFilter::default()
        };
        let qb = list_query(&filter, ProductSort::Stock, SortDirection::Asc, PageRequest::default());
        let sql = qb.sql();
        assert!(sql.contains("p.name ILIKE $2"));
        assert!(sql.contains("sv.sku ILIKE $3"));
        assert!(sql.contains("p.category_id = $4"));
        assert!(sql.contains("agg.total_stock > 0 AND agg.total_stock <= $5"));
        assert!(sql.contains("ORDER BY agg.total_stock ASC"));
    }

    #[test]
    fn test_count_query_shares_filters() {
        let filter = ProductFilter {
            stock: Some(StockState::OutOfStock),
            ..ProductFilter::default()
        };
        let sql = count_query(&filter).sql().to_string();
        assert!(sql.starts_with("SELECT COUNT(*) FROM rx.product p LEFT JOIN LATERAL"));
        assert!(sql.ends_with("AND agg.total_stock <= 0"));
    }
}
