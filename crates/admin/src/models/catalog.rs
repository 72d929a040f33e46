//! Catalog domain types: categories, manufacturers, products and variants.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use pharmacy_core::{CategoryId, ManufacturerId, Money, ProductId, VariantId, slugify};

use super::validation::{ValidationError, optional, required};

/// Variants at or below this stock level count as "low stock".
pub const LOW_STOCK_THRESHOLD: i64 = 10;

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
}

/// A category positioned in the flattened tree.
#[derive(Debug, Clone)]
pub struct CategoryTreeNode {
    pub category: Category,
    /// 0 for top-level categories.
    pub depth: usize,
    /// Products directly in this category.
    pub product_count: i64,
}

/// Flatten categories into depth-first order, siblings sorted by name.
///
/// Categories whose parent is missing are treated as roots, so a corrupt
/// parent reference never hides a row.
#[must_use]
pub fn flatten_tree(categories: Vec<Category>, counts: &HashMap<CategoryId, i64>) -> Vec<CategoryTreeNode> {
    let ids: HashSet<CategoryId> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<CategoryId>, Vec<Category>> = HashMap::new();
    for category in categories {
        let parent = category.parent_id.filter(|p| ids.contains(p));
        children.entry(parent).or_default().push(category);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    }

    let mut out = Vec::with_capacity(ids.len());
    let mut stack: Vec<(Category, usize)> = children
        .remove(&None)
        .unwrap_or_default()
        .into_iter()
        .rev()
        .map(|c| (c, 0))
        .collect();

    while let Some((category, depth)) = stack.pop() {
        if let Some(kids) = children.remove(&Some(category.id)) {
            stack.extend(kids.into_iter().rev().map(|c| (c, depth + 1)));
        }
        let product_count = counts.get(&category.id).copied().unwrap_or(0);
        out.push(CategoryTreeNode {
            category,
            depth,
            product_count,
        });
    }

    out
}

/// Whether setting `id`'s parent to `new_parent` would create a cycle.
///
/// Walks up from `new_parent`; reaching `id` means `new_parent` is `id`
/// itself or one of its descendants.
#[must_use]
pub fn would_create_cycle(
    parents: &HashMap<CategoryId, Option<CategoryId>>,
    id: CategoryId,
    new_parent: CategoryId,
) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);
    while let Some(current) = cursor {
        if current == id {
            return true;
        }
        if !seen.insert(current) {
            // Existing data already loops; refuse to extend it.
            return true;
        }
        cursor = parents.get(&current).copied().flatten();
    }
    false
}

/// Validated category form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInput {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
}

impl CategoryInput {
    /// Validate raw form values. The slug is derived from the name when blank.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for a missing name or an empty slug.
    pub fn parse(
        name: &str,
        slug: Option<&str>,
        parent_id: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let name = required("name", name, 100)?;
        let slug = slugify(optional(slug).as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(ValidationError::new("slug", "must contain letters or digits"));
        }
        let parent_id = parse_optional_id("parent_id", parent_id)?;
        Ok(Self {
            name,
            slug,
            parent_id,
        })
    }
}

// =============================================================================
// Manufacturers
// =============================================================================

#[derive(Debug, Clone)]
pub struct Manufacturer {
    pub id: ManufacturerId,
    pub name: String,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ManufacturerListItem {
    pub manufacturer: Manufacturer,
    pub product_count: i64,
}

/// Validated manufacturer form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerInput {
    pub name: String,
    pub website: Option<String>,
}

impl ManufacturerInput {
    /// # Errors
    ///
    /// Returns a `ValidationError` for a missing name or a website that is
    /// not an http(s) URL.
    pub fn parse(name: &str, website: Option<&str>) -> Result<Self, ValidationError> {
        let name = required("name", name, 100)?;
        let website = optional(website)
            .map(|w| {
                url::Url::parse(&w)
                    .ok()
                    .filter(|u| matches!(u.scheme(), "http" | "https"))
                    .map(|_| w)
                    .ok_or_else(|| ValidationError::new("website", "must be an http(s) URL"))
            })
            .transpose()?;
        Ok(Self { name, website })
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category_id: CategoryId,
    pub manufacturer_id: ManufacturerId,
    pub requires_prescription: bool,
    pub is_featured: bool,
    pub is_archived: bool,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock: i32,
}

/// A product with its variants and display names.
#[derive(Debug, Clone)]
pub struct ProductDetail {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
    pub category_name: String,
    pub manufacturer_name: String,
}

/// Stock bucket used for filtering and badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockState {
    InStock,
    LowStock,
    OutOfStock,
}

impl StockState {
    pub const ALL: [Self; 3] = [Self::InStock, Self::LowStock, Self::OutOfStock];

    /// Classify a total stock level.
    #[must_use]
    pub const fn from_stock(stock: i64) -> Self {
        if stock <= 0 {
            Self::OutOfStock
        } else if stock <= LOW_STOCK_THRESHOLD {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in_stock",
            Self::LowStock => "low_stock",
            Self::OutOfStock => "out_of_stock",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InStock => "In stock",
            Self::LowStock => "Low stock",
            Self::OutOfStock => "Out of stock",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

/// Row in the products table.
#[derive(Debug, Clone)]
pub struct ProductListItem {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub category_name: String,
    pub manufacturer_name: String,
    pub min_price: Money,
    pub max_price: Money,
    pub total_stock: i64,
    pub variant_count: i64,
    pub requires_prescription: bool,
    pub is_featured: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

impl ProductListItem {
    #[must_use]
    pub const fn stock_state(&self) -> StockState {
        StockState::from_stock(self.total_stock)
    }
}

/// JSON search result for pickers.
#[derive(Debug, Clone, Serialize)]
pub struct ProductSearchHit {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub variant_id: VariantId,
    pub variant_name: String,
    pub price: Money,
    pub stock: i32,
}

/// Sortable product columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProductSort {
    Name,
    #[default]
    CreatedAt,
    Price,
    Stock,
}

impl ProductSort {
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("name") => Self::Name,
            Some("price") => Self::Price,
            Some("stock") => Self::Stock,
            _ => Self::CreatedAt,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::CreatedAt => "created_at",
            Self::Price => "price",
            Self::Stock => "stock",
        }
    }
}

/// Filters for the products table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    /// Matches product name or any variant SKU.
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub manufacturer_id: Option<ManufacturerId>,
    /// `None` shows active products only.
    pub archived: Option<bool>,
    pub stock: Option<StockState>,
}

/// Validated variant row from the product form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInput {
    pub name: String,
    pub sku: String,
    pub price: Money,
    pub stock: i32,
}

/// Validated product form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category_id: CategoryId,
    pub manufacturer_id: ManufacturerId,
    pub requires_prescription: bool,
    pub is_featured: bool,
    pub image_urls: Vec<String>,
    pub variants: Vec<VariantInput>,
}

/// Raw product form, collected from repeated form keys.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub manufacturer_id: Option<String>,
    pub requires_prescription: bool,
    pub is_featured: bool,
    pub image_urls: Vec<String>,
    pub variant_names: Vec<String>,
    pub variant_skus: Vec<String>,
    pub variant_prices: Vec<String>,
    pub variant_stocks: Vec<String>,
}

impl ProductForm {
    /// Collect a form from `application/x-www-form-urlencoded` pairs.
    ///
    /// Variant columns are posted as repeated keys (`variant_name`,
    /// `variant_sku`, ...) in row order.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => form.name = value,
                "slug" => form.slug = Some(value),
                "description" => form.description = Some(value),
                "category_id" => form.category_id = Some(value),
                "manufacturer_id" => form.manufacturer_id = Some(value),
                "requires_prescription" => form.requires_prescription = true,
                "is_featured" => form.is_featured = true,
                "image_url" => form.image_urls.push(value),
                "variant_name" => form.variant_names.push(value),
                "variant_sku" => form.variant_skus.push(value),
                "variant_price" => form.variant_prices.push(value),
                "variant_stock" => form.variant_stocks.push(value),
                _ => {}
            }
        }
        form
    }

    /// Validate into a `ProductInput`.
    ///
    /// Entirely blank variant rows (the empty row the form always renders)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<ProductInput, ValidationError> {
        let name = required("name", &self.name, 200)?;
        let slug = slugify(optional(self.slug.as_deref()).as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(ValidationError::new("slug", "must contain letters or digits"));
        }
        let category_id = parse_optional_id("category_id", self.category_id.as_deref())?
            .ok_or_else(|| ValidationError::new("category_id", "is required"))?;
        let manufacturer_id = parse_optional_id("manufacturer_id", self.manufacturer_id.as_deref())?
            .ok_or_else(|| ValidationError::new("manufacturer_id", "is required"))?;

        let image_urls = self
            .image_urls
            .iter()
            .filter_map(|u| optional(Some(u)))
            .map(|u| {
                url::Url::parse(&u)
                    .ok()
                    .filter(|p| matches!(p.scheme(), "http" | "https"))
                    .map(|_| u)
                    .ok_or_else(|| ValidationError::new("image_url", "must be an http(s) URL"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self.variant_names.len();
        if self.variant_skus.len() != rows
            || self.variant_prices.len() != rows
            || self.variant_stocks.len() != rows
        {
            return Err(ValidationError::new("variants", "variant rows are incomplete"));
        }

        let mut variants = Vec::with_capacity(rows);
        let mut skus = HashSet::new();
        for (((vname, sku), price), stock) in self
            .variant_names
            .iter()
            .zip(&self.variant_skus)
            .zip(&self.variant_prices)
            .zip(&self.variant_stocks)
        {
            if [vname, sku, price, stock].iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            let variant = VariantInput {
                name: required("variant_name", vname, 100)?,
                sku: required("variant_sku", sku, 64)?.to_uppercase(),
                price: pharmacy_core::Money::parse(price)
                    .ok_or_else(|| ValidationError::new("variant_price", "must be a valid price"))?,
                stock: stock
                    .trim()
                    .parse::<i32>()
                    .ok()
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| {
                        ValidationError::new("variant_stock", "must be a whole number >= 0")
                    })?,
            };
            if !skus.insert(variant.sku.clone()) {
                return Err(ValidationError::new("variant_sku", "SKUs must be unique"));
            }
            variants.push(variant);
        }
        if variants.is_empty() {
            return Err(ValidationError::new("variants", "at least one variant is required"));
        }

        Ok(ProductInput {
            name,
            slug,
            description: self.description.as_deref().unwrap_or("").trim().to_string(),
            category_id,
            manufacturer_id,
            requires_prescription: self.requires_prescription,
            is_featured: self.is_featured,
            image_urls,
            variants,
        })
    }
}

/// Parse an optional numeric ID from a select input (blank means none).
fn parse_optional_id<T: std::str::FromStr>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, ValidationError> {
    optional(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| ValidationError::new(field, "is not a valid selection"))
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn category(id: i32, name: &str, parent: Option<i32>) -> Category {
        Category {
            id: CategoryId::new(id),
            name: name.to_string(),
            slug: slugify(name),
            parent_id: parent.map(CategoryId::new),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_flatten_tree_depth_first_sorted() {
        let categories = vec![
            category(1, "Vitamins", None),
            category(2, "Pain Relief", None),
            category(3, "Vitamin D", Some(1)),
            category(4, "Headache", Some(2)),
            category(5, "B Complex", Some(1)),
            category(6, "Migraine", Some(4)),
        ];
        let mut counts = HashMap::new();
        counts.insert(CategoryId::new(6), 4);

        let flat = flatten_tree(categories, &counts);
        let names: Vec<(&str, usize)> = flat
            .iter()
            .map(|n| (n.category.name.as_str(), n.depth))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Pain Relief", 0),
                ("Headache", 1),
                ("Migraine", 2),
                ("Vitamins", 0),
                ("B Complex", 1),
                ("Vitamin D", 1),
            ]
        );
        assert_eq!(flat.get(2).unwrap().product_count, 4);
    }

    #[test]
    fn test_flatten_tree_orphans_become_roots() {
        let flat = flatten_tree(vec![category(7, "Orphan", Some(99))], &HashMap::new());
        assert_eq!(flat.len(), 1);
        assert_eq!(flat.first().unwrap().depth, 0);
    }

    #[test]
    fn test_cycle_detection() {
        // 1 -> 2 -> 3 (3 is the deepest)
        let parents: HashMap<CategoryId, Option<CategoryId>> = [
            (CategoryId::new(1), None),
            (CategoryId::new(2), Some(CategoryId::new(1))),
            (CategoryId::new(3), Some(CategoryId::new(2))),
            (CategoryId::new(4), None),
        ]
        .into_iter()
        .collect();

        assert!(would_create_cycle(&parents, CategoryId::new(1), CategoryId::new(1)));
        assert!(would_create_cycle(&parents, CategoryId::new(1), CategoryId::new(3)));
        assert!(!would_create_cycle(&parents, CategoryId::new(3), CategoryId::new(4)));
        assert!(!would_create_cycle(&parents, CategoryId::new(2), CategoryId::new(1)));
    }

    #[test]
    fn test_category_input_derives_slug() {
        let input = CategoryInput::parse(" Cold & Flu ", Some(""), Some("3")).unwrap();
        assert_eq!(input.slug, "cold-flu");
        assert_eq!(input.parent_id, Some(CategoryId::new(3)));
        assert!(CategoryInput::parse("Cold", None, Some("abc")).is_err());
    }

    #[test]
    fn test_manufacturer_website_must_be_http() {
        assert!(ManufacturerInput::parse("Bayer", Some("https://bayer.com")).is_ok());
        assert!(ManufacturerInput::parse("Bayer", Some("javascript:alert(1)")).is_err());
        assert_eq!(ManufacturerInput::parse("Bayer", Some(" ")).unwrap().website, None);
    }

    #[test]
    fn test_stock_state_thresholds() {
        assert_eq!(StockState::from_stock(0), StockState::OutOfStock);
        assert_eq!(StockState::from_stock(10), StockState::LowStock);
        assert_eq!(StockState::from_stock(11), StockState::InStock);
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_product_form_collects_variants() {
        let form = ProductForm::from_pairs(pairs(&[
            ("name", "Ibuprofen 200mg"),
            ("category_id", "2"),
            ("manufacturer_id", "5"),
            ("requires_prescription", "on"),
            ("variant_name", "24 tablets"),
            ("variant_sku", "ibu-24"),
            ("variant_price", "4.99"),
            ("variant_stock", "40"),
            ("variant_name", ""),
            ("variant_sku", ""),
            ("variant_price", ""),
            ("variant_stock", ""),
        ]));
        let input = form.validate().unwrap();
        assert_eq!(input.slug, "ibuprofen-200mg");
        assert!(input.requires_prescription);
        assert_eq!(input.variants.len(), 1);
        let variant = input.variants.first().unwrap();
        assert_eq!(variant.sku, "IBU-24");
        assert_eq!(variant.price.amount(), Decimal::new(499, 2));
    }

    #[test]
    fn test_product_form_requires_a_variant() {
        let form = ProductForm::from_pairs(pairs(&[
            ("name", "Ibuprofen"),
            ("category_id", "2"),
            ("manufacturer_id", "5"),
        ]));
        assert_eq!(form.validate().unwrap_err().field, "variants");
    }

    #[test]
    fn test_product_form_rejects_duplicate_skus_and_bad_prices() {
        let dup = ProductForm::from_pairs(pairs(&[
            ("name", "Ibuprofen"),
            ("category_id", "2"),
            ("manufacturer_id", "5"),
            ("variant_name", "A"),
            ("variant_sku", "X1"),
            ("variant_price", "1"),
            ("variant_stock", "1"),
            ("variant_name", "B"),
            ("variant_sku", "x1"),
            ("variant_price", "1"),
            ("variant_stock", "1"),
        ]));
        assert_eq!(dup.validate().unwrap_err().field, "variant_sku");

        let bad_price = ProductForm::from_pairs(pairs(&[
            ("name", "Ibuprofen"),
            ("category_id", "2"),
            ("manufacturer_id", "5"),
            ("variant_name", "A"),
            ("variant_sku", "X1"),
            ("variant_price", "-3"),
            ("variant_stock", "1"),
        ]));
        assert_eq!(bad_price.validate().unwrap_err().field, "variant_price");
    }
}
