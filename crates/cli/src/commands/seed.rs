//! Development seed data.
//!
//! Loads a YAML catalog (categories, manufacturers, products, discount codes
//! and customers) through the admin repositories, then generates sample
//! orders spread over the last 90 days so the dashboard has data to chart.
//!
//! Re-running is safe: rows that already exist are reused, and orders are
//! generated from a fixed seed.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use pharmacy_admin::db::{
    CategoryRepository, DiscountRepository, ManufacturerRepository, ProductRepository,
    RepositoryError, UserRepository,
};
use pharmacy_admin::models::ValidationError;
use pharmacy_admin::models::catalog::{CategoryInput, ManufacturerInput, ProductForm};
use pharmacy_admin::models::discount::DiscountForm;
use pharmacy_admin::models::user::NewUser;
use pharmacy_core::{CategoryId, Email, ManufacturerId, OrderStatus, UserId, UserRole};

/// Orders are spread over this many days before now.
const ORDER_WINDOW_DAYS: i64 = 90;

/// RNG seed for generated orders.
const ORDER_SEED: u64 = 0x5eed_0001;

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid {what} '{name}': {source}")]
    Invalid {
        what: &'static str,
        name: String,
        source: ValidationError,
    },

    #[error("Unknown {what} '{name}' referenced by '{by}'")]
    UnknownReference {
        what: &'static str,
        name: String,
        by: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    categories: Vec<SeedCategory>,
    #[serde(default)]
    manufacturers: Vec<SeedManufacturer>,
    #[serde(default)]
    products: Vec<SeedProduct>,
    #[serde(default)]
    discounts: Vec<SeedDiscount>,
    #[serde(default)]
    customers: Vec<SeedCustomer>,
}

#[derive(Debug, Deserialize)]
struct SeedCategory {
    name: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedManufacturer {
    name: String,
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedProduct {
    name: String,
    category: String,
    manufacturer: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    requires_prescription: bool,
    #[serde(default)]
    featured: bool,
    #[serde(default)]
    images: Vec<String>,
    variants: Vec<SeedVariant>,
}

#[derive(Debug, Deserialize)]
struct SeedVariant {
    name: String,
    sku: String,
    price: String,
    stock: i32,
}

#[derive(Debug, Deserialize)]
struct SeedDiscount {
    code: String,
    kind: String,
    value: String,
    #[serde(default)]
    min_order_total: Option<String>,
    #[serde(default)]
    max_uses: Option<i32>,
    #[serde(default = "default_true")]
    active: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SeedCustomer {
    name: String,
    email: String,
    #[serde(default)]
    city: Option<String>,
}

/// Seed the database from `path` and generate `orders` sample orders.
///
/// # Errors
///
/// Returns `SeedError` if the file is unreadable or invalid, or a write
/// fails for a reason other than the row already existing.
pub async fn run(pool: &PgPool, path: &str, orders: u32) -> Result<(), SeedError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: path.to_owned(),
        source,
    })?;
    let file: SeedFile = serde_yaml::from_str(&raw)?;

    let categories = seed_categories(pool, &file.categories).await?;
    let manufacturers = seed_manufacturers(pool, &file.manufacturers).await?;
    seed_products(pool, &file.products, &categories, &manufacturers).await?;
    seed_discounts(pool, &file.discounts).await?;
    let customers = seed_customers(pool, &file.customers).await?;

    if orders > 0 {
        generate_orders(pool, &customers, orders).await?;
    }

    tracing::info!("Seed complete");
    Ok(())
}

/// Insert categories, parents before children. Existing slugs are reused.
async fn seed_categories(
    pool: &PgPool,
    seeds: &[SeedCategory],
) -> Result<HashMap<String, CategoryId>, SeedError> {
    let repo = CategoryRepository::new(pool);
    let mut by_slug: HashMap<String, CategoryId> = repo
        .list_all()
        .await?
        .into_iter()
        .map(|c| (c.slug, c.id))
        .collect();
    let mut by_name = HashMap::new();
    let mut created = 0_usize;

    for seed in seeds {
        let parent_id = match &seed.parent {
            Some(parent) => Some(*by_name.get(parent).ok_or_else(|| SeedError::UnknownReference {
                what: "category",
                name: parent.clone(),
                by: seed.name.clone(),
            })?),
            None => None,
        };
        let parent_param = parent_id.map(|id: CategoryId| id.to_string());
        let input = CategoryInput::parse(&seed.name, None, parent_param.as_deref()).map_err(
            |source| SeedError::Invalid {
                what: "category",
                name: seed.name.clone(),
                source,
            },
        )?;

        let id = if let Some(id) = by_slug.get(&input.slug) {
            *id
        } else {
            let category = repo.create(&input).await?;
            created += 1;
            by_slug.insert(category.slug, category.id);
            category.id
        };
        by_name.insert(seed.name.clone(), id);
    }

    tracing::info!(created, total = seeds.len(), "Seeded categories");
    Ok(by_name)
}

async fn seed_manufacturers(
    pool: &PgPool,
    seeds: &[SeedManufacturer],
) -> Result<HashMap<String, ManufacturerId>, SeedError> {
    let repo = ManufacturerRepository::new(pool);
    let mut by_name: HashMap<String, ManufacturerId> = repo
        .list()
        .await?
        .into_iter()
        .map(|m| (m.manufacturer.name, m.manufacturer.id))
        .collect();
    let mut created = 0_usize;

    for seed in seeds {
        if by_name.contains_key(&seed.name) {
            continue;
        }
        let input = ManufacturerInput::parse(&seed.name, seed.website.as_deref()).map_err(
            |source| SeedError::Invalid {
                what: "manufacturer",
                name: seed.name.clone(),
                source,
            },
        )?;
        let manufacturer = repo.create(&input).await?;
        created += 1;
        by_name.insert(seed.name.clone(), manufacturer.id);
    }

    tracing::info!(created, total = seeds.len(), "Seeded manufacturers");
    Ok(by_name)
}

async fn seed_products(
    pool: &PgPool,
    seeds: &[SeedProduct],
    categories: &HashMap<String, CategoryId>,
    manufacturers: &HashMap<String, ManufacturerId>,
) -> Result<(), SeedError> {
    let repo = ProductRepository::new(pool);
    let mut created = 0_usize;

    for seed in seeds {
        let category_id = categories
            .get(&seed.category)
            .ok_or_else(|| SeedError::UnknownReference {
                what: "category",
                name: seed.category.clone(),
                by: seed.name.clone(),
            })?;
        let manufacturer_id =
            manufacturers
                .get(&seed.manufacturer)
                .ok_or_else(|| SeedError::UnknownReference {
                    what: "manufacturer",
                    name: seed.manufacturer.clone(),
                    by: seed.name.clone(),
                })?;

        let form = ProductForm {
            name: seed.name.clone(),
            slug: None,
            description: Some(seed.description.clone()),
            category_id: Some(category_id.to_string()),
            manufacturer_id: Some(manufacturer_id.to_string()),
            requires_prescription: seed.requires_prescription,
            is_featured: seed.featured,
            image_urls: seed.images.clone(),
            variant_names: seed.variants.iter().map(|v| v.name.clone()).collect(),
            variant_skus: seed.variants.iter().map(|v| v.sku.clone()).collect(),
            variant_prices: seed.variants.iter().map(|v| v.price.clone()).collect(),
            variant_stocks: seed.variants.iter().map(|v| v.stock.to_string()).collect(),
        };
        let input = form.validate().map_err(|source| SeedError::Invalid {
            what: "product",
            name: seed.name.clone(),
            source,
        })?;

        match repo.create(&input).await {
            Ok(_) => created += 1,
            Err(RepositoryError::Conflict(_)) => {
                tracing::debug!(product = %seed.name, "Product exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(created, total = seeds.len(), "Seeded products");
    Ok(())
}

async fn seed_discounts(pool: &PgPool, seeds: &[SeedDiscount]) -> Result<(), SeedError> {
    let repo = DiscountRepository::new(pool);
    let mut created = 0_usize;

    for seed in seeds {
        let form = DiscountForm {
            code: seed.code.clone(),
            kind: seed.kind.clone(),
            value: seed.value.clone(),
            min_order_total: seed.min_order_total.clone(),
            max_uses: seed.max_uses.map(|n| n.to_string()),
            starts_at: None,
            expires_at: None,
            is_active: seed.active.then(|| "on".to_owned()),
        };
        let input = form.validate().map_err(|source| SeedError::Invalid {
            what: "discount",
            name: seed.code.clone(),
            source,
        })?;

        match repo.create(&input).await {
            Ok(_) => created += 1,
            Err(RepositoryError::Conflict(_)) => {
                tracing::debug!(code = %seed.code, "Discount code exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(created, total = seeds.len(), "Seeded discount codes");
    Ok(())
}

/// Customer accounts have no password; they are pre-verified and exist to
/// own orders.
async fn seed_customers(
    pool: &PgPool,
    seeds: &[SeedCustomer],
) -> Result<Vec<(UserId, String, String)>, SeedError> {
    let repo = UserRepository::new(pool);
    let mut customers = Vec::with_capacity(seeds.len());
    let mut created = 0_usize;

    for seed in seeds {
        let email = Email::parse(&seed.email).map_err(|e| SeedError::Invalid {
            what: "customer",
            name: seed.email.clone(),
            source: ValidationError::new("email", e.to_string()),
        })?;
        let city = seed.city.clone().unwrap_or_else(|| "Springfield".to_owned());

        let id = if let Some(user) = repo.get_by_email(&email).await? {
            user.id
        } else {
            let user = repo
                .create(&NewUser {
                    name: seed.name.clone(),
                    email,
                    password_hash: None,
                    image: None,
                    role: UserRole::User,
                    email_verified: true,
                })
                .await?;
            created += 1;
            user.id
        };
        customers.push((id, seed.name.clone(), city));
    }

    tracing::info!(created, total = seeds.len(), "Seeded customers");
    Ok(customers)
}

/// Pick an order status, weighted toward completed orders the older they are.
fn pick_status(rng: &mut StdRng, age_days: i64) -> OrderStatus {
    let roll = rng.random_range(0..100);
    if age_days > 14 {
        match roll {
            0..8 => OrderStatus::Cancelled,
            8..15 => OrderStatus::Shipped,
            _ => OrderStatus::Delivered,
        }
    } else {
        match roll {
            0..25 => OrderStatus::Pending,
            25..50 => OrderStatus::Processing,
            50..75 => OrderStatus::Shipped,
            75..95 => OrderStatus::Delivered,
            _ => OrderStatus::Cancelled,
        }
    }
}

async fn generate_orders(
    pool: &PgPool,
    customers: &[(UserId, String, String)],
    count: u32,
) -> Result<(), SeedError> {
    let variants: Vec<(i32, Decimal)> =
        sqlx::query_as("SELECT id, price FROM rx.product_variant ORDER BY id")
            .fetch_all(pool)
            .await?;
    if variants.is_empty() || customers.is_empty() {
        tracing::warn!("No variants or customers to build orders from, skipping orders");
        return Ok(());
    }

    let mut rng = StdRng::seed_from_u64(ORDER_SEED);
    let now = Utc::now();

    for n in 0..count {
        let Some((user_id, name, city)) = customers.get(rng.random_range(0..customers.len()))
        else {
            continue;
        };
        let minutes_ago = rng.random_range(0..ORDER_WINDOW_DAYS * 24 * 60);
        let created_at = now - Duration::minutes(minutes_ago);
        let status = pick_status(&mut rng, minutes_ago / (24 * 60));

        let line_count = rng.random_range(1..=3);
        let mut lines = Vec::with_capacity(line_count);
        for _ in 0..line_count {
            if let Some(&(variant_id, price)) = variants.get(rng.random_range(0..variants.len())) {
                lines.push((variant_id, rng.random_range(1..=3_i32), price));
            }
        }
        let subtotal: Decimal = lines
            .iter()
            .map(|(_, qty, price)| price * Decimal::from(*qty))
            .sum();

        let mut tx = pool.begin().await?;
        let (order_id,): (i32,) = sqlx::query_as(
            r"
            INSERT INTO rx.customer_order
                (user_id, status, subtotal, discount_total, total,
                 shipping_name, shipping_address, shipping_city, shipping_postal_code,
                 created_at, updated_at)
            VALUES ($1, $2::rx.order_status, $3, 0, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            ",
        )
        .bind(user_id.as_i32())
        .bind(status.as_str())
        .bind(subtotal)
        .bind(name)
        .bind(format!("{} Main Street", 100 + n))
        .bind(city)
        .bind(format!("{:05}", 10_000 + n % 90_000))
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await?;

        for (variant_id, quantity, price) in &lines {
            sqlx::query(
                r"
                INSERT INTO rx.order_detail (order_id, product_variant_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(order_id)
            .bind(variant_id)
            .bind(quantity)
            .bind(price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
    }

    tracing::info!(count, "Generated sample orders");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_file_parses() {
        let yaml = r#"
categories:
  - name: Pain Relief
  - name: Headache
    parent: Pain Relief
manufacturers:
  - name: Acme Pharma
products:
  - name: Ibuprofen
    category: Headache
    manufacturer: Acme Pharma
    variants:
      - { name: "200mg x 24", sku: IBU-200-24, price: "5.99", stock: 40 }
discounts:
  - { code: WELCOME10, kind: percentage, value: "10" }
"#;
        let file: SeedFile = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(file.categories.len(), 2);
        assert_eq!(file.categories[1].parent.as_deref(), Some("Pain Relief"));
        assert_eq!(file.products[0].variants[0].stock, 40);
        assert!(file.discounts[0].active);
        assert!(file.customers.is_empty());
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let raw = include_str!("../../seed/catalog.yaml");
        let file: SeedFile = serde_yaml::from_str(raw).expect("bundled catalog parses");
        assert!(!file.products.is_empty());
        for product in &file.products {
            assert!(
                file.categories.iter().any(|c| c.name == product.category),
                "{} has an unknown category",
                product.name
            );
            assert!(
                file.manufacturers.iter().any(|m| m.name == product.manufacturer),
                "{} has an unknown manufacturer",
                product.name
            );
        }
    }

    #[test]
    fn test_old_orders_are_settled() {
        let mut rng = StdRng::seed_from_u64(ORDER_SEED);
        for _ in 0..200 {
            let status = pick_status(&mut rng, 30);
            assert!(matches!(
                status,
                OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Cancelled
            ));
        }
    }
}
