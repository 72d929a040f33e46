//! Tagged query cache.
//!
//! List pages and the dashboard are cached in a `moka` cache keyed by the
//! revalidation tag plus a string describing the query. Mutations call
//! [`QueryCache::revalidate`] with every tag whose results they may have
//! changed.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, warn};

use pharmacy_core::Page;

use crate::models::catalog::{CategoryTreeNode, ManufacturerListItem, ProductListItem};
use crate::models::dashboard::DashboardData;
use crate::models::discount::DiscountCode;
use crate::models::order::OrderListItem;
use crate::models::user::UserListItem;

/// Revalidation tag attached to every cached entry.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheTag {
    Products,
    Categories,
    Manufacturers,
    Orders,
    Users,
    Discounts,
    Dashboard,
}

impl CacheTag {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Categories => "categories",
            Self::Manufacturers => "manufacturers",
            Self::Orders => "orders",
            Self::Users => "users",
            Self::Discounts => "discounts",
            Self::Dashboard => "dashboard",
        }
    }
}

/// Cache key: the tag plus a description of the query.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub tag: CacheTag,
    pub query: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(tag: CacheTag, query: impl Into<String>) -> Self {
        Self {
            tag,
            query: query.into(),
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Arc<Page<ProductListItem>>),
    CategoryTree(Arc<Vec<CategoryTreeNode>>),
    Manufacturers(Arc<Vec<ManufacturerListItem>>),
    Orders(Arc<Page<OrderListItem>>),
    Users(Arc<Page<UserListItem>>),
    Discounts(Arc<Page<DiscountCode>>),
    Dashboard(Arc<DashboardData>),
}

/// Shared cache handle (cheap to clone).
#[derive(Clone)]
pub struct QueryCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl QueryCache {
    /// Create a cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            debug!(tag = key.tag.as_str(), query = %key.query, "Cache hit");
        }
        value
    }

    pub async fn insert(&self, key: CacheKey, value: CacheValue) {
        self.cache.insert(key, value).await;
    }

    /// Drop every entry carrying `tag`.
    pub fn revalidate(&self, tag: CacheTag) {
        debug!(tag = tag.as_str(), "Revalidating cache tag");
        if let Err(e) = self.cache.invalidate_entries_if(move |key, _| key.tag == tag) {
            warn!(tag = tag.as_str(), error = %e, "Tag invalidation failed, clearing cache");
            self.cache.invalidate_all();
        }
    }

    /// Revalidate several tags at once.
    pub fn revalidate_many(&self, tags: &[CacheTag]) {
        for tag in tags {
            self.revalidate(*tag);
        }
    }

    /// Drop everything.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    #[cfg(test)]
    async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmacy_core::PageRequest;

    fn orders_page() -> CacheValue {
        CacheValue::Orders(Arc::new(Page::new(vec![], 0, PageRequest::default())))
    }

    #[tokio::test]
    async fn test_revalidate_drops_only_matching_tag() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let orders = CacheKey::new(CacheTag::Orders, "page=1");
        let dashboard = CacheKey::new(CacheTag::Dashboard, "30d");

        cache.insert(orders.clone(), orders_page()).await;
        cache
            .insert(dashboard.clone(), CacheValue::Manufacturers(Arc::new(vec![])))
            .await;

        cache.revalidate(CacheTag::Orders);
        cache.sync().await;

        assert!(cache.get(&orders).await.is_none());
        assert!(cache.get(&dashboard).await.is_some());
    }

    #[tokio::test]
    async fn test_same_query_under_different_tags_is_distinct() {
        let cache = QueryCache::new(Duration::from_secs(60));
        cache
            .insert(CacheKey::new(CacheTag::Orders, "q"), orders_page())
            .await;

        assert!(cache.get(&CacheKey::new(CacheTag::Users, "q")).await.is_none());
        assert!(matches!(
            cache.get(&CacheKey::new(CacheTag::Orders, "q")).await,
            Some(CacheValue::Orders(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = CacheKey::new(CacheTag::Orders, "page=2");
        cache.insert(key.clone(), orders_page()).await;

        cache.invalidate_all().await;
        assert!(cache.get(&key).await.is_none());
    }
}
