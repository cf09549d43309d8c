//! Storefront cache invalidation hook.
//!
//! Deleting a variant changes what shopfronts list for its product; the cache
//! collaborator is told so it can refresh that product's entries.

use std::sync::{Arc, RwLock};

use harvest_catalog::{ProductId, Variant};

pub trait ProductsCache: Send + Sync {
    fn variant_destroyed(&self, product_id: ProductId, variant: &Variant);
}

impl<C> ProductsCache for Arc<C>
where
    C: ProductsCache + ?Sized,
{
    fn variant_destroyed(&self, product_id: ProductId, variant: &Variant) {
        (**self).variant_destroyed(product_id, variant)
    }
}

/// Records which products went stale.
#[derive(Debug, Default)]
pub struct InMemoryProductsCache {
    stale: RwLock<Vec<ProductId>>,
}

impl InMemoryProductsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_products(&self) -> Vec<ProductId> {
        self.stale.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ProductsCache for InMemoryProductsCache {
    fn variant_destroyed(&self, product_id: ProductId, variant: &Variant) {
        tracing::debug!(product_id = %product_id, variant_id = %variant.id, "products cache: variant destroyed");
        if let Ok(mut stale) = self.stale.write() {
            if !stale.contains(&product_id) {
                stale.push(product_id);
            }
        }
    }
}
