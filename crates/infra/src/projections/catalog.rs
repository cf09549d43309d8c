use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use harvest_catalog::{Product, ProductId, Variant, VariantId};
use harvest_events::EventEnvelope;

use super::{ProjectionError, SnapshotProjection};
use crate::event_store::StoredEvent;

pub const PRODUCT_AGGREGATE_TYPE: &str = "catalog.product";

/// Product snapshots plus a variant → product index, so variant routes
/// (`/api/variants/:id`) resolve without scanning the catalog.
#[derive(Debug)]
pub struct CatalogProjection {
    products: SnapshotProjection<Product>,
    variant_index: RwLock<HashMap<VariantId, ProductId>>,
}

impl Default for CatalogProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogProjection {
    pub fn new() -> Self {
        Self {
            products: SnapshotProjection::in_memory(PRODUCT_AGGREGATE_TYPE, |id| {
                Product::empty(ProductId::new(id))
            }),
            variant_index: RwLock::new(HashMap::new()),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if let Some(product) = self.products.apply_envelope(envelope)? {
            self.index(&product);
        }
        Ok(())
    }

    pub fn apply_committed(&self, committed: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in committed {
            self.apply_envelope(&stored.to_envelope())?;
        }
        Ok(())
    }

    fn index(&self, product: &Product) {
        if let Ok(mut index) = self.variant_index.write() {
            for variant in product.all_variants() {
                index.insert(variant.id, product.id_typed());
            }
        }
    }

    /// Product by id, deleted ones included.
    pub fn product(&self, id: ProductId) -> Option<Product> {
        self.products.get(id.0)
    }

    /// Non-deleted product by id.
    pub fn live_product(&self, id: ProductId) -> Option<Product> {
        self.product(id).filter(|p| !p.is_deleted())
    }

    /// Non-deleted products in creation order.
    pub fn products(&self) -> Vec<Product> {
        self.products.list().into_iter().filter(|p| !p.is_deleted()).collect()
    }

    pub fn product_for_variant(&self, variant_id: VariantId) -> Option<Product> {
        let product_id = self.variant_index.read().ok()?.get(&variant_id).copied()?;
        self.product(product_id)
    }

    /// A variant together with its product. Deleted variants (and variants of
    /// deleted products) are not found.
    pub fn live_variant(&self, variant_id: VariantId) -> Option<(Product, Variant)> {
        let product = self.product_for_variant(variant_id).filter(|p| !p.is_deleted())?;
        let variant = product.variant(variant_id).filter(|v| !v.is_deleted())?.clone();
        Some((product, variant))
    }

    pub fn find_by_permalink(&self, permalink: &str) -> Option<Product> {
        self.products
            .list()
            .into_iter()
            .find(|p| p.permalink() == permalink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;
    use chrono::Utc;
    use harvest_catalog::{CreateProduct, ProductCommand, SoftDeleteVariant, UnitSettings};
    use harvest_core::AggregateId;
    use harvest_enterprises::EnterpriseId;

    fn make(id: AggregateId) -> Product {
        Product::empty(ProductId::new(id))
    }

    fn create(dispatcher: &CommandDispatcher<InMemoryEventStore>, catalog: &CatalogProjection) -> (ProductId, VariantId) {
        let id = ProductId::new(AggregateId::new());
        let variant_id = VariantId::new();
        let committed = dispatcher
            .dispatch(
                id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::Create(CreateProduct {
                    product_id: id,
                    name: "Kale".to_string(),
                    description: String::new(),
                    permalink: "kale".to_string(),
                    supplier: EnterpriseId::new(AggregateId::new()),
                    units: UnitSettings::weight(1000.0),
                    master_variant_id: VariantId::new(),
                    variant_id,
                    sku: "KALE".to_string(),
                    price: Some(350),
                    cost_price: None,
                    unit_value: Some(1.0),
                    unit_description: String::new(),
                    on_hand: 10,
                    on_demand: false,
                    image: None,
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap();
        catalog.apply_committed(&committed).unwrap();
        (id, variant_id)
    }

    #[test]
    fn variants_resolve_to_their_product() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let catalog = CatalogProjection::new();
        let (id, variant_id) = create(&dispatcher, &catalog);

        let (product, variant) = catalog.live_variant(variant_id).unwrap();
        assert_eq!(product.id_typed(), id);
        assert!(!variant.is_master);
        assert_eq!(catalog.find_by_permalink("kale").unwrap().id_typed(), id);
        assert!(catalog.live_variant(VariantId::new()).is_none());
    }

    #[test]
    fn deleted_variants_are_hidden() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let catalog = CatalogProjection::new();
        let (id, variant_id) = create(&dispatcher, &catalog);

        let committed = dispatcher
            .dispatch(
                id.0,
                PRODUCT_AGGREGATE_TYPE,
                ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
                    product_id: id,
                    variant_id,
                    guard: false,
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap();
        catalog.apply_committed(&committed).unwrap();

        assert!(catalog.live_variant(variant_id).is_none());
        assert!(catalog.product_for_variant(variant_id).is_some());
    }
}
