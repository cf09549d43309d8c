//! Integration tests for the event-sourced catalog pipeline.
//!
//! Tests: Command → EventStore → Projection → Search
//!
//! Verifies:
//! - committed product events keep the catalog read model and variant index current
//! - a projection rebuilt from the stored stream matches the incremental one
//! - concurrent writers on one stream conflict instead of interleaving

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use harvest_catalog::{
        AddVariant, CreateProduct, Product, ProductCommand, ProductId, SoftDeleteVariant, UnitSettings,
        VariantChanges, VariantId,
    };
    use harvest_core::{AggregateId, ExpectedVersion};
    use harvest_enterprises::EnterpriseId;

    use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
    use crate::projections::{CatalogProjection, PRODUCT_AGGREGATE_TYPE};
    use crate::search::{paginate, Page, VariantSearch};
    use crate::{CommandDispatcher, DispatchError, SnapshotProjection};

    fn make(id: AggregateId) -> Product {
        Product::empty(ProductId::new(id))
    }

    fn create(product_id: ProductId, name: &str, sku: &str) -> (ProductCommand, VariantId) {
        let variant_id = VariantId::new();
        let cmd = ProductCommand::Create(CreateProduct {
            product_id,
            name: name.to_string(),
            description: String::new(),
            permalink: String::new(),
            supplier: EnterpriseId::new(AggregateId::new()),
            units: UnitSettings::weight(1000.0),
            master_variant_id: VariantId::new(),
            variant_id,
            sku: sku.to_string(),
            price: Some(450),
            cost_price: None,
            unit_value: Some(500.0),
            unit_description: String::new(),
            on_hand: 10,
            on_demand: false,
            image: None,
            occurred_at: Utc::now(),
        });
        (cmd, variant_id)
    }

    fn add_variant(product_id: ProductId, unit_value: f64) -> (ProductCommand, VariantId) {
        let variant_id = VariantId::new();
        let cmd = ProductCommand::AddVariant(AddVariant {
            product_id,
            variant_id,
            changes: VariantChanges {
                unit_value: Some(unit_value),
                ..Default::default()
            },
            occurred_at: Utc::now(),
        });
        (cmd, variant_id)
    }

    #[test]
    fn catalog_follows_product_commands() {
        let dispatcher = CommandDispatcher::new(Arc::new(InMemoryEventStore::new()));
        let catalog = CatalogProjection::new();

        let product_id = ProductId::new(AggregateId::new());
        let (cmd, first) = create(product_id, "Carrots", "CARROT");
        let committed = dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap();
        catalog.apply_committed(&committed).unwrap();

        let (cmd, second) = add_variant(product_id, 1000.0);
        let committed = dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap();
        catalog.apply_committed(&committed).unwrap();

        let (product, variant) = catalog.live_variant(second).unwrap();
        assert_eq!(product.id_typed(), product_id);
        assert_eq!(variant.unit_value, Some(1000.0));

        let cmd = ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
            product_id,
            variant_id: first,
            guard: true,
            occurred_at: Utc::now(),
        });
        let committed = dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap();
        catalog.apply_committed(&committed).unwrap();

        assert!(catalog.live_variant(first).is_none());
        assert_eq!(catalog.product_for_variant(first).map(|p| p.id_typed()), Some(product_id));

        let search = VariantSearch::from_params([("q[is_master_eq]", "false")]);
        let live: Vec<_> = catalog
            .products()
            .into_iter()
            .flat_map(|p| {
                p.live_variants()
                    .filter(|v| search.matches(&p, v))
                    .map(|v| v.id)
                    .collect::<Vec<_>>()
            })
            .collect();
        let page = paginate(live, Page::default());
        assert_eq!(page.items, vec![second]);
        assert_eq!(page.pages, 1);
    }

    #[test]
    fn rebuilt_projection_matches_incremental_one() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone());
        let incremental: SnapshotProjection<Product> = SnapshotProjection::in_memory(PRODUCT_AGGREGATE_TYPE, make);

        let product_id = ProductId::new(AggregateId::new());
        let (cmd, _) = create(product_id, "Beets", "BEET");
        incremental
            .apply_committed(&dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap())
            .unwrap();
        for unit_value in [250.0, 750.0] {
            let (cmd, _) = add_variant(product_id, unit_value);
            incremental
                .apply_committed(&dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap())
                .unwrap();
        }

        let rebuilt: SnapshotProjection<Product> = SnapshotProjection::in_memory(PRODUCT_AGGREGATE_TYPE, make);
        let mut stream = store.load_stream(product_id.0).unwrap();
        stream.reverse();
        rebuilt
            .rebuild_from_scratch(stream.iter().map(|e| e.to_envelope()))
            .unwrap();

        let a = incremental.get(product_id.0).unwrap();
        let b = rebuilt.get(product_id.0).unwrap();
        assert_eq!(a.standard_variants().count(), 3);
        assert_eq!(
            a.all_variants().iter().map(|v| v.id).collect::<Vec<_>>(),
            b.all_variants().iter().map(|v| v.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn stale_writers_conflict() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone());

        let product_id = ProductId::new(AggregateId::new());
        let (cmd, _) = create(product_id, "Peas", "PEA");
        let committed = dispatcher.dispatch(product_id.0, PRODUCT_AGGREGATE_TYPE, cmd, make).unwrap();

        // A writer that loaded the stream before the create was committed.
        let stale = UncommittedEvent {
            event_id: uuid::Uuid::now_v7(),
            aggregate_id: product_id.0,
            aggregate_type: PRODUCT_AGGREGATE_TYPE.to_string(),
            event_type: committed[0].event_type.clone(),
            event_version: committed[0].event_version,
            occurred_at: Utc::now(),
            payload: committed[0].payload.clone(),
        };
        let err = store.append(vec![stale], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(DispatchError::from(err), DispatchError::Concurrency(_)));
    }
}
