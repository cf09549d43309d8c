use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::{Aggregate, AggregateId, AggregateRoot, DomainError, FieldErrors, slugify};
use harvest_enterprises::EnterpriseId;
use harvest_events::Event;

use crate::image::{Image, ImageId};
use crate::property::PropertyId;
use crate::units::UnitSettings;
use crate::variant::{Variant, VariantChanges, VariantId};

pub const AT_LEAST_ONE_VARIANT: &str = "must have at least one variant";

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A property value attached to a product (`Origin: Tasmania`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductProperty {
    pub property_id: PropertyId,
    pub name: String,
    pub value: String,
}

/// Aggregate root: Product, with its variants and their images.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    id: ProductId,
    name: String,
    description: String,
    permalink: String,
    supplier: Option<EnterpriseId>,
    units: UnitSettings,
    properties: Vec<ProductProperty>,
    variants: Vec<Variant>,
    created_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            permalink: String::new(),
            supplier: None,
            units: UnitSettings::default(),
            properties: Vec::new(),
            variants: Vec::new(),
            created_at: None,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn permalink(&self) -> &str {
        &self.permalink
    }

    pub fn supplier(&self) -> Option<EnterpriseId> {
        self.supplier
    }

    pub fn units(&self) -> &UnitSettings {
        &self.units
    }

    pub fn properties(&self) -> &[ProductProperty] {
        &self.properties
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// All variants, master first, deleted ones included.
    pub fn all_variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn master(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.is_master)
    }

    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Non-deleted variants, master included.
    pub fn live_variants(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(|v| !v.is_deleted())
    }

    /// Non-deleted, non-master variants.
    pub fn standard_variants(&self) -> impl Iterator<Item = &Variant> {
        self.live_variants().filter(|v| !v.is_master)
    }

    /// Product images are the master variant's images.
    pub fn images(&self) -> &[Image] {
        self.master().map(|m| m.images.as_slice()).unwrap_or(&[])
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.is_deleted() {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn live_variant(&self, id: VariantId) -> Result<&Variant, DomainError> {
        self.variant(id)
            .filter(|v| !v.is_deleted())
            .ok_or(DomainError::NotFound)
    }

    fn master_price(&self) -> u64 {
        self.master().map(|m| m.price).unwrap_or(0)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: CreateProduct.
///
/// Builds the master variant (sku, price, image) and one standard variant
/// (unit value/description, stock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    /// Already made unique by the caller; derived from the name when blank.
    pub permalink: String,
    pub supplier: EnterpriseId,
    pub units: UnitSettings,
    pub master_variant_id: VariantId,
    pub variant_id: VariantId,
    pub sku: String,
    pub price: Option<u64>,
    pub cost_price: Option<u64>,
    pub unit_value: Option<f64>,
    pub unit_description: String,
    pub on_hand: i64,
    pub on_demand: bool,
    pub image: Option<Image>,
    pub occurred_at: DateTime<Utc>,
}

/// One entry of `variants_attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariantEdit {
    Update { variant_id: VariantId, changes: VariantChanges },
    Add { variant_id: VariantId, changes: VariantChanges },
}

/// Command: UpdateProduct.
///
/// Product attributes and variant edits are validated together against the
/// resulting state, so a unit change and the unit values it needs can arrive
/// in the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub units: Option<UnitSettings>,
    pub variants: Vec<VariantEdit>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddVariant {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub changes: VariantChanges,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateVariant {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub changes: VariantChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteVariant.
///
/// With `guard` set, removing the last live non-master variant is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteVariant {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub guard: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachImage {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub image: Image,
    pub occurred_at: DateTime<Utc>,
}

/// Swap the file behind an existing image; id and position are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceImage {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub image_id: ImageId,
    pub image: Image,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProperty {
    pub product_id: ProductId,
    pub property: ProductProperty,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductCommand {
    Create(CreateProduct),
    Update(UpdateProduct),
    Delete(DeleteProduct),
    AddVariant(AddVariant),
    UpdateVariant(UpdateVariant),
    SoftDeleteVariant(SoftDeleteVariant),
    AttachImage(AttachImage),
    ReplaceImage(ReplaceImage),
    SetProperty(SetProperty),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub permalink: String,
    pub supplier: EnterpriseId,
    pub units: UnitSettings,
    pub master: Variant,
    pub variant: Variant,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub units: UnitSettings,
    pub clear_unit_descriptions: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAdded {
    pub product_id: ProductId,
    pub variant: Variant,
    pub occurred_at: DateTime<Utc>,
}

/// Carries the full resulting variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantUpdated {
    pub product_id: ProductId,
    pub variant: Variant,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSoftDeleted {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub was_master: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttached {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub image: Image,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReplaced {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub image: Image,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet {
    pub product_id: ProductId,
    pub property: ProductProperty,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductEvent {
    Created(ProductCreated),
    Updated(ProductUpdated),
    Deleted(ProductDeleted),
    VariantAdded(VariantAdded),
    VariantUpdated(VariantUpdated),
    VariantSoftDeleted(VariantSoftDeleted),
    ImageAttached(ImageAttached),
    ImageReplaced(ImageReplaced),
    PropertySet(PropertySet),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Created(_) => "catalog.product.created",
            ProductEvent::Updated(_) => "catalog.product.updated",
            ProductEvent::Deleted(_) => "catalog.product.deleted",
            ProductEvent::VariantAdded(_) => "catalog.product.variant_added",
            ProductEvent::VariantUpdated(_) => "catalog.product.variant_updated",
            ProductEvent::VariantSoftDeleted(_) => "catalog.product.variant_soft_deleted",
            ProductEvent::ImageAttached(_) => "catalog.product.image_attached",
            ProductEvent::ImageReplaced(_) => "catalog.product.image_replaced",
            ProductEvent::PropertySet(_) => "catalog.product.property_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Created(e) => e.occurred_at,
            ProductEvent::Updated(e) => e.occurred_at,
            ProductEvent::Deleted(e) => e.occurred_at,
            ProductEvent::VariantAdded(e) => e.occurred_at,
            ProductEvent::VariantUpdated(e) => e.occurred_at,
            ProductEvent::VariantSoftDeleted(e) => e.occurred_at,
            ProductEvent::ImageAttached(e) => e.occurred_at,
            ProductEvent::ImageReplaced(e) => e.occurred_at,
            ProductEvent::PropertySet(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Create(cmd) => self.handle_create(cmd),
            ProductCommand::Update(cmd) => self.handle_update(cmd),
            ProductCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![ProductEvent::Deleted(ProductDeleted {
                    product_id: cmd.product_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::AddVariant(cmd) => self.handle_update(&UpdateProduct {
                product_id: cmd.product_id,
                name: None,
                description: None,
                units: None,
                variants: vec![VariantEdit::Add {
                    variant_id: cmd.variant_id,
                    changes: cmd.changes.clone(),
                }],
                occurred_at: cmd.occurred_at,
            }),
            ProductCommand::UpdateVariant(cmd) => self.handle_update(&UpdateProduct {
                product_id: cmd.product_id,
                name: None,
                description: None,
                units: None,
                variants: vec![VariantEdit::Update {
                    variant_id: cmd.variant_id,
                    changes: cmd.changes.clone(),
                }],
                occurred_at: cmd.occurred_at,
            }),
            ProductCommand::SoftDeleteVariant(cmd) => self.handle_soft_delete(cmd),
            ProductCommand::AttachImage(cmd) => {
                self.ensure_live()?;
                let variant = self.live_variant(cmd.variant_id)?;
                let mut image = cmd.image.clone();
                image.position = variant.images.len() as u32 + 1;

                Ok(vec![ProductEvent::ImageAttached(ImageAttached {
                    product_id: cmd.product_id,
                    variant_id: cmd.variant_id,
                    image,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::ReplaceImage(cmd) => {
                self.ensure_live()?;
                let variant = self.live_variant(cmd.variant_id)?;
                let current = variant
                    .images
                    .iter()
                    .find(|i| i.id == cmd.image_id)
                    .ok_or(DomainError::NotFound)?;

                let mut image = cmd.image.clone();
                image.id = current.id;
                image.position = current.position;
                if image.alt.is_none() {
                    image.alt = current.alt.clone();
                }

                Ok(vec![ProductEvent::ImageReplaced(ImageReplaced {
                    product_id: cmd.product_id,
                    variant_id: cmd.variant_id,
                    image,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::SetProperty(cmd) => {
                self.ensure_live()?;
                if cmd.property.name.trim().is_empty() {
                    return Err(DomainError::validation("property_name", "can't be blank"));
                }
                let property = ProductProperty {
                    property_id: cmd.property.property_id,
                    name: cmd.property.name.trim().to_string(),
                    value: cmd.property.value.trim().to_string(),
                };
                if self.properties.contains(&property) {
                    return Ok(vec![]);
                }

                Ok(vec![ProductEvent::PropertySet(PropertySet {
                    product_id: cmd.product_id,
                    property,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Created(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.permalink = e.permalink.clone();
                self.supplier = Some(e.supplier);
                self.units = e.units.clone();
                self.variants = vec![e.master.clone(), e.variant.clone()];
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::Updated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.units = e.units.clone();
                if e.clear_unit_descriptions {
                    for variant in &mut self.variants {
                        variant.unit_description.clear();
                    }
                }
            }
            ProductEvent::Deleted(e) => self.deleted_at = Some(e.occurred_at),
            ProductEvent::VariantAdded(e) => self.variants.push(e.variant.clone()),
            ProductEvent::VariantUpdated(e) => {
                if let Some(slot) = self.variants.iter_mut().find(|v| v.id == e.variant.id) {
                    *slot = e.variant.clone();
                }
            }
            ProductEvent::VariantSoftDeleted(e) => {
                if let Some(v) = self.variants.iter_mut().find(|v| v.id == e.variant_id) {
                    v.deleted_at = Some(e.occurred_at);
                }
            }
            ProductEvent::ImageAttached(e) => {
                if let Some(v) = self.variants.iter_mut().find(|v| v.id == e.variant_id) {
                    v.images.push(e.image.clone());
                }
            }
            ProductEvent::ImageReplaced(e) => {
                if let Some(v) = self.variants.iter_mut().find(|v| v.id == e.variant_id) {
                    if let Some(slot) = v.images.iter_mut().find(|i| i.id == e.image.id) {
                        *slot = e.image.clone();
                    }
                }
            }
            ProductEvent::PropertySet(e) => {
                match self
                    .properties
                    .iter_mut()
                    .find(|p| p.property_id == e.property.property_id)
                {
                    Some(slot) => *slot = e.property.clone(),
                    None => self.properties.push(e.property.clone()),
                }
            }
        }
        self.version += 1;
    }
}

impl Product {
    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.product_id != self.id {
            return Err(DomainError::invariant("product_id mismatch"));
        }

        let mut errors = FieldErrors::new();
        let name = cmd.name.trim();
        if name.is_empty() {
            errors.add("name", "can't be blank");
        }
        if cmd.price.is_none() {
            errors.add("price", "can't be blank");
        }
        errors.merge_prefixed("", cmd.units.validate());
        errors.merge_prefixed("", cmd.units.validate_unit_value(cmd.unit_value));
        errors.into_result()?;

        let price = cmd.price.unwrap_or_default();
        let permalink = match cmd.permalink.trim() {
            "" => slugify(name),
            given => given.to_string(),
        };

        let mut master = Variant::new(cmd.master_variant_id, true);
        master.sku = cmd.sku.trim().to_string();
        master.price = price;
        master.cost_price = cmd.cost_price;

        let mut variant = Variant::new(cmd.variant_id, false);
        variant.price = price;
        variant.cost_price = cmd.cost_price;
        variant.unit_value = cmd.unit_value;
        variant.unit_description = cmd.unit_description.clone();
        variant.on_hand = cmd.on_hand;
        variant.on_demand = cmd.on_demand;

        let mut events = vec![ProductEvent::Created(ProductCreated {
            product_id: cmd.product_id,
            name: name.to_string(),
            description: cmd.description.clone(),
            permalink,
            supplier: cmd.supplier,
            units: cmd.units.clone(),
            master,
            variant,
            occurred_at: cmd.occurred_at,
        })];

        if let Some(image) = &cmd.image {
            let mut image = image.clone();
            image.position = 1;
            events.push(ProductEvent::ImageAttached(ImageAttached {
                product_id: cmd.product_id,
                variant_id: cmd.master_variant_id,
                image,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;

        let mut errors = FieldErrors::new();

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                errors.add("name", "can't be blank");
                self.name.clone()
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let description = cmd.description.clone().unwrap_or_else(|| self.description.clone());
        let units = cmd.units.clone().unwrap_or_else(|| self.units.clone());
        errors.merge_prefixed("", units.validate());

        // Work on a copy to validate the resulting state as a whole.
        let mut variants = self.variants.clone();
        let mut touched: Vec<(VariantId, bool)> = Vec::new();
        for edit in &cmd.variants {
            match edit {
                VariantEdit::Update { variant_id, changes } => {
                    let slot = variants
                        .iter_mut()
                        .find(|v| v.id == *variant_id && !v.is_deleted())
                        .ok_or(DomainError::NotFound)?;
                    *slot = slot.with_changes(changes);
                    touched.push((*variant_id, false));
                }
                VariantEdit::Add { variant_id, changes } => {
                    if variants.iter().any(|v| v.id == *variant_id) {
                        return Err(DomainError::conflict("variant already exists"));
                    }
                    let mut base = Variant::new(*variant_id, false);
                    base.price = self.master_price();
                    variants.push(base.with_changes(changes));
                    touched.push((*variant_id, true));
                }
            }
        }

        let product_level_change =
            cmd.name.is_some() || cmd.description.is_some() || cmd.units.is_some();
        let clear_unit_descriptions = cmd.units.is_some() && units.is_items();
        if clear_unit_descriptions {
            for variant in &mut variants {
                variant.unit_description.clear();
            }
        }

        for variant in variants.iter().filter(|v| !v.is_master && !v.is_deleted()) {
            errors.merge_prefixed("variants", units.validate_unit_value(variant.unit_value));
        }
        errors.into_result()?;

        let mut events = Vec::new();
        if product_level_change {
            events.push(ProductEvent::Updated(ProductUpdated {
                product_id: cmd.product_id,
                name,
                description,
                units,
                clear_unit_descriptions,
                occurred_at: cmd.occurred_at,
            }));
        }
        for (variant_id, added) in touched {
            let Some(variant) = variants.iter().find(|v| v.id == variant_id).cloned() else {
                continue;
            };
            events.push(if added {
                ProductEvent::VariantAdded(VariantAdded {
                    product_id: cmd.product_id,
                    variant,
                    occurred_at: cmd.occurred_at,
                })
            } else {
                ProductEvent::VariantUpdated(VariantUpdated {
                    product_id: cmd.product_id,
                    variant,
                    occurred_at: cmd.occurred_at,
                })
            });
        }
        Ok(events)
    }

    fn handle_soft_delete(&self, cmd: &SoftDeleteVariant) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        let variant = self.live_variant(cmd.variant_id)?;

        if cmd.guard && !variant.is_master && self.standard_variants().count() <= 1 {
            return Err(DomainError::validation("product", AT_LEAST_ONE_VARIANT));
        }

        Ok(vec![ProductEvent::VariantSoftDeleted(VariantSoftDeleted {
            product_id: cmd.product_id,
            variant_id: cmd.variant_id,
            was_master: variant.is_master,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::VariantUnit;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(id: ProductId, units: UnitSettings, unit_value: Option<f64>) -> CreateProduct {
        CreateProduct {
            product_id: id,
            name: "Peas".to_string(),
            description: String::new(),
            permalink: String::new(),
            supplier: EnterpriseId::new(AggregateId::new()),
            units,
            master_variant_id: VariantId::new(),
            variant_id: VariantId::new(),
            sku: "PEAS-1".to_string(),
            price: Some(1999),
            cost_price: None,
            unit_value,
            unit_description: "grams".to_string(),
            on_hand: 5,
            on_demand: false,
            image: None,
            occurred_at: now(),
        }
    }

    fn run(product: &mut Product, cmd: ProductCommand) -> Vec<ProductEvent> {
        let events = product.handle(&cmd).unwrap();
        for e in &events {
            product.apply(e);
        }
        events
    }

    fn simple_product() -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        run(
            &mut product,
            ProductCommand::Create(create_cmd(id, UnitSettings::weight(1.0), Some(500.0))),
        );
        product
    }

    fn items_product() -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut product = Product::empty(id);
        run(
            &mut product,
            ProductCommand::Create(create_cmd(id, UnitSettings::items("bunches"), None)),
        );
        product
    }

    fn standard_id(product: &Product) -> VariantId {
        product.standard_variants().next().unwrap().id
    }

    #[test]
    fn create_builds_master_and_one_variant() {
        let product = simple_product();
        assert_eq!(product.permalink(), "peas");
        assert_eq!(product.all_variants().len(), 2);

        let master = product.master().unwrap();
        assert!(master.is_master);
        assert_eq!(master.sku, "PEAS-1");
        assert_eq!(master.price, 1999);

        let standard = product.standard_variants().next().unwrap();
        assert_eq!(standard.unit_value, Some(500.0));
        assert_eq!(standard.on_hand, 5);
    }

    #[test]
    fn create_requires_name_price_and_valid_units() {
        let id = ProductId::new(AggregateId::new());
        let mut cmd = create_cmd(id, UnitSettings::weight(3.0), None);
        cmd.name = " ".to_string();
        cmd.price = None;

        let Err(DomainError::Validation(errors)) =
            Product::empty(id).handle(&ProductCommand::Create(cmd))
        else {
            panic!("expected validation error");
        };
        assert!(errors.get("name").is_some());
        assert!(errors.get("price").is_some());
        assert!(errors.get("variant_unit_scale").is_some());
        assert!(errors.get("unit_value").is_some());
    }

    #[test]
    fn create_attaches_image_to_master() {
        let id = ProductId::new(AggregateId::new());
        let mut cmd = create_cmd(id, UnitSettings::weight(1.0), Some(1.0));
        let image = Image::from_upload(ImageId::new(), Some("a.png"), None, b"\x89PNG\r\n\x1a\n").unwrap();
        cmd.image = Some(image.clone());

        let mut product = Product::empty(id);
        run(&mut product, ProductCommand::Create(cmd));

        assert_eq!(product.images().len(), 1);
        assert_eq!(product.images()[0].id, image.id);
        assert_eq!(product.images()[0].position, 1);
    }

    #[test]
    fn changing_items_to_weight_without_unit_values_fails() {
        let product = items_product();
        let cmd = ProductCommand::Update(UpdateProduct {
            product_id: product.id_typed(),
            name: None,
            description: None,
            units: Some(UnitSettings::weight(1.0)),
            variants: vec![],
            occurred_at: now(),
        });

        let Err(DomainError::Validation(errors)) = product.handle(&cmd) else {
            panic!("expected validation error");
        };
        assert!(errors.get("variants.unit_value").is_some());
    }

    #[test]
    fn unit_change_with_values_in_same_edit_succeeds() {
        let mut product = items_product();
        let variant_id = standard_id(&product);
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::Update(UpdateProduct {
                product_id,
                name: None,
                description: None,
                units: Some(UnitSettings::weight(1000.0)),
                variants: vec![VariantEdit::Update {
                    variant_id,
                    changes: VariantChanges {
                        unit_value: Some(2.0),
                        ..Default::default()
                    },
                }],
                occurred_at: now(),
            }),
        );
        assert_eq!(product.units().variant_unit, Some(VariantUnit::Weight));
        assert_eq!(product.variant(variant_id).unwrap().unit_value, Some(2.0));
    }

    #[test]
    fn switching_to_items_clears_unit_descriptions() {
        let mut product = simple_product();
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::Update(UpdateProduct {
                product_id,
                name: None,
                description: None,
                units: Some(UnitSettings::items("bag")),
                variants: vec![],
                occurred_at: now(),
            }),
        );
        assert!(product.all_variants().iter().all(|v| v.unit_description.is_empty()));
    }

    #[test]
    fn added_variants_inherit_master_price() {
        let mut product = items_product();
        let variant_id = VariantId::new();
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::AddVariant(AddVariant {
                product_id,
                variant_id,
                changes: VariantChanges {
                    sku: Some("12345".to_string()),
                    ..Default::default()
                },
                occurred_at: now(),
            }),
        );
        let added = product.variant(variant_id).unwrap();
        assert_eq!(added.sku, "12345");
        assert_eq!(added.price, 1999);
        assert_eq!(product.standard_variants().count(), 2);
    }

    #[test]
    fn guarded_soft_delete_keeps_the_only_variant() {
        let product = simple_product();
        let cmd = ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
            product_id: product.id_typed(),
            variant_id: standard_id(&product),
            guard: true,
            occurred_at: now(),
        });

        let Err(DomainError::Validation(errors)) = product.handle(&cmd) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("product"), Some(&[AT_LEAST_ONE_VARIANT.to_string()][..]));
    }

    #[test]
    fn master_can_be_soft_deleted() {
        let mut product = simple_product();
        let master_id = product.master().unwrap().id;
        let product_id = product.id_typed();
        let events = run(
            &mut product,
            ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
                product_id,
                variant_id: master_id,
                guard: true,
                occurred_at: now(),
            }),
        );
        assert!(matches!(&events[0], ProductEvent::VariantSoftDeleted(e) if e.was_master));
        assert!(product.variant(master_id).unwrap().is_deleted());
    }

    #[test]
    fn unguarded_delete_removes_last_variant_and_hides_it() {
        let mut product = simple_product();
        let variant_id = standard_id(&product);
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
                product_id,
                variant_id,
                guard: false,
                occurred_at: now(),
            }),
        );
        assert_eq!(product.standard_variants().count(), 0);

        let again = ProductCommand::UpdateVariant(UpdateVariant {
            product_id: product.id_typed(),
            variant_id,
            changes: VariantChanges::default(),
            occurred_at: now(),
        });
        assert_eq!(product.handle(&again), Err(DomainError::NotFound));
    }

    #[test]
    fn replacing_an_image_keeps_id_and_position() {
        let mut product = simple_product();
        let master_id = product.master().unwrap().id;
        let first = Image::from_upload(ImageId::new(), Some("a.png"), None, b"\x89PNG\r\n\x1a\n").unwrap();
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::AttachImage(AttachImage {
                product_id,
                variant_id: master_id,
                image: first.clone(),
                occurred_at: now(),
            }),
        );

        let replacement = Image::from_upload(ImageId::new(), Some("b.gif"), None, b"GIF89a").unwrap();
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::ReplaceImage(ReplaceImage {
                product_id,
                variant_id: master_id,
                image_id: first.id,
                image: replacement,
                occurred_at: now(),
            }),
        );

        let images = product.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, first.id);
        assert_eq!(images[0].position, 1);
        assert_eq!(images[0].attachment_content_type, "image/gif");
    }

    #[test]
    fn set_property_upserts_by_property() {
        let mut product = simple_product();
        let property_id = PropertyId::new(AggregateId::new());
        for value in ["organic", "biodynamic"] {
            let product_id = product.id_typed();
            run(
                &mut product,
                ProductCommand::SetProperty(SetProperty {
                    product_id,
                    property: ProductProperty {
                        property_id,
                        name: "Certification".to_string(),
                        value: value.to_string(),
                    },
                    occurred_at: now(),
                }),
            );
        }
        assert_eq!(product.properties().len(), 1);
        assert_eq!(product.properties()[0].value, "biodynamic");
    }

    #[test]
    fn deleted_products_reject_commands() {
        let mut product = simple_product();
        let product_id = product.id_typed();
        run(
            &mut product,
            ProductCommand::Delete(DeleteProduct {
                product_id,
                occurred_at: now(),
            }),
        );
        assert!(product.is_deleted());

        let cmd = ProductCommand::Update(UpdateProduct {
            product_id: product.id_typed(),
            name: Some("Beans".to_string()),
            description: None,
            units: None,
            variants: vec![],
            occurred_at: now(),
        });
        assert_eq!(product.handle(&cmd), Err(DomainError::NotFound));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Handle is pure: the same state and command give the same events.
            #[test]
            fn handle_is_deterministic(name in "[A-Za-z][A-Za-z0-9 ]{0,40}", value in 0.5f64..5000.0) {
                let product = simple_product();
                let cmd = ProductCommand::Update(UpdateProduct {
                    product_id: product.id_typed(),
                    name: Some(name),
                    description: None,
                    units: None,
                    variants: vec![VariantEdit::Update {
                        variant_id: standard_id(&product),
                        changes: VariantChanges { unit_value: Some(value), ..Default::default() },
                    }],
                    occurred_at: Utc::now(),
                });
                let before = product.clone();
                prop_assert_eq!(product.handle(&cmd).unwrap(), product.handle(&cmd).unwrap());
                prop_assert_eq!(product, before);
            }

            /// A guarded delete never leaves a product without a live standard variant.
            #[test]
            fn guard_keeps_one_standard_variant(extra in 0usize..4) {
                let mut product = simple_product();
                for _ in 0..extra {
                    let product_id = product.id_typed();
                    run(&mut product, ProductCommand::AddVariant(AddVariant {
                        product_id,
                        variant_id: VariantId::new(),
                        changes: VariantChanges { unit_value: Some(1.0), ..Default::default() },
                        occurred_at: Utc::now(),
                    }));
                }
                let ids: Vec<VariantId> = product.standard_variants().map(|v| v.id).collect();
                for id in ids {
                    let cmd = ProductCommand::SoftDeleteVariant(SoftDeleteVariant {
                        product_id: product.id_typed(),
                        variant_id: id,
                        guard: true,
                        occurred_at: Utc::now(),
                    });
                    if let Ok(events) = product.handle(&cmd) {
                        for e in &events {
                            product.apply(e);
                        }
                    }
                }
                prop_assert_eq!(product.standard_variants().count(), 1);
            }
        }
    }
}
