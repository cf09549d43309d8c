use std::str::FromStr;

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use harvest_auth::{Role, User};
use harvest_catalog::{
    Image, OptionValueId, OptionValueSnapshot, Product, Variant, VariantChanges, VariantUnit,
};
use harvest_core::{format_minor_units, parse_minor_units, DomainError, FieldErrors};
use harvest_enterprises::{Enterprise, EnterpriseId, Sells};
use harvest_infra::Paginated;
use harvest_orders::Order;

use crate::app::services::{
    NewProduct, ProductChanges, UnitChanges, Upload, VariantAttributes, VariantInput, VariantView,
};

/// Attributes every variant JSON carries.
pub const STANDARD_ATTRIBUTES: [&str; 11] = [
    "id",
    "name",
    "sku",
    "price",
    "weight",
    "height",
    "width",
    "depth",
    "is_master",
    "cost_price",
    "permalink",
];

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewUserAttributes {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub user: NewUserAttributes,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountAttributes {
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub user: AccountAttributes,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisteredEmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub distributor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterEnterpriseRequest {
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub is_primary_producer: bool,
    #[serde(default)]
    pub sells: Sells,
}

#[derive(Debug, Deserialize)]
pub struct AddManagerRequest {
    pub user_id: String,
}

/// Base64 image embedded in the admin product form.
#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub alt: Option<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductPropertyAttributes {
    #[serde(default)]
    pub property_name: String,
    #[serde(default)]
    pub value: String,
}

/// Admin product form fields. Numbers may arrive as JSON numbers or strings.
#[derive(Debug, Default, Deserialize)]
pub struct ProductAttrs {
    pub supplier_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub permalink: Option<String>,
    pub variant_unit: Option<String>,
    pub variant_unit_scale: Option<JsonValue>,
    pub variant_unit_name: Option<String>,
    pub sku: Option<String>,
    pub price: Option<JsonValue>,
    pub cost_price: Option<JsonValue>,
    pub unit_value: Option<JsonValue>,
    pub unit_description: Option<String>,
    pub on_hand: Option<JsonValue>,
    pub on_demand: Option<bool>,
    pub image: Option<ImageUpload>,
    #[serde(default)]
    pub product_properties_attributes: Vec<ProductPropertyAttributes>,
    #[serde(default)]
    pub variants_attributes: Vec<VariantAttrsForm>,
}

#[derive(Debug, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub product: ProductAttrs,
    pub button: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductPatchForm {
    #[serde(default)]
    pub product: ProductAttrs,
}

#[derive(Debug, Deserialize)]
pub struct BulkProductEntry {
    pub id: String,
    #[serde(flatten)]
    pub attrs: ProductAttrs,
}

#[derive(Debug, Deserialize)]
pub struct BulkProductForm {
    #[serde(default)]
    pub products: Vec<BulkProductEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VariantAttrsForm {
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub sku: Option<String>,
    pub price: Option<JsonValue>,
    pub cost_price: Option<JsonValue>,
    pub weight: Option<JsonValue>,
    pub height: Option<JsonValue>,
    pub width: Option<JsonValue>,
    pub depth: Option<JsonValue>,
    pub on_hand: Option<JsonValue>,
    pub on_demand: Option<bool>,
    pub unit_value: Option<JsonValue>,
    pub unit_description: Option<String>,
    pub display_name: Option<String>,
    pub display_as: Option<String>,
    pub option_value_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct VariantForm {
    #[serde(default)]
    pub variant: VariantAttrsForm,
}

#[derive(Debug, Deserialize)]
pub struct OptionValueRequest {
    pub name: String,
    pub presentation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OptionTypeRequest {
    pub name: String,
    pub presentation: Option<String>,
    #[serde(default)]
    pub option_values: Vec<OptionValueRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyRequest {
    pub name: String,
    pub presentation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub variant_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub distributor_id: String,
    #[serde(default)]
    pub line_items: Vec<LineItemRequest>,
}

// -------------------------
// Field parsing
// -------------------------

/// Text of a scalar form value; blank strings and `null` count as absent.
fn scalar_text(value: Option<&JsonValue>) -> Option<String> {
    let text = match value? {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn field_name(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn collect_domain_error(errors: &mut FieldErrors, err: DomainError) {
    match err {
        DomainError::Validation(e) => errors.merge_prefixed("", e),
        other => errors.add("base", other.to_string()),
    }
}

pub fn parse_number(field: &str, value: Option<&JsonValue>, errors: &mut FieldErrors) -> Option<f64> {
    let text = scalar_text(value)?;
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(n),
        _ => {
            errors.add(field, "is not a number");
            None
        }
    }
}

pub fn parse_integer(field: &str, value: Option<&JsonValue>, errors: &mut FieldErrors) -> Option<i64> {
    let text = scalar_text(value)?;
    match text.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.add(field, "must be an integer");
            None
        }
    }
}

/// Decimal amount to minor units (`"19.99"` → 1999).
pub fn parse_money(field: &str, value: Option<&JsonValue>, errors: &mut FieldErrors) -> Option<u64> {
    let text = scalar_text(value)?;
    match parse_minor_units(field, &text) {
        Ok(amount) => Some(amount),
        Err(e) => {
            collect_domain_error(errors, e);
            None
        }
    }
}

pub fn parse_id<T: FromStr>(field: &str, raw: &str, errors: &mut FieldErrors) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, "is invalid");
            None
        }
    }
}

fn parse_unit(field: &str, raw: Option<&str>, errors: &mut FieldErrors) -> Option<VariantUnit> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
    match raw.parse::<VariantUnit>() {
        Ok(unit) => Some(unit),
        Err(_) => {
            errors.add(field, "is not included in the list");
            None
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl ImageUpload {
    fn decode(&self, errors: &mut FieldErrors) -> Option<Upload> {
        match base64::engine::general_purpose::STANDARD.decode(self.data.trim()) {
            Ok(bytes) => Some(Upload {
                file_name: self.file_name.clone(),
                alt: self.alt.clone(),
                bytes,
            }),
            Err(_) => {
                errors.add("image.data", "is not valid base64");
                None
            }
        }
    }
}

impl ProductAttrs {
    fn unit_changes(&self, errors: &mut FieldErrors) -> UnitChanges {
        UnitChanges {
            variant_unit: parse_unit("variant_unit", self.variant_unit.as_deref(), errors),
            variant_unit_scale: parse_number("variant_unit_scale", self.variant_unit_scale.as_ref(), errors),
            variant_unit_name: non_blank(&self.variant_unit_name),
        }
    }

    /// Build the create input, or the field errors of unparseable values.
    pub fn to_new_product(&self) -> Result<NewProduct, FieldErrors> {
        let mut errors = FieldErrors::new();

        let supplier_id = non_blank(&self.supplier_id)
            .and_then(|raw| parse_id::<EnterpriseId>("supplier_id", &raw, &mut errors));
        let units = self.unit_changes(&mut errors);
        let new = NewProduct {
            supplier_id,
            name: self.name.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            permalink: non_blank(&self.permalink),
            units: units.merge(&Default::default()),
            sku: self.sku.clone().unwrap_or_default(),
            price: parse_money("price", self.price.as_ref(), &mut errors),
            cost_price: parse_money("cost_price", self.cost_price.as_ref(), &mut errors),
            unit_value: parse_number("unit_value", self.unit_value.as_ref(), &mut errors),
            unit_description: self.unit_description.clone().unwrap_or_default(),
            on_hand: parse_integer("on_hand", self.on_hand.as_ref(), &mut errors).unwrap_or(0),
            on_demand: self.on_demand.unwrap_or(false),
            image: self.image.as_ref().and_then(|image| image.decode(&mut errors)),
        };
        errors.into_result().map_err(into_field_errors)?;
        Ok(new)
    }

    pub fn to_changes(&self) -> Result<ProductChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        let units = self.unit_changes(&mut errors);
        let properties = self
            .product_properties_attributes
            .iter()
            .filter(|p| !p.property_name.trim().is_empty())
            .map(|p| (p.property_name.trim().to_string(), p.value.clone()))
            .collect();
        let variants = self
            .variants_attributes
            .iter()
            .enumerate()
            .map(|(index, attrs)| {
                let prefix = format!("variants_attributes[{index}]");
                VariantAttributes {
                    id: non_blank(&attrs.id).and_then(|raw| parse_id(&field_name(&prefix, "id"), &raw, &mut errors)),
                    input: attrs.to_input(&prefix, &mut errors),
                }
            })
            .collect();

        let changes = ProductChanges {
            name: self.name.clone(),
            description: self.description.clone(),
            units,
            properties,
            variants,
        };
        errors.into_result().map_err(into_field_errors)?;
        Ok(changes)
    }
}

fn into_field_errors(err: DomainError) -> FieldErrors {
    match err {
        DomainError::Validation(errors) => errors,
        other => FieldErrors::single("base", other.to_string()),
    }
}

impl VariantAttrsForm {
    pub fn to_input(&self, prefix: &str, errors: &mut FieldErrors) -> VariantInput {
        let f = |name: &str| field_name(prefix, name);
        let changes = VariantChanges {
            sku: self.sku.clone(),
            price: parse_money(&f("price"), self.price.as_ref(), errors),
            cost_price: parse_money(&f("cost_price"), self.cost_price.as_ref(), errors),
            weight: parse_number(&f("weight"), self.weight.as_ref(), errors),
            height: parse_number(&f("height"), self.height.as_ref(), errors),
            width: parse_number(&f("width"), self.width.as_ref(), errors),
            depth: parse_number(&f("depth"), self.depth.as_ref(), errors),
            on_hand: parse_integer(&f("on_hand"), self.on_hand.as_ref(), errors),
            on_demand: self.on_demand,
            unit_value: parse_number(&f("unit_value"), self.unit_value.as_ref(), errors),
            unit_description: self.unit_description.clone(),
            display_name: self.display_name.clone(),
            display_as: self.display_as.clone(),
            option_values: None,
        };
        let option_value_ids = self.option_value_ids.as_ref().map(|ids| {
            ids.iter()
                .filter_map(|raw| parse_id::<OptionValueId>(&f("option_value_ids"), raw, errors))
                .collect()
        });
        VariantInput {
            changes,
            option_value_ids,
        }
    }

    /// Standalone variant input (the `/api/variants` endpoints).
    pub fn to_variant_input(&self) -> Result<VariantInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        let input = self.to_input("", &mut errors);
        errors.into_result().map_err(into_field_errors)?;
        Ok(input)
    }
}

// -------------------------
// Response mapping
// -------------------------

fn money(amount: u64) -> JsonValue {
    JsonValue::String(format_minor_units(amount))
}

pub fn variant_standard_json(product: &Product, variant: &Variant) -> JsonValue {
    json!({
        "id": variant.id.to_string(),
        "name": product.name(),
        "sku": variant.sku,
        "price": money(variant.price),
        "weight": variant.weight,
        "height": variant.height,
        "width": variant.width,
        "depth": variant.depth,
        "is_master": variant.is_master,
        "cost_price": variant.cost_price.map(money),
        "permalink": product.permalink(),
    })
}

/// Standard attributes plus options and images (variant show).
pub fn variant_json(view: &VariantView) -> JsonValue {
    let mut body = variant_standard_json(&view.product, &view.variant);
    if let Some(map) = body.as_object_mut() {
        map.insert("options_text".to_string(), json!(view.variant.options_text()));
        map.insert(
            "option_values".to_string(),
            view.variant.option_values.iter().map(option_value_json).collect(),
        );
        map.insert("images".to_string(), view.variant.images.iter().map(image_json).collect());
    }
    body
}

pub fn variant_bulk_json(variant: &Variant) -> JsonValue {
    json!({
        "id": variant.id.to_string(),
        "options_text": variant.options_text(),
        "price": money(variant.price),
        "on_hand": variant.on_hand,
        "unit_value": variant.unit_value,
        "unit_description": variant.unit_description,
        "on_demand": variant.on_demand,
        "display_as": variant.display_as,
        "display_name": variant.display_name,
    })
}

pub fn option_value_json(value: &OptionValueSnapshot) -> JsonValue {
    json!({
        "id": value.id.to_string(),
        "name": value.name,
        "presentation": value.presentation,
        "option_type_name": value.option_type_name,
        "option_type_id": value.option_type_id.to_string(),
    })
}

pub fn image_json(image: &Image) -> JsonValue {
    json!({
        "id": image.id.to_string(),
        "position": image.position,
        "alt": image.alt,
        "attachment_file_name": image.attachment_file_name,
        "attachment_content_type": image.attachment_content_type,
        "attachment_file_size": image.attachment_file_size,
        "url": format!("/images/{}", image.id),
    })
}

pub fn product_json(product: &Product) -> JsonValue {
    let units = product.units();
    json!({
        "id": product.id_typed().to_string(),
        "name": product.name(),
        "description": product.description(),
        "permalink": product.permalink(),
        "supplier_id": product.supplier().map(|s| s.to_string()),
        "variant_unit": units.variant_unit.map(VariantUnit::as_str),
        "variant_unit_scale": units.variant_unit_scale,
        "variant_unit_name": units.variant_unit_name,
        "properties": product.properties().iter().map(|p| json!({
            "property_id": p.property_id.to_string(),
            "name": p.name,
            "value": p.value,
        })).collect::<Vec<_>>(),
        "master": product.master().map(variant_bulk_json),
        "variants": product.standard_variants().map(variant_bulk_json).collect::<Vec<_>>(),
        "deleted": product.is_deleted(),
    })
}

pub fn variants_page_json(page: Paginated<VariantView>) -> JsonValue {
    json!({
        "variants": page.items.iter().map(variant_json).collect::<Vec<_>>(),
        "count": page.count,
        "total_count": page.total_count,
        "current_page": page.current_page,
        "pages": page.pages,
        "per_page": page.per_page,
    })
}

pub fn products_page_json(page: Paginated<Product>) -> JsonValue {
    json!({
        "products": page.items.iter().map(product_json).collect::<Vec<_>>(),
        "count": page.count,
        "total_count": page.total_count,
        "current_page": page.current_page,
        "pages": page.pages,
        "per_page": page.per_page,
    })
}

pub fn order_json(order: &Order) -> JsonValue {
    json!({
        "id": order.id_typed().to_string(),
        "number": order.number(),
        "state": order.state().as_str(),
        "distributor_id": order.distributor().map(|d| d.to_string()),
        "item_total": money(order.item_total()),
        "completed_at": order.completed_at().map(|t| t.to_rfc3339()),
        "line_items": order.line_items().iter().map(|li| json!({
            "variant_id": li.variant_id.to_string(),
            "quantity": li.quantity,
            "price": money(li.price),
            "amount": money(li.amount()),
        })).collect::<Vec<_>>(),
    })
}

pub fn user_json(user: &User) -> JsonValue {
    json!({
        "id": user.id.to_string(),
        "email": user.email,
        "roles": user.roles.iter().map(Role::as_str).collect::<Vec<_>>(),
    })
}

pub fn enterprise_json(enterprise: &Enterprise) -> JsonValue {
    json!({
        "id": enterprise.id_typed().to_string(),
        "name": enterprise.name(),
        "owner_id": enterprise.owner().map(|o| o.to_string()),
        "manager_ids": enterprise.managers().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "is_primary_producer": enterprise.is_supplier(),
        "sells": enterprise.sells(),
    })
}
