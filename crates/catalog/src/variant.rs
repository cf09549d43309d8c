//! Variants: the purchasable options of a product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvest_core::uuid_newtype;

use crate::image::Image;
use crate::option_type::OptionValueSnapshot;

uuid_newtype!(
    /// Identifier of a variant (unique across all products).
    pub struct VariantId,
    "VariantId"
);

/// A variant as held inside its product.
///
/// Every product has exactly one master variant (`is_master`), which carries
/// the product-level sku, price and images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub sku: String,
    /// Minor units.
    pub price: u64,
    pub cost_price: Option<u64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub is_master: bool,
    pub on_hand: i64,
    pub on_demand: bool,
    pub unit_value: Option<f64>,
    pub unit_description: String,
    pub display_name: String,
    pub display_as: String,
    pub option_values: Vec<OptionValueSnapshot>,
    pub images: Vec<Image>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Variant {
    pub fn new(id: VariantId, is_master: bool) -> Self {
        Self {
            id,
            sku: String::new(),
            price: 0,
            cost_price: None,
            weight: None,
            height: None,
            width: None,
            depth: None,
            is_master,
            on_hand: 0,
            on_demand: false,
            unit_value: None,
            unit_description: String::new(),
            display_name: String::new(),
            display_as: String::new(),
            option_values: Vec::new(),
            images: Vec::new(),
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// `"Size: Large, Colour: Red"`.
    pub fn options_text(&self) -> String {
        self.option_values
            .iter()
            .map(|v| format!("{}: {}", v.option_type_name, v.presentation))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Overlay the provided attributes onto a copy of this variant.
    pub fn with_changes(&self, changes: &VariantChanges) -> Variant {
        let mut next = self.clone();
        if let Some(sku) = &changes.sku {
            next.sku = sku.trim().to_string();
        }
        if let Some(price) = changes.price {
            next.price = price;
        }
        if let Some(cost_price) = changes.cost_price {
            next.cost_price = Some(cost_price);
        }
        if let Some(weight) = changes.weight {
            next.weight = Some(weight);
        }
        if let Some(height) = changes.height {
            next.height = Some(height);
        }
        if let Some(width) = changes.width {
            next.width = Some(width);
        }
        if let Some(depth) = changes.depth {
            next.depth = Some(depth);
        }
        if let Some(on_hand) = changes.on_hand {
            next.on_hand = on_hand;
        }
        if let Some(on_demand) = changes.on_demand {
            next.on_demand = on_demand;
        }
        if let Some(unit_value) = changes.unit_value {
            next.unit_value = Some(unit_value);
        }
        if let Some(unit_description) = &changes.unit_description {
            next.unit_description = unit_description.clone();
        }
        if let Some(display_name) = &changes.display_name {
            next.display_name = display_name.clone();
        }
        if let Some(display_as) = &changes.display_as {
            next.display_as = display_as.clone();
        }
        if let Some(option_values) = &changes.option_values {
            next.option_values = option_values.clone();
        }
        next
    }
}

/// Variant attributes submitted by a form or API call; `None` means "not sent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantChanges {
    pub sku: Option<String>,
    pub price: Option<u64>,
    pub cost_price: Option<u64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub width: Option<f64>,
    pub depth: Option<f64>,
    pub on_hand: Option<i64>,
    pub on_demand: Option<bool>,
    pub unit_value: Option<f64>,
    pub unit_description: Option<String>,
    pub display_name: Option<String>,
    pub display_as: Option<String>,
    pub option_values: Option<Vec<OptionValueSnapshot>>,
}

impl VariantChanges {
    /// Nothing was submitted (`variants_attributes: [{}]`).
    pub fn is_empty(&self) -> bool {
        *self == VariantChanges::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option_type::{OptionTypeId, OptionValueId};
    use harvest_core::AggregateId;

    #[test]
    fn changes_overlay_only_sent_fields() {
        let mut variant = Variant::new(VariantId::new(), false);
        variant.sku = "OLD".to_string();
        variant.price = 500;

        let next = variant.with_changes(&VariantChanges {
            sku: Some(" NEW ".to_string()),
            on_hand: Some(3),
            ..Default::default()
        });

        assert_eq!(next.sku, "NEW");
        assert_eq!(next.price, 500);
        assert_eq!(next.on_hand, 3);
        assert!(VariantChanges::default().is_empty());
    }

    #[test]
    fn options_text_joins_type_and_presentation() {
        let mut variant = Variant::new(VariantId::new(), false);
        let option_type_id = OptionTypeId::new(AggregateId::new());
        variant.option_values = vec![
            OptionValueSnapshot {
                id: OptionValueId::new(),
                name: "large".to_string(),
                presentation: "Large".to_string(),
                option_type_name: "Size".to_string(),
                option_type_id,
            },
            OptionValueSnapshot {
                id: OptionValueId::new(),
                name: "red".to_string(),
                presentation: "Red".to_string(),
                option_type_name: "Colour".to_string(),
                option_type_id,
            },
        ];
        assert_eq!(variant.options_text(), "Size: Large, Colour: Red");
    }
}
