//! Variant unit rules.
//!
//! A product sells by `weight`, `volume` or `items`. Weight and volume need a
//! scale from a fixed list and a positive `unit_value` on every live
//! non-master variant; items need a unit name and no scale.

use serde::{Deserialize, Serialize};

use harvest_core::{DomainError, FieldErrors};

/// Grams, kilograms, tonnes.
pub const WEIGHT_SCALES: [f64; 3] = [1.0, 1000.0, 1_000_000.0];

/// Millilitres, litres, kilolitres.
pub const VOLUME_SCALES: [f64; 3] = [0.001, 1.0, 1000.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantUnit {
    Weight,
    Volume,
    Items,
}

impl VariantUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantUnit::Weight => "weight",
            VariantUnit::Volume => "volume",
            VariantUnit::Items => "items",
        }
    }

    /// Allowed scales, empty for `items`.
    pub fn scales(self) -> &'static [f64] {
        match self {
            VariantUnit::Weight => &WEIGHT_SCALES,
            VariantUnit::Volume => &VOLUME_SCALES,
            VariantUnit::Items => &[],
        }
    }
}

impl core::fmt::Display for VariantUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for VariantUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "weight" => Ok(VariantUnit::Weight),
            "volume" => Ok(VariantUnit::Volume),
            "items" => Ok(VariantUnit::Items),
            _ => Err(DomainError::validation("variant_unit", "is not included in the list")),
        }
    }
}

/// The unit configuration of a product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitSettings {
    pub variant_unit: Option<VariantUnit>,
    pub variant_unit_scale: Option<f64>,
    pub variant_unit_name: Option<String>,
}

impl UnitSettings {
    pub fn weight(scale: f64) -> Self {
        Self {
            variant_unit: Some(VariantUnit::Weight),
            variant_unit_scale: Some(scale),
            variant_unit_name: None,
        }
    }

    pub fn items(name: impl Into<String>) -> Self {
        Self {
            variant_unit: Some(VariantUnit::Items),
            variant_unit_scale: None,
            variant_unit_name: Some(name.into()),
        }
    }

    pub fn is_items(&self) -> bool {
        self.variant_unit == Some(VariantUnit::Items)
    }

    /// Weight and volume products measure each variant.
    pub fn requires_unit_value(&self) -> bool {
        matches!(self.variant_unit, Some(VariantUnit::Weight | VariantUnit::Volume))
    }

    /// Product-level checks on unit, scale and name.
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let Some(unit) = self.variant_unit else {
            errors.add("variant_unit", "can't be blank");
            return errors;
        };

        match unit {
            VariantUnit::Weight | VariantUnit::Volume => match self.variant_unit_scale {
                None => errors.add("variant_unit_scale", "can't be blank"),
                Some(scale) if !unit.scales().iter().any(|s| same_scale(*s, scale)) => {
                    errors.add("variant_unit_scale", "is not included in the list")
                }
                Some(_) => {}
            },
            VariantUnit::Items => {
                if self.variant_unit_scale.is_some() {
                    errors.add("variant_unit_scale", "must be blank");
                }
                let name_blank = self
                    .variant_unit_name
                    .as_deref()
                    .is_none_or(|n| n.trim().is_empty());
                if name_blank {
                    errors.add("variant_unit_name", "can't be blank");
                }
            }
        }
        errors
    }

    /// Checks on one variant's `unit_value` under these settings.
    pub fn validate_unit_value(&self, unit_value: Option<f64>) -> FieldErrors {
        let mut errors = FieldErrors::new();
        match unit_value {
            Some(v) if !v.is_finite() => errors.add("unit_value", "is not a number"),
            Some(v) if self.requires_unit_value() && v <= 0.0 => {
                errors.add("unit_value", "must be greater than 0")
            }
            Some(v) if v < 0.0 => errors.add("unit_value", "must be greater than or equal to 0"),
            Some(_) => {}
            None if self.requires_unit_value() => errors.add("unit_value", "can't be blank"),
            None => {}
        }
        errors
    }
}

fn same_scale(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn weight_needs_a_listed_scale() {
        assert!(UnitSettings::weight(1000.0).validate().is_empty());

        let errors = UnitSettings::weight(7.0).validate();
        assert_eq!(
            errors.get("variant_unit_scale"),
            Some(&["is not included in the list".to_string()][..])
        );

        let mut missing = UnitSettings::weight(1.0);
        missing.variant_unit_scale = None;
        assert!(missing.validate().get("variant_unit_scale").is_some());
    }

    #[test]
    fn volume_accepts_millilitres() {
        let settings = UnitSettings {
            variant_unit: Some(VariantUnit::Volume),
            variant_unit_scale: Some(0.001),
            variant_unit_name: None,
        };
        assert!(settings.validate().is_empty());
    }

    #[test]
    fn items_need_a_name_and_no_scale() {
        assert!(UnitSettings::items("bunches").validate().is_empty());

        let mut scaled = UnitSettings::items("bunches");
        scaled.variant_unit_scale = Some(1.0);
        assert!(scaled.validate().get("variant_unit_scale").is_some());

        let unnamed = UnitSettings::items("  ");
        assert!(unnamed.validate().get("variant_unit_name").is_some());
    }

    #[test]
    fn unit_value_rules_follow_the_unit() {
        let weight = UnitSettings::weight(1.0);
        assert!(weight.validate_unit_value(Some(250.0)).is_empty());
        assert!(!weight.validate_unit_value(None).is_empty());
        assert!(!weight.validate_unit_value(Some(0.0)).is_empty());

        let items = UnitSettings::items("bag");
        assert!(items.validate_unit_value(None).is_empty());
        assert!(items.validate_unit_value(Some(4.0)).is_empty());
        assert!(!items.validate_unit_value(Some(-1.0)).is_empty());
    }

    #[test]
    fn parses_unit_names() {
        assert_eq!("items".parse::<VariantUnit>().unwrap(), VariantUnit::Items);
        assert!("furlongs".parse::<VariantUnit>().is_err());
    }

    proptest! {
        #[test]
        fn weight_scale_valid_iff_listed(scale in prop_oneof![
            Just(1.0f64), Just(1000.0), Just(1_000_000.0),
            0.0001f64..2_000_000.0,
        ]) {
            let listed = WEIGHT_SCALES.contains(&scale);
            prop_assert_eq!(UnitSettings::weight(scale).validate().is_empty(), listed);
        }

        #[test]
        fn positive_values_always_satisfy_measured_units(value in 0.001f64..1e9) {
            prop_assert!(UnitSettings::weight(1.0).validate_unit_value(Some(value)).is_empty());
        }
    }
}
