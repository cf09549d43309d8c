//! Catalog domain module (event-sourced).
//!
//! Products with their variants, images and property values, plus the
//! marketplace-wide option types and properties. Pure domain logic: no IO, no
//! HTTP, no storage.

pub mod image;
pub mod option_type;
pub mod product;
pub mod property;
pub mod units;
pub mod variant;

pub use image::{Image, ImageFormat, ImageId};
pub use option_type::{
    AddOptionValue, CreateOptionType, OptionType, OptionTypeCommand, OptionTypeEvent,
    OptionTypeId, OptionValue, OptionValueId, OptionValueSnapshot,
};
pub use product::{
    AddVariant, AttachImage, CreateProduct, DeleteProduct, Product, ProductCommand, ProductEvent,
    ProductId, ProductProperty, ReplaceImage, SetProperty, SoftDeleteVariant, UpdateProduct,
    UpdateVariant, VariantEdit,
};
pub use property::{CreateProperty, Property, PropertyCommand, PropertyEvent, PropertyId};
pub use units::{UnitSettings, VariantUnit};
pub use variant::{Variant, VariantChanges, VariantId};
