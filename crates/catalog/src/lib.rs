//! Catalog domain module (event-sourced).
//!
//! This crate contains business rules for brands and their sellable
//! variants, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Catalog prices are the *defaults* offered when
//! stock is allocated down the custody chain; the ledger records the
//! prices actually supplied at credit time.

pub mod brand;
pub mod price;
pub mod variant;

pub use brand::{
    Brand, BrandCommand, BrandEvent, BrandId, BrandRegistered, BrandRenamed, RegisterBrand,
    RenameBrand, BRAND_AGGREGATE_TYPE,
};
pub use price::{PriceField, PriceSet};
pub use variant::{
    RegisterVariant, RenameVariant, SetVariantPrices, Variant, VariantCommand, VariantEvent,
    VariantId, VariantPricesSet, VariantRegistered, VariantRenamed, VARIANT_AGGREGATE_TYPE,
};
