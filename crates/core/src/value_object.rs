//! Value object trait: equality by value, not identity.

/// Marker trait for immutable, value-compared domain objects.
///
/// Two value objects with the same attribute values are the same value;
/// there is no identity to track. `PriceSet` is the canonical example here:
/// a set of tier prices is a value, a custodian is an entity.
///
/// To "modify" a value object, build a new one. Implementations should be
/// cheap to clone.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
