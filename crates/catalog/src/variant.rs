use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, NetworkId};
use tierstock_events::Event;

use crate::brand::BrandId;
use crate::price::PriceSet;

/// Stream type tag for variant aggregates in the event store.
pub const VARIANT_AGGREGATE_TYPE: &str = "catalog.variant";

/// Variant identifier (network-scoped via `network_id` fields in events/commands).
///
/// A variant is the unit stock moves in: holdings, allocations, orders
/// and requests all reference a `VariantId`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub AggregateId);

impl VariantId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VariantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Variant (a sellable SKU under a brand).
///
/// Identity (the owning brand) is immutable after registration; the
/// display name and the default price set are mutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    id: VariantId,
    network_id: Option<NetworkId>,
    brand_id: Option<BrandId>,
    name: String,
    prices: PriceSet,
    version: u64,
    created: bool,
}

impl Variant {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: VariantId) -> Self {
        Self {
            id,
            network_id: None,
            brand_id: None,
            name: String::new(),
            prices: PriceSet::EMPTY,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VariantId {
        self.id
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn brand_id(&self) -> Option<BrandId> {
        self.brand_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prices(&self) -> &PriceSet {
        &self.prices
    }
}

impl AggregateRoot for Variant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterVariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterVariant {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub brand_id: BrandId,
    pub name: String,
    pub prices: Option<PriceSet>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameVariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameVariant {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetVariantPrices (replaces the default price set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVariantPrices {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantCommand {
    RegisterVariant(RegisterVariant),
    RenameVariant(RenameVariant),
    SetVariantPrices(SetVariantPrices),
}

/// Event: VariantRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRegistered {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub brand_id: BrandId,
    pub name: String,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRenamed {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VariantPricesSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPricesSet {
    pub network_id: NetworkId,
    pub variant_id: VariantId,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantEvent {
    VariantRegistered(VariantRegistered),
    VariantRenamed(VariantRenamed),
    VariantPricesSet(VariantPricesSet),
}

impl Event for VariantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VariantEvent::VariantRegistered(_) => "catalog.variant.registered",
            VariantEvent::VariantRenamed(_) => "catalog.variant.renamed",
            VariantEvent::VariantPricesSet(_) => "catalog.variant.prices_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VariantEvent::VariantRegistered(e) => e.occurred_at,
            VariantEvent::VariantRenamed(e) => e.occurred_at,
            VariantEvent::VariantPricesSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Variant {
    type Command = VariantCommand;
    type Event = VariantEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VariantEvent::VariantRegistered(e) => {
                self.id = e.variant_id;
                self.network_id = Some(e.network_id);
                self.brand_id = Some(e.brand_id);
                self.name = e.name.clone();
                self.prices = e.prices;
                self.created = true;
            }
            VariantEvent::VariantRenamed(e) => {
                self.name = e.name.clone();
            }
            VariantEvent::VariantPricesSet(e) => {
                self.prices = e.prices;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VariantCommand::RegisterVariant(cmd) => self.handle_register(cmd),
            VariantCommand::RenameVariant(cmd) => self.handle_rename(cmd),
            VariantCommand::SetVariantPrices(cmd) => self.handle_set_prices(cmd),
        }
    }
}

impl Variant {
    fn ensure_network(&self, network_id: NetworkId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.network_id != Some(network_id) {
            return Err(DomainError::invariant("network mismatch"));
        }
        Ok(())
    }

    fn ensure_variant_id(&self, variant_id: VariantId) -> Result<(), DomainError> {
        if self.id != variant_id {
            return Err(DomainError::invariant("variant_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterVariant) -> Result<Vec<VariantEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("variant already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("variant name cannot be empty"));
        }
        let prices = cmd.prices.unwrap_or_default();
        prices.validate(cmd.variant_id)?;

        Ok(vec![VariantEvent::VariantRegistered(VariantRegistered {
            network_id: cmd.network_id,
            variant_id: cmd.variant_id,
            brand_id: cmd.brand_id,
            name: cmd.name.clone(),
            prices,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameVariant) -> Result<Vec<VariantEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_network(cmd.network_id)?;
        self.ensure_variant_id(cmd.variant_id)?;
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("variant name cannot be empty"));
        }

        Ok(vec![VariantEvent::VariantRenamed(VariantRenamed {
            network_id: cmd.network_id,
            variant_id: cmd.variant_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_prices(&self, cmd: &SetVariantPrices) -> Result<Vec<VariantEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_network(cmd.network_id)?;
        self.ensure_variant_id(cmd.variant_id)?;
        cmd.prices.validate(cmd.variant_id)?;

        Ok(vec![VariantEvent::VariantPricesSet(VariantPricesSet {
            network_id: cmd.network_id,
            variant_id: cmd.variant_id,
            prices: cmd.prices,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierstock_core::AggregateId;

    fn test_network_id() -> NetworkId {
        NetworkId::new()
    }

    fn test_variant_id() -> VariantId {
        VariantId::new(AggregateId::new())
    }

    fn test_brand_id() -> BrandId {
        BrandId::new(AggregateId::new())
    }

    fn registered_variant(network_id: NetworkId, variant_id: VariantId) -> Variant {
        let mut variant = Variant::empty(variant_id);
        let events = variant
            .handle(&VariantCommand::RegisterVariant(RegisterVariant {
                network_id,
                variant_id,
                brand_id: test_brand_id(),
                name: "Copper Kettle 1L".to_string(),
                prices: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        variant
    }

    #[test]
    fn register_variant_defaults_to_empty_prices() {
        let variant = registered_variant(test_network_id(), test_variant_id());
        assert!(variant.prices().is_empty());
        assert_eq!(variant.version(), 1);
    }

    #[test]
    fn register_variant_rejects_zero_price() {
        let variant_id = test_variant_id();
        let variant = Variant::empty(variant_id);
        let err = variant
            .handle(&VariantCommand::RegisterVariant(RegisterVariant {
                network_id: test_network_id(),
                variant_id,
                brand_id: test_brand_id(),
                name: "Copper Kettle 1L".to_string(),
                prices: Some(PriceSet {
                    selling_price: Some(0),
                    ..PriceSet::EMPTY
                }),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn set_prices_replaces_the_whole_set() {
        let network_id = test_network_id();
        let variant_id = test_variant_id();
        let mut variant = registered_variant(network_id, variant_id);

        let first = PriceSet {
            unit_cost: Some(3000),
            dealer_price: Some(4000),
            selling_price: Some(5000),
            retail_price: Some(6500),
        };
        let events = variant
            .handle(&VariantCommand::SetVariantPrices(SetVariantPrices {
                network_id,
                variant_id,
                prices: first,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert_eq!(variant.prices(), &first);

        // A later set with fewer fields clears the omitted ones.
        let second = PriceSet {
            selling_price: Some(5500),
            ..PriceSet::EMPTY
        };
        let events = variant
            .handle(&VariantCommand::SetVariantPrices(SetVariantPrices {
                network_id,
                variant_id,
                prices: second,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        variant.apply(&events[0]);
        assert_eq!(variant.prices(), &second);
        assert_eq!(variant.prices().unit_cost, None);
    }

    #[test]
    fn rename_keeps_brand_identity() {
        let network_id = test_network_id();
        let variant_id = test_variant_id();
        let mut variant = registered_variant(network_id, variant_id);
        let brand_before = variant.brand_id();

        let events = variant
            .handle(&VariantCommand::RenameVariant(RenameVariant {
                network_id,
                variant_id,
                name: "Copper Kettle 1L (matte)".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        variant.apply(&events[0]);

        assert_eq!(variant.name(), "Copper Kettle 1L (matte)");
        assert_eq!(variant.brand_id(), brand_before);
    }

    #[test]
    fn commands_on_unregistered_variant_are_not_found() {
        let variant = Variant::empty(test_variant_id());
        let err = variant
            .handle(&VariantCommand::SetVariantPrices(SetVariantPrices {
                network_id: test_network_id(),
                variant_id: variant.id_typed(),
                prices: PriceSet::EMPTY,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }
}
