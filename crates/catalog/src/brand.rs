use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, NetworkId};
use tierstock_events::Event;

/// Stream type tag for brand aggregates in the event store.
pub const BRAND_AGGREGATE_TYPE: &str = "catalog.brand";

/// Brand identifier (network-scoped via `network_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(pub AggregateId);

impl BrandId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BrandId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Brand (a product family variants hang off).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brand {
    id: BrandId,
    network_id: Option<NetworkId>,
    name: String,
    version: u64,
    created: bool,
}

impl Brand {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BrandId) -> Self {
        Self {
            id,
            network_id: None,
            name: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BrandId {
        self.id
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AggregateRoot for Brand {
    type Id = BrandId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterBrand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBrand {
    pub network_id: NetworkId,
    pub brand_id: BrandId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameBrand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameBrand {
    pub network_id: NetworkId,
    pub brand_id: BrandId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrandCommand {
    RegisterBrand(RegisterBrand),
    RenameBrand(RenameBrand),
}

/// Event: BrandRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRegistered {
    pub network_id: NetworkId,
    pub brand_id: BrandId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BrandRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandRenamed {
    pub network_id: NetworkId,
    pub brand_id: BrandId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrandEvent {
    BrandRegistered(BrandRegistered),
    BrandRenamed(BrandRenamed),
}

impl Event for BrandEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BrandEvent::BrandRegistered(_) => "catalog.brand.registered",
            BrandEvent::BrandRenamed(_) => "catalog.brand.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BrandEvent::BrandRegistered(e) => e.occurred_at,
            BrandEvent::BrandRenamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Brand {
    type Command = BrandCommand;
    type Event = BrandEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BrandEvent::BrandRegistered(e) => {
                self.id = e.brand_id;
                self.network_id = Some(e.network_id);
                self.name = e.name.clone();
                self.created = true;
            }
            BrandEvent::BrandRenamed(e) => {
                self.name = e.name.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BrandCommand::RegisterBrand(cmd) => self.handle_register(cmd),
            BrandCommand::RenameBrand(cmd) => self.handle_rename(cmd),
        }
    }
}

impl Brand {
    fn ensure_network(&self, network_id: NetworkId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.network_id != Some(network_id) {
            return Err(DomainError::invariant("network mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterBrand) -> Result<Vec<BrandEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("brand already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("brand name cannot be empty"));
        }

        Ok(vec![BrandEvent::BrandRegistered(BrandRegistered {
            network_id: cmd.network_id,
            brand_id: cmd.brand_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameBrand) -> Result<Vec<BrandEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_network(cmd.network_id)?;
        if self.id != cmd.brand_id {
            return Err(DomainError::invariant("brand_id mismatch"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("brand name cannot be empty"));
        }

        Ok(vec![BrandEvent::BrandRenamed(BrandRenamed {
            network_id: cmd.network_id,
            brand_id: cmd.brand_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
