//! Record identifiers scoped inside the custody ledger aggregate.
//!
//! These identify rows *within* one ledger stream (custodians, orders,
//! requests, remittances), not aggregate streams of their own. They
//! derive `Ord` so aggregate state can live in `BTreeMap`s, where
//! iteration order is deterministic, which keeps event payloads built
//! from state (remittance snapshots, cascades) replay-stable.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tierstock_core::DomainError;

macro_rules! record_id {
    ($(#[$doc:meta])* $t:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier (UUIDv7, time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

record_id!(
    /// A custodian in the network: the admin warehouse, a leader, or an
    /// agent. Doubles as the acting principal on audited commands.
    CustodianId,
    "CustodianId"
);

record_id!(
    /// An external client a sale is made against (registry lives outside
    /// the engine; the id is opaque here).
    ClientId,
    "ClientId"
);

record_id!(
    /// A client order placed by an agent.
    OrderId,
    "OrderId"
);

record_id!(
    /// A stock request raised by a lower tier against a higher tier.
    RequestId,
    "RequestId"
);

record_id!(
    /// One immutable remittance record closing an agent's cycle.
    RemittanceId,
    "RemittanceId"
);
