use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_catalog::VariantId;
use tierstock_core::Entity;

use crate::ids::{CustodianId, OrderId, RemittanceId};

/// Unsold units returned at remittance time, per variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedStock {
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Immutable snapshot closing one agent's selling cycle to one leader.
///
/// Created once per remittance, never mutated. The aggregates
/// (`items_remitted`, `total_units`, `orders_count`, `total_revenue`)
/// are frozen at recording time so the audit record stands on its own
/// even if later projections are rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceRecord {
    pub id: RemittanceId,
    pub agent: CustodianId,
    pub leader: CustodianId,
    /// Rows zeroed by this remittance, sorted by variant.
    pub returned: Vec<ReturnedStock>,
    /// The sold, now-remitted orders.
    pub order_ids: Vec<OrderId>,
    /// Distinct variants with leftover stock returned.
    pub items_remitted: u32,
    pub total_units: i64,
    pub orders_count: u32,
    /// Σ order.total_amount over the included orders.
    pub total_revenue: u64,
    /// Opaque reference to the captured signature (object-store URL).
    pub signature_ref: String,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for RemittanceRecord {
    type Id = RemittanceId;

    fn id(&self) -> &RemittanceId {
        &self.id
    }
}
