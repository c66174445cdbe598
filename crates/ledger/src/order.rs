use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_catalog::VariantId;
use tierstock_core::Entity;

use crate::ids::{ClientId, CustodianId, OrderId};

/// Resolution of a client order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Denied,
}

/// How far up the approval chain an order has progressed.
///
/// Stage is orthogonal to status until the end: reaching
/// `AdminApproved` is what flips status to `Approved`. While the stage
/// is `None` the order still counts as an unresolved reservation in
/// ancestor availability; once a stage is set the stock is treated as
/// permanently deducted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStage {
    None,
    LeaderApproved,
    AdminApproved,
}

/// One line of a client order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Price charged to the client, smallest currency unit.
    pub unit_price: u64,
}

/// A sale made by an agent against a client.
///
/// Placement debits the agent's holdings immediately: an order is a
/// firm reservation, not a soft hold. Stage transitions and remittance
/// never touch holdings again; denial returns the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOrder {
    pub id: OrderId,
    pub agent: CustodianId,
    pub client: ClientId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub stage: OrderStage,
    pub remitted: bool,
    pub placed_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<CustodianId>,
    pub denial_reason: Option<String>,
}

impl Entity for ClientOrder {
    type Id = OrderId;

    fn id(&self) -> &OrderId {
        &self.id
    }
}

impl ClientOrder {
    /// Σ quantity × unit price over all items.
    pub fn total_amount(&self) -> u64 {
        self.items
            .iter()
            .map(|item| item.quantity as u64 * item.unit_price)
            .sum()
    }

    pub fn is_resolved(&self) -> bool {
        self.status != OrderStatus::Pending
    }

    /// Whether ancestor availability must still treat this order as a
    /// reservation: unresolved and not yet picked up by any approver.
    pub fn is_unresolved_reservation(&self) -> bool {
        self.status == OrderStatus::Pending && self.stage == OrderStage::None
    }
}
