//! Derived availability math (pure, recomputed per decision).
//!
//! A custodian's row quantity is a custody figure: sub-allocating to a
//! child never reduces it. What a custodian may still give away is
//! therefore *derived* on demand:
//!
//! ```text
//! available = max(0, total − allocated_below − reserved)
//! ```
//!
//! - `total`: the custodian's own row.
//! - `allocated_below`: Σ direct children's rows for the variant.
//!   Grandchildren are not counted: their stock already reduced the
//!   intermediate child's availability, and the child's own row (which
//!   never shrank) is what counts here.
//! - `reserved`: Σ item quantities of client orders placed by any
//!   descendant agent that are still `pending` with no approval stage.
//!   Placement debits the agent's row, shrinking an ancestor's
//!   `allocated_below`, so this term keeps the in-flight stock counted
//!   until an approver picks the order up; from the first stage on the
//!   deduction is treated as permanent and the term drops away.
//!
//! These functions are called inside command handling on freshly
//! rehydrated state. They must never be served from a cached
//! projection for a decision; staleness here is the primary source of
//! overselling.

use serde::{Deserialize, Serialize};

use tierstock_catalog::VariantId;

use crate::ids::CustodianId;
use crate::ledger::CustodyLedger;

/// Full availability breakdown for one (custodian, variant) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub total: i64,
    pub allocated_below: i64,
    pub reserved: i64,
    pub available: i64,
}

/// Compute the availability breakdown from current aggregate state.
pub fn availability_of(
    ledger: &CustodyLedger,
    custodian: CustodianId,
    variant: VariantId,
) -> Availability {
    let total = ledger.holding_quantity(custodian, variant);

    let allocated_below = ledger
        .direct_children(custodian)
        .map(|child| ledger.holding_quantity(child, variant))
        .sum::<i64>();

    let reserved = ledger
        .orders()
        .filter(|order| order.is_unresolved_reservation())
        .filter(|order| ledger.is_strict_descendant(order.agent, custodian))
        .flat_map(|order| order.items.iter())
        .filter(|item| item.variant_id == variant)
        .map(|item| item.quantity)
        .sum::<i64>();

    Availability {
        total,
        allocated_below,
        reserved,
        available: (total - allocated_below - reserved).max(0),
    }
}

/// Shorthand for the single number allocation decisions compare against.
pub fn available_quantity(
    ledger: &CustodyLedger,
    custodian: CustodianId,
    variant: VariantId,
) -> i64 {
    availability_of(ledger, custodian, variant).available
}
