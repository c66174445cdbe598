//! Custodian tiers and the per-tier dispatch table.
//!
//! Tier-specific behavior is expressed as methods on the enum rather
//! than scattered conditionals: which price fields an allocation *to*
//! this tier must carry, at which level this tier raises requests, and
//! which tier its parent must have. Adding a tier means the compiler
//! points at every rule that needs a row.

use serde::{Deserialize, Serialize};

use tierstock_catalog::PriceField;

use crate::request::RequestLevel;

/// Position of a custodian in the custody chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustodianTier {
    /// Central warehouse; the network root. Receives external stock,
    /// never receives allocations.
    Admin,
    /// Regional custodian between the admin and its agents.
    Leader,
    /// Field seller; the only tier that places client orders.
    Agent,
}

impl CustodianTier {
    /// Price fields an allocation **to** this tier must carry (> 0).
    ///
    /// Stock becomes sellable as it moves down the chain, so the
    /// receiving tier dictates the pricing: a leader needs its dealer
    /// price and the onward selling price, an agent needs the selling
    /// price it will charge clients. The admin is never an allocation
    /// destination.
    pub fn required_price_fields(self) -> &'static [PriceField] {
        match self {
            CustodianTier::Admin => &[],
            CustodianTier::Leader => &[PriceField::DealerPrice, PriceField::SellingPrice],
            CustodianTier::Agent => &[PriceField::SellingPrice],
        }
    }

    /// The level at which this tier raises stock requests, if any.
    pub fn request_level(self) -> Option<RequestLevel> {
        match self {
            CustodianTier::Admin => None,
            CustodianTier::Leader => Some(RequestLevel::LeaderToAdmin),
            CustodianTier::Agent => Some(RequestLevel::AgentToLeader),
        }
    }

    /// The tier a custodian's parent must have. `None` for the root.
    pub fn parent_tier(self) -> Option<CustodianTier> {
        match self {
            CustodianTier::Admin => None,
            CustodianTier::Leader => Some(CustodianTier::Admin),
            CustodianTier::Agent => Some(CustodianTier::Leader),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CustodianTier::Admin => "admin",
            CustodianTier::Leader => "leader",
            CustodianTier::Agent => "agent",
        }
    }
}

impl core::fmt::Display for CustodianTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_to_a_sellable_tier_requires_a_selling_price() {
        assert!(
            CustodianTier::Leader
                .required_price_fields()
                .contains(&PriceField::SellingPrice)
        );
        assert!(
            CustodianTier::Agent
                .required_price_fields()
                .contains(&PriceField::SellingPrice)
        );
        assert!(CustodianTier::Admin.required_price_fields().is_empty());
    }

    #[test]
    fn leaders_additionally_require_a_dealer_price() {
        assert!(
            CustodianTier::Leader
                .required_price_fields()
                .contains(&PriceField::DealerPrice)
        );
        assert!(
            !CustodianTier::Agent
                .required_price_fields()
                .contains(&PriceField::DealerPrice)
        );
    }

    #[test]
    fn request_levels_follow_the_chain() {
        assert_eq!(
            CustodianTier::Agent.request_level(),
            Some(RequestLevel::AgentToLeader)
        );
        assert_eq!(
            CustodianTier::Leader.request_level(),
            Some(RequestLevel::LeaderToAdmin)
        );
        assert_eq!(CustodianTier::Admin.request_level(), None);
    }

    #[test]
    fn parent_tiers_form_the_three_level_chain() {
        assert_eq!(CustodianTier::Admin.parent_tier(), None);
        assert_eq!(
            CustodianTier::Leader.parent_tier(),
            Some(CustodianTier::Admin)
        );
        assert_eq!(
            CustodianTier::Agent.parent_tier(),
            Some(CustodianTier::Leader)
        );
    }
}
