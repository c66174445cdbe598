use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CustodianId;
use crate::tier::CustodianTier;

/// Registry row for one custodian in the network.
///
/// The ledger mirrors the org structure (who sits under whom) because
/// the availability math needs it. Identity beyond the display name
/// (accounts, login) stays with the external session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianRecord {
    pub tier: CustodianTier,
    /// `None` only for the admin root.
    pub parent: Option<CustodianId>,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

impl CustodianRecord {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
