use tierstock_core::NetworkId;
use tierstock_ledger::CustodianId;

/// Network context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    network_id: NetworkId,
}

impl NetworkContext {
    pub fn new(network_id: NetworkId) -> Self {
        Self { network_id }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }
}

/// Actor context for a request: which custodian is acting.
///
/// The ledger authorizes per command (tier and ancestry checks), so the
/// API only has to establish *who* is calling, not what they may do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor_id: CustodianId,
}

impl ActorContext {
    pub fn new(actor_id: CustodianId) -> Self {
        Self { actor_id }
    }

    pub fn actor_id(&self) -> CustodianId {
        self.actor_id
    }
}
