use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_catalog::VariantId;
use tierstock_core::Entity;

use crate::ids::{CustodianId, RequestId};

/// Which hop of the chain a request travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLevel {
    AgentToLeader,
    LeaderToAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Cancelled,
}

/// A pull request from a lower custodian to its parent.
///
/// Forwarding is structural, not a status: a leader forwarding an
/// agent's request creates a *new* `LeaderToAdmin` request linked via
/// `parent_request`, while the original stays `Pending` until the
/// forwarded copy resolves. While that link is unresolved the original
/// cannot be decided at its own level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequest {
    pub id: RequestId,
    pub requester: CustodianId,
    /// The custodian whose decision resolves this request.
    pub target: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub level: RequestLevel,
    pub status: RequestStatus,
    /// Set on a forwarded copy: the original request it was raised for.
    pub parent_request: Option<RequestId>,
    /// Set on an original that has been forwarded: the copy one level up.
    pub forwarded_child: Option<RequestId>,
    pub requester_notes: Option<String>,
    pub responder_notes: Option<String>,
    pub denial_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Entity for StockRequest {
    type Id = RequestId;

    fn id(&self) -> &RequestId {
        &self.id
    }
}

impl StockRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// True while this request's fate rests with a forwarded copy one
    /// level up; it cannot be approved or denied at its own level.
    pub fn awaiting_forward(&self) -> bool {
        self.is_pending() && self.forwarded_child.is_some()
    }
}
