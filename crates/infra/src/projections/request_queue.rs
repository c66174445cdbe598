use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tierstock_catalog::VariantId;
use tierstock_core::{AggregateId, NetworkId};
use tierstock_events::EventEnvelope;
use tierstock_ledger::{
    CustodianId, LedgerEvent, RequestId, RequestLevel, RequestStatus, LEDGER_AGGREGATE_TYPE,
};

use crate::read_model::NetworkStore;

use super::event_scope;

/// Queryable stock request view, one row per request (forwarded copies
/// included, linked through `parent_request` / `forwarded_child`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReadModel {
    pub request_id: RequestId,
    pub requester: CustodianId,
    pub target: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub level: RequestLevel,
    pub status: RequestStatus,
    pub parent_request: Option<RequestId>,
    pub forwarded_child: Option<RequestId>,
    pub requester_notes: Option<String>,
    pub responder_notes: Option<String>,
    pub denial_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    network_id: NetworkId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RequestProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("network isolation violation: {0}")]
    NetworkIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Pending-request queue projection.
///
/// Feeds the review screens: a leader sees the agent requests targeting
/// them, the admin sees forwarded copies. Rows linger after resolution
/// as request history.
#[derive(Debug)]
pub struct RequestQueueProjection<S>
where
    S: NetworkStore<RequestId, RequestReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RequestQueueProjection<S>
where
    S: NetworkStore<RequestId, RequestReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, network_id: NetworkId, request_id: RequestId) -> Option<RequestReadModel> {
        self.store.get(network_id, &request_id)
    }

    pub fn list(&self, network_id: NetworkId) -> Vec<RequestReadModel> {
        self.store.list(network_id)
    }

    /// Requests currently awaiting a decision from `target`.
    ///
    /// A forwarded original is excluded: it resolves with its forwarded
    /// copy, not at its own level.
    pub fn pending_for(&self, network_id: NetworkId, target: CustodianId) -> Vec<RequestReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(network_id)
            .into_iter()
            .filter(|row| {
                row.target == target
                    && row.status == RequestStatus::Pending
                    && row.forwarded_child.is_none()
            })
            .collect();
        rows.sort_by_key(|row| row.requested_at);
        rows
    }

    /// Apply a published envelope into the projection. Idempotent for
    /// at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), RequestProjectionError> {
        // Other aggregate streams share the bus; only ledger events
        // carry requests.
        if envelope.aggregate_type() != LEDGER_AGGREGATE_TYPE {
            return Ok(());
        }

        let network_id = envelope.network_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                network_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| RequestProjectionError::Deserialize(e.to_string()))?;

            let (event_network, ledger_id) = event_scope(&event);
            if event_network != network_id {
                return Err(RequestProjectionError::NetworkIsolation(
                    "event network_id does not match envelope network_id".to_string(),
                ));
            }
            if ledger_id.0 != aggregate_id {
                return Err(RequestProjectionError::NetworkIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                LedgerEvent::RequestSubmitted(e) => {
                    self.store.upsert(
                        network_id,
                        e.request_id,
                        RequestReadModel {
                            request_id: e.request_id,
                            requester: e.requester,
                            target: e.target,
                            variant_id: e.variant_id,
                            quantity: e.quantity,
                            level: e.level,
                            status: RequestStatus::Pending,
                            parent_request: e.parent_request,
                            forwarded_child: None,
                            requester_notes: e.requester_notes,
                            responder_notes: None,
                            denial_reason: None,
                            requested_at: e.occurred_at,
                            responded_at: None,
                        },
                    );
                }
                LedgerEvent::RequestApproved(e) => {
                    if let Some(mut row) = self.store.get(network_id, &e.request_id) {
                        row.status = RequestStatus::Approved;
                        row.responder_notes = e.responder_notes;
                        row.responded_at = Some(e.occurred_at);
                        self.store.upsert(network_id, e.request_id, row);
                    }
                }
                LedgerEvent::RequestForwarded(e) => {
                    // The copy inherits variant, quantity and notes from
                    // the original row.
                    if let Some(mut original) = self.store.get(network_id, &e.request_id) {
                        self.store.upsert(
                            network_id,
                            e.child_request_id,
                            RequestReadModel {
                                request_id: e.child_request_id,
                                requester: e.forwarded_by,
                                target: e.target,
                                variant_id: original.variant_id,
                                quantity: original.quantity,
                                level: RequestLevel::LeaderToAdmin,
                                status: RequestStatus::Pending,
                                parent_request: Some(e.request_id),
                                forwarded_child: None,
                                requester_notes: original.requester_notes.clone(),
                                responder_notes: None,
                                denial_reason: None,
                                requested_at: e.occurred_at,
                                responded_at: None,
                            },
                        );
                        original.forwarded_child = Some(e.child_request_id);
                        self.store.upsert(network_id, e.request_id, original);
                    }
                }
                LedgerEvent::RequestDenied(e) => {
                    if let Some(mut row) = self.store.get(network_id, &e.request_id) {
                        row.status = RequestStatus::Denied;
                        row.denial_reason = Some(e.denial_reason);
                        row.responded_at = Some(e.occurred_at);
                        self.store.upsert(network_id, e.request_id, row);
                    }
                }
                LedgerEvent::RequestCancelled(e) => {
                    let mut parent = None;
                    if let Some(mut row) = self.store.get(network_id, &e.request_id) {
                        row.status = RequestStatus::Cancelled;
                        row.responded_at = Some(e.occurred_at);
                        parent = row.parent_request;
                        self.store.upsert(network_id, e.request_id, row);
                    }
                    // A cancelled copy hands the original back to its
                    // own queue.
                    if let Some(parent_id) = parent {
                        if let Some(mut original) = self.store.get(network_id, &parent_id) {
                            if original.status == RequestStatus::Pending {
                                original.forwarded_child = None;
                                self.store.upsert(network_id, parent_id, original);
                            }
                        }
                    }
                }
                _ => {}
            }

            cursors.insert(key, seq);
        }

        Ok(())
    }
}
