use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tierstock_core::{AggregateId, NetworkId};
use tierstock_events::EventEnvelope;
use tierstock_ledger::{
    ClientId, CustodianId, LedgerEvent, OrderId, OrderItem, OrderStage, OrderStatus,
    LEDGER_AGGREGATE_TYPE,
};

use crate::read_model::NetworkStore;

use super::event_scope;

/// Queryable order view: one row per client order, kept through the
/// whole lifecycle (placement, stage advances, resolution, remittance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub agent: CustodianId,
    pub client: ClientId,
    pub items: Vec<OrderItem>,
    pub total_amount: u64,
    pub status: OrderStatus,
    pub stage: OrderStage,
    pub remitted: bool,
    pub denial_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    network_id: NetworkId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OrderProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("network isolation violation: {0}")]
    NetworkIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Order log projection.
///
/// Backs the approval dashboards: leaders and the admin read pending
/// orders from here, agents read their own history. Rows are never
/// deleted; remittance only flips the `remitted` flag.
#[derive(Debug)]
pub struct OrderLogProjection<S>
where
    S: NetworkStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OrderLogProjection<S>
where
    S: NetworkStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, network_id: NetworkId, order_id: OrderId) -> Option<OrderReadModel> {
        self.store.get(network_id, &order_id)
    }

    pub fn list(&self, network_id: NetworkId) -> Vec<OrderReadModel> {
        self.store.list(network_id)
    }

    /// One agent's orders, oldest first.
    pub fn orders_of(&self, network_id: NetworkId, agent: CustodianId) -> Vec<OrderReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(network_id)
            .into_iter()
            .filter(|row| row.agent == agent)
            .collect();
        rows.sort_by_key(|row| row.placed_at);
        rows
    }

    /// Orders still awaiting a decision, oldest first.
    pub fn pending(&self, network_id: NetworkId) -> Vec<OrderReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(network_id)
            .into_iter()
            .filter(|row| row.status == OrderStatus::Pending)
            .collect();
        rows.sort_by_key(|row| row.placed_at);
        rows
    }

    /// Apply a published envelope into the projection. Idempotent for
    /// at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderProjectionError> {
        // Other aggregate streams share the bus; only ledger events
        // carry orders.
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
                return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| OrderProjectionError::Deserialize(e.to_string()))?;

            let (event_network, ledger_id) = event_scope(&event);
            if event_network != network_id {
                return Err(OrderProjectionError::NetworkIsolation(
                    "event network_id does not match envelope network_id".to_string(),
                ));
            }
            if ledger_id.0 != aggregate_id {
                return Err(OrderProjectionError::NetworkIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                LedgerEvent::OrderPlaced(e) => {
                    let total_amount = e
                        .items
                        .iter()
                        .map(|item| item.quantity as u64 * item.unit_price)
                        .sum();
                    self.store.upsert(
                        network_id,
                        e.order_id,
                        OrderReadModel {
                            order_id: e.order_id,
                            agent: e.agent,
                            client: e.client,
                            items: e.items,
                            total_amount,
                            status: OrderStatus::Pending,
                            stage: OrderStage::None,
                            remitted: false,
                            denial_reason: None,
                            placed_at: e.occurred_at,
                            updated_at: e.occurred_at,
                        },
                    );
                }
                LedgerEvent::OrderStageAdvanced(e) => {
                    if let Some(mut row) = self.store.get(network_id, &e.order_id) {
                        row.stage = e.stage;
                        if e.stage == OrderStage::AdminApproved {
                            row.status = OrderStatus::Approved;
                        }
                        row.updated_at = e.occurred_at;
                        self.store.upsert(network_id, e.order_id, row);
                    }
                }
                LedgerEvent::OrderDenied(e) => {
                    if let Some(mut row) = self.store.get(network_id, &e.order_id) {
                        row.status = OrderStatus::Denied;
                        row.denial_reason = Some(e.reason);
                        row.updated_at = e.occurred_at;
                        self.store.upsert(network_id, e.order_id, row);
                    }
                }
                LedgerEvent::RemittanceRecorded(e) => {
                    for order_id in &e.record.order_ids {
                        if let Some(mut row) = self.store.get(network_id, order_id) {
                            row.remitted = true;
                            row.updated_at = e.occurred_at;
                            self.store.upsert(network_id, *order_id, row);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryNetworkStore;
    use std::sync::Arc;
    use tierstock_catalog::VariantId;
    use tierstock_events::Event;
    use tierstock_ledger::{LedgerId, OrderPlaced, OrderStageAdvanced, LEDGER_AGGREGATE_TYPE};
    use uuid::Uuid;

    fn envelope(event: LedgerEvent, seq: u64) -> EventEnvelope<JsonValue> {
        let (network_id, ledger_id) = super::super::event_scope(&event);
        EventEnvelope::new(
            Uuid::now_v7(),
            network_id,
            ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            event.event_type(),
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn projection() -> OrderLogProjection<Arc<InMemoryNetworkStore<OrderId, OrderReadModel>>> {
        OrderLogProjection::new(Arc::new(InMemoryNetworkStore::new()))
    }

    #[test]
    fn placement_then_admin_approval_resolves_the_row() {
        let projection = projection();
        let network_id = NetworkId::new();
        let ledger_id = LedgerId::new(tierstock_core::AggregateId::new());
        let order_id = OrderId::new();
        let agent = CustodianId::new();

        projection
            .apply_envelope(&envelope(
                LedgerEvent::OrderPlaced(OrderPlaced {
                    network_id,
                    ledger_id,
                    order_id,
                    agent,
                    client: ClientId::new(),
                    items: vec![OrderItem {
                        variant_id: VariantId::new(tierstock_core::AggregateId::new()),
                        quantity: 4,
                        unit_price: 250,
                    }],
                    occurred_at: Utc::now(),
                }),
                1,
            ))
            .unwrap();

        let row = projection.get(network_id, order_id).unwrap();
        assert_eq!(row.status, OrderStatus::Pending);
        assert_eq!(row.total_amount, 1000);
        assert_eq!(projection.pending(network_id).len(), 1);

        projection
            .apply_envelope(&envelope(
                LedgerEvent::OrderStageAdvanced(OrderStageAdvanced {
                    network_id,
                    ledger_id,
                    order_id,
                    stage: OrderStage::LeaderApproved,
                    advanced_by: CustodianId::new(),
                    occurred_at: Utc::now(),
                }),
                2,
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                LedgerEvent::OrderStageAdvanced(OrderStageAdvanced {
                    network_id,
                    ledger_id,
                    order_id,
                    stage: OrderStage::AdminApproved,
                    advanced_by: CustodianId::new(),
                    occurred_at: Utc::now(),
                }),
                3,
            ))
            .unwrap();

        let row = projection.get(network_id, order_id).unwrap();
        assert_eq!(row.status, OrderStatus::Approved);
        assert_eq!(row.stage, OrderStage::AdminApproved);
        assert!(projection.pending(network_id).is_empty());
    }

    #[test]
    fn duplicate_envelopes_are_ignored() {
        let projection = projection();
        let network_id = NetworkId::new();
        let ledger_id = LedgerId::new(tierstock_core::AggregateId::new());
        let order_id = OrderId::new();

        let env = envelope(
            LedgerEvent::OrderPlaced(OrderPlaced {
                network_id,
                ledger_id,
                order_id,
                agent: CustodianId::new(),
                client: ClientId::new(),
                items: vec![],
                occurred_at: Utc::now(),
            }),
            1,
        );
        projection.apply_envelope(&env).unwrap();
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.list(network_id).len(), 1);
    }
}
