use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use tierstock_core::{AggregateId, NetworkId};
use tierstock_events::EventEnvelope;
use tierstock_ledger::{
    CustodianId, LedgerEvent, RemittanceId, RemittanceRecord, LEDGER_AGGREGATE_TYPE,
};

use crate::read_model::NetworkStore;

use super::event_scope;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    network_id: NetworkId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RemittanceProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("network isolation violation: {0}")]
    NetworkIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Remittance history projection.
///
/// The recorded event already carries the frozen [`RemittanceRecord`],
/// so this projection stores it as-is. No row is ever updated after
/// insertion.
#[derive(Debug)]
pub struct RemittanceLogProjection<S>
where
    S: NetworkStore<RemittanceId, RemittanceRecord>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> RemittanceLogProjection<S>
where
    S: NetworkStore<RemittanceId, RemittanceRecord>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, network_id: NetworkId, id: RemittanceId) -> Option<RemittanceRecord> {
        self.store.get(network_id, &id)
    }

    pub fn list(&self, network_id: NetworkId) -> Vec<RemittanceRecord> {
        let mut rows = self.store.list(network_id);
        rows.sort_by_key(|r| r.recorded_at);
        rows
    }

    /// Remittances recorded against one agent, oldest first.
    pub fn history_of(&self, network_id: NetworkId, agent: CustodianId) -> Vec<RemittanceRecord> {
        let mut rows: Vec<_> = self
            .store
            .list(network_id)
            .into_iter()
            .filter(|r| r.agent == agent)
            .collect();
        rows.sort_by_key(|r| r.recorded_at);
        rows
    }

    /// Apply a published envelope into the projection. Idempotent for
    /// at-least-once delivery.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), RemittanceProjectionError> {
        // Other aggregate streams share the bus; only ledger events
        // carry remittances.
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
                return Err(RemittanceProjectionError::NonMonotonicSequence { last, found: seq });
            }
            if seq <= last {
                return Ok(());
            }
            if seq != last + 1 && last != 0 {
                return Err(RemittanceProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| RemittanceProjectionError::Deserialize(e.to_string()))?;

            let (event_network, ledger_id) = event_scope(&event);
            if event_network != network_id {
                return Err(RemittanceProjectionError::NetworkIsolation(
                    "event network_id does not match envelope network_id".to_string(),
                ));
            }
            if ledger_id.0 != aggregate_id {
                return Err(RemittanceProjectionError::NetworkIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            if let LedgerEvent::RemittanceRecorded(e) = event {
                self.store.upsert(network_id, e.record.id, e.record);
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
    use chrono::Utc;
    use std::sync::Arc;
    use tierstock_catalog::VariantId;
    use tierstock_events::Event;
    use tierstock_ledger::{
        LedgerId, OrderId, RemittanceRecorded, ReturnedStock, LEDGER_AGGREGATE_TYPE,
    };
    use uuid::Uuid;

    fn test_record(agent: CustodianId) -> RemittanceRecord {
        RemittanceRecord {
            id: RemittanceId::new(),
            agent,
            leader: CustodianId::new(),
            returned: vec![ReturnedStock {
                variant_id: VariantId::new(tierstock_core::AggregateId::new()),
                quantity: 3,
            }],
            order_ids: vec![OrderId::new()],
            items_remitted: 1,
            total_units: 3,
            orders_count: 1,
            total_revenue: 4500,
            signature_ref: "sig://remit/1".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn recorded_event_inserts_the_frozen_record() {
        let projection = RemittanceLogProjection::new(Arc::new(InMemoryNetworkStore::new()));
        let network_id = NetworkId::new();
        let ledger_id = LedgerId::new(tierstock_core::AggregateId::new());
        let agent = CustodianId::new();
        let record = test_record(agent);
        let remittance_id = record.id;

        let event = LedgerEvent::RemittanceRecorded(RemittanceRecorded {
            network_id,
            ledger_id,
            record: record.clone(),
            occurred_at: record.recorded_at,
        });
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            network_id,
            ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            event.event_type(),
            1,
            serde_json::to_value(&event).unwrap(),
        );

        projection.apply_envelope(&env).unwrap();
        // Replay is a no-op.
        projection.apply_envelope(&env).unwrap();

        assert_eq!(projection.get(network_id, remittance_id), Some(record));
        assert_eq!(projection.history_of(network_id, agent).len(), 1);
        assert!(projection
            .history_of(network_id, CustodianId::new())
            .is_empty());
    }
}
