use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tierstock_catalog::{PriceSet, VariantId};
use tierstock_core::{AggregateId, NetworkId};
use tierstock_events::EventEnvelope;
use tierstock_ledger::{CustodianId, LedgerEvent, LEDGER_AGGREGATE_TYPE};

use crate::read_model::NetworkStore;

use super::event_scope;

/// Read-model key: one row per custodian per variant.
pub type StockPositionKey = (CustodianId, VariantId);

/// Queryable stock read model: current custody row per custodian and
/// variant, with the prices attached at the most recent credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPositionReadModel {
    pub custodian: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
    pub updated_at: DateTime<Utc>,
}

/// Network+aggregate cursor to support at-least-once delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    network_id: NetworkId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("network isolation violation: {0}")]
    NetworkIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock positions projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// network-isolated view of every custody row. This is the listing
/// view behind stock pages; the authoritative availability math runs
/// against rehydrated aggregate state, never against this model.
#[derive(Debug)]
pub struct StockPositionsProjection<S>
where
    S: NetworkStore<StockPositionKey, StockPositionReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> StockPositionsProjection<S>
where
    S: NetworkStore<StockPositionKey, StockPositionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query one custody row.
    pub fn get(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
        variant_id: VariantId,
    ) -> Option<StockPositionReadModel> {
        self.store.get(network_id, &(custodian, variant_id))
    }

    /// List every row in a network.
    pub fn list(&self, network_id: NetworkId) -> Vec<StockPositionReadModel> {
        self.store.list(network_id)
    }

    /// List one custodian's rows.
    pub fn positions_of(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
    ) -> Vec<StockPositionReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(network_id)
            .into_iter()
            .filter(|row| row.custodian == custodian)
            .collect();
        rows.sort_by_key(|row| *row.variant_id.0.as_uuid().as_bytes());
        rows
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces network isolation
    /// - Enforces monotonic sequence per (network, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are
    ///   ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        // Other aggregate streams share the bus; only ledger events
        // move stock.
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
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(StockProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: LedgerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

            let (event_network, ledger_id) = event_scope(&event);
            if event_network != network_id {
                return Err(StockProjectionError::NetworkIsolation(
                    "event network_id does not match envelope network_id".to_string(),
                ));
            }
            if ledger_id.0 != aggregate_id {
                return Err(StockProjectionError::NetworkIsolation(
                    "event ledger_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                LedgerEvent::StockReceived(e) => {
                    self.credit(
                        network_id,
                        e.admin,
                        e.variant_id,
                        e.quantity,
                        e.prices,
                        e.occurred_at,
                    );
                }
                LedgerEvent::StockAllocated(e) => {
                    self.credit(
                        network_id,
                        e.child,
                        e.variant_id,
                        e.quantity,
                        e.prices,
                        e.occurred_at,
                    );
                }
                LedgerEvent::OrderPlaced(e) => {
                    for item in &e.items {
                        self.adjust(network_id, e.agent, item.variant_id, -item.quantity, e.occurred_at);
                    }
                }
                LedgerEvent::OrderDenied(e) => {
                    for item in &e.returned_items {
                        self.adjust(network_id, e.agent, item.variant_id, item.quantity, e.occurred_at);
                    }
                }
                LedgerEvent::RemittanceRecorded(e) => {
                    for row in &e.record.returned {
                        self.zero(network_id, e.record.agent, row.variant_id, e.occurred_at);
                    }
                }
                // Registry, order-stage and request events carry no
                // custody movement.
                _ => {}
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), StockProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per network before rebuilding.
        {
            let mut networks = envs.iter().map(|e| e.network_id()).collect::<Vec<_>>();
            networks.sort_by_key(|n| *n.as_uuid().as_bytes());
            networks.dedup();
            for n in networks {
                self.store.clear_network(n);
            }
        }

        // Deterministic replay order: network, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.network_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }

    fn credit(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
        variant_id: VariantId,
        quantity: i64,
        prices: PriceSet,
        at: DateTime<Utc>,
    ) {
        let mut row = self
            .store
            .get(network_id, &(custodian, variant_id))
            .unwrap_or(StockPositionReadModel {
                custodian,
                variant_id,
                quantity: 0,
                prices: PriceSet::EMPTY,
                updated_at: at,
            });
        row.quantity += quantity;
        row.prices = prices;
        row.updated_at = at;
        self.store.upsert(network_id, (custodian, variant_id), row);
    }

    fn adjust(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
        variant_id: VariantId,
        delta: i64,
        at: DateTime<Utc>,
    ) {
        let mut row = self
            .store
            .get(network_id, &(custodian, variant_id))
            .unwrap_or(StockPositionReadModel {
                custodian,
                variant_id,
                quantity: 0,
                prices: PriceSet::EMPTY,
                updated_at: at,
            });
        row.quantity += delta;
        row.updated_at = at;
        self.store.upsert(network_id, (custodian, variant_id), row);
    }

    fn zero(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
        variant_id: VariantId,
        at: DateTime<Utc>,
    ) {
        if let Some(mut row) = self.store.get(network_id, &(custodian, variant_id)) {
            row.quantity = 0;
            row.updated_at = at;
            self.store.upsert(network_id, (custodian, variant_id), row);
        }
    }
}
