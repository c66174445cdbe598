//! The operation surface over the custody ledger.
//!
//! [`DistributionEngine`] wraps the command dispatcher and exposes one
//! method per external operation. Every mutating call runs a bounded
//! retry loop on optimistic-concurrency conflicts: the dispatcher
//! rehydrates before each attempt, so a retried operation re-runs its
//! availability check against the winner's committed state. Exhausted
//! retries surface the conflict to the caller.
//!
//! Read accessors rehydrate the aggregate from the stream on every
//! call. Nothing here reads a projection: read models serve listing
//! endpoints, decisions and authoritative lookups run against current
//! committed state.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::debug;

use tierstock_catalog::{PriceSet, VariantId};
use tierstock_core::{Aggregate, AggregateId, NetworkId};
use tierstock_events::{EventBus, EventEnvelope};
use tierstock_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use tierstock_infra::event_store::{EventStore, StoredEvent};
use tierstock_ledger::{
    availability_of, AdvanceOrderStage, AllocateStock, ApproveRequest, Availability, CancelRequest,
    ClientId, ClientOrder, CustodianId, CustodianTier, CustodyLedger, DenyOrder, DenyRequest,
    ForwardRequest, Holding, LedgerCommand, LedgerEvent, LedgerId, OpenLedger, OrderId, OrderItem,
    PlaceOrder, ReceiveStock, RegisterCustodian, Remit, RemittanceId, RemittanceRecord, RequestDraft,
    RequestId, StockRequest, SubmitRequests, LEDGER_AGGREGATE_TYPE,
};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// One line of a batch allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
}

/// Per-item result of a batch allocation. Items commit independently;
/// one failing line never rolls back its siblings.
#[derive(Debug)]
pub struct BatchItemOutcome {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub outcome: Result<(), DispatchError>,
}

/// One line of a request batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedItem {
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// The four decisions an approver (or the requester) can take on a
/// pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    Approve {
        prices: PriceSet,
        responder_notes: Option<String>,
    },
    Forward,
    Deny {
        reason: String,
    },
    Cancel,
}

/// Result of a remittance call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemitOutcome {
    Recorded(RemittanceRecord),
    /// The agent had no leftover stock and no orders were included:
    /// nothing committed, safe to re-invoke.
    NothingToRemit,
}

/// The ledger aggregate id is derived from the network id, so every
/// caller finds the same stream without a lookup table. One network,
/// one ledger.
pub fn ledger_id_for(network_id: NetworkId) -> LedgerId {
    LedgerId::new(AggregateId::from_uuid(*network_id.as_uuid()))
}

/// External operation surface over the custody ledger.
///
/// Generic over the store and bus so tests run the in-memory pair and
/// production can swap a durable backend.
#[derive(Debug)]
pub struct DistributionEngine<S, B> {
    store: S,
    dispatcher: CommandDispatcher<S, B>,
    max_retries: u32,
}

impl<S, B> DistributionEngine<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store.clone(), bus),
            store,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    // ----- registry -----

    pub fn open_network(&self, network_id: NetworkId) -> Result<LedgerId, DispatchError> {
        let ledger_id = ledger_id_for(network_id);
        self.execute(
            network_id,
            LedgerCommand::OpenLedger(OpenLedger {
                network_id,
                ledger_id,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(ledger_id)
    }

    pub fn register_custodian(
        &self,
        network_id: NetworkId,
        custodian_id: CustodianId,
        tier: CustodianTier,
        parent: Option<CustodianId>,
        display_name: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.execute(
            network_id,
            LedgerCommand::RegisterCustodian(RegisterCustodian {
                network_id,
                ledger_id: ledger_id_for(network_id),
                custodian_id,
                tier,
                parent,
                display_name: display_name.into(),
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    // ----- stock -----

    pub fn receive_stock(
        &self,
        network_id: NetworkId,
        admin: CustodianId,
        variant_id: VariantId,
        quantity: i64,
        prices: PriceSet,
    ) -> Result<(), DispatchError> {
        self.execute(
            network_id,
            LedgerCommand::ReceiveStock(ReceiveStock {
                network_id,
                ledger_id: ledger_id_for(network_id),
                admin,
                variant_id,
                quantity,
                prices,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Authoritative availability breakdown, computed from freshly
    /// rehydrated state.
    pub fn get_availability(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
        variant_id: VariantId,
    ) -> Result<Availability, DispatchError> {
        let ledger = self.rehydrate(network_id)?;
        Ok(availability_of(&ledger, custodian, variant_id))
    }

    pub fn allocate(
        &self,
        network_id: NetworkId,
        allocated_by: CustodianId,
        parent: CustodianId,
        child: CustodianId,
        variant_id: VariantId,
        quantity: i64,
        prices: PriceSet,
    ) -> Result<(), DispatchError> {
        self.execute(
            network_id,
            LedgerCommand::AllocateStock(AllocateStock {
                network_id,
                ledger_id: ledger_id_for(network_id),
                allocated_by,
                parent,
                child,
                variant_id,
                quantity,
                prices,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Fan a batch out as independent allocations, one dispatch per
    /// item. Reports a per-item outcome instead of failing the batch on
    /// the first bad line.
    pub fn allocate_batch(
        &self,
        network_id: NetworkId,
        allocated_by: CustodianId,
        parent: CustodianId,
        child: CustodianId,
        items: Vec<AllocationItem>,
    ) -> Vec<BatchItemOutcome> {
        items
            .into_iter()
            .map(|item| {
                let outcome = self.allocate(
                    network_id,
                    allocated_by,
                    parent,
                    child,
                    item.variant_id,
                    item.quantity,
                    item.prices,
                );
                BatchItemOutcome {
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    outcome,
                }
            })
            .collect()
    }

    // ----- orders -----

    pub fn place_order(
        &self,
        network_id: NetworkId,
        agent: CustodianId,
        client: ClientId,
        items: Vec<OrderItem>,
    ) -> Result<OrderId, DispatchError> {
        let order_id = OrderId::new();
        self.execute(
            network_id,
            LedgerCommand::PlaceOrder(PlaceOrder {
                network_id,
                ledger_id: ledger_id_for(network_id),
                order_id,
                agent,
                client,
                items,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(order_id)
    }

    pub fn advance_order_stage(
        &self,
        network_id: NetworkId,
        order_id: OrderId,
        advanced_by: CustodianId,
    ) -> Result<(), DispatchError> {
        self.execute(
            network_id,
            LedgerCommand::AdvanceOrderStage(AdvanceOrderStage {
                network_id,
                ledger_id: ledger_id_for(network_id),
                order_id,
                advanced_by,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn deny_order(
        &self,
        network_id: NetworkId,
        order_id: OrderId,
        denied_by: CustodianId,
        reason: impl Into<String>,
    ) -> Result<(), DispatchError> {
        self.execute(
            network_id,
            LedgerCommand::DenyOrder(DenyOrder {
                network_id,
                ledger_id: ledger_id_for(network_id),
                order_id,
                denied_by,
                reason: reason.into(),
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    // ----- requests -----

    /// Submit a batch of stock requests. Each item becomes its own
    /// request; the returned ids are in item order.
    pub fn submit_requests(
        &self,
        network_id: NetworkId,
        requester: CustodianId,
        items: Vec<RequestedItem>,
        notes: Option<String>,
    ) -> Result<Vec<RequestId>, DispatchError> {
        let drafts: Vec<RequestDraft> = items
            .into_iter()
            .map(|item| RequestDraft {
                request_id: RequestId::new(),
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();
        let request_ids: Vec<RequestId> = drafts.iter().map(|d| d.request_id).collect();

        self.execute(
            network_id,
            LedgerCommand::SubmitRequests(SubmitRequests {
                network_id,
                ledger_id: ledger_id_for(network_id),
                requester,
                items: drafts,
                notes,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(request_ids)
    }

    /// Decide a pending request. Forwarding returns the id of the
    /// escalated copy; the other actions return `None`.
    pub fn decide_request(
        &self,
        network_id: NetworkId,
        request_id: RequestId,
        actor: CustodianId,
        action: RequestAction,
    ) -> Result<Option<RequestId>, DispatchError> {
        let ledger_id = ledger_id_for(network_id);
        let occurred_at = Utc::now();

        match action {
            RequestAction::Approve {
                prices,
                responder_notes,
            } => {
                self.execute(
                    network_id,
                    LedgerCommand::ApproveRequest(ApproveRequest {
                        network_id,
                        ledger_id,
                        request_id,
                        approved_by: actor,
                        prices,
                        responder_notes,
                        occurred_at,
                    }),
                )?;
                Ok(None)
            }
            RequestAction::Forward => {
                let child_request_id = RequestId::new();
                self.execute(
                    network_id,
                    LedgerCommand::ForwardRequest(ForwardRequest {
                        network_id,
                        ledger_id,
                        request_id,
                        child_request_id,
                        forwarded_by: actor,
                        occurred_at,
                    }),
                )?;
                Ok(Some(child_request_id))
            }
            RequestAction::Deny { reason } => {
                self.execute(
                    network_id,
                    LedgerCommand::DenyRequest(DenyRequest {
                        network_id,
                        ledger_id,
                        request_id,
                        denied_by: actor,
                        denial_reason: reason,
                        occurred_at,
                    }),
                )?;
                Ok(None)
            }
            RequestAction::Cancel => {
                self.execute(
                    network_id,
                    LedgerCommand::CancelRequest(CancelRequest {
                        network_id,
                        ledger_id,
                        request_id,
                        cancelled_by: actor,
                        occurred_at,
                    }),
                )?;
                Ok(None)
            }
        }
    }

    // ----- remittance -----

    /// Close an agent's selling cycle: return leftover stock, freeze
    /// the included orders into an immutable record.
    pub fn remit(
        &self,
        network_id: NetworkId,
        agent: CustodianId,
        leader: CustodianId,
        order_ids: Vec<OrderId>,
        signature_ref: impl Into<String>,
    ) -> Result<RemitOutcome, DispatchError> {
        let committed = self.execute(
            network_id,
            LedgerCommand::Remit(Remit {
                network_id,
                ledger_id: ledger_id_for(network_id),
                remittance_id: RemittanceId::new(),
                agent,
                leader,
                order_ids,
                signature_ref: signature_ref.into(),
                occurred_at: Utc::now(),
            }),
        )?;

        // An accepted no-op commits nothing.
        if committed.is_empty() {
            return Ok(RemitOutcome::NothingToRemit);
        }

        for stored in &committed {
            let event: LedgerEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            if let LedgerEvent::RemittanceRecorded(e) = event {
                return Ok(RemitOutcome::Recorded(e.record));
            }
        }
        Err(DispatchError::InvariantViolation(
            "remittance commit without a recorded event".to_string(),
        ))
    }

    // ----- reads -----

    pub fn order(
        &self,
        network_id: NetworkId,
        order_id: OrderId,
    ) -> Result<Option<ClientOrder>, DispatchError> {
        let ledger = self.rehydrate(network_id)?;
        Ok(ledger.order(order_id).cloned())
    }

    pub fn request(
        &self,
        network_id: NetworkId,
        request_id: RequestId,
    ) -> Result<Option<StockRequest>, DispatchError> {
        let ledger = self.rehydrate(network_id)?;
        Ok(ledger.request(request_id).cloned())
    }

    pub fn remittance(
        &self,
        network_id: NetworkId,
        remittance_id: RemittanceId,
    ) -> Result<Option<RemittanceRecord>, DispatchError> {
        let ledger = self.rehydrate(network_id)?;
        Ok(ledger.remittance(remittance_id).cloned())
    }

    /// All holdings of one custodian, sorted by variant.
    pub fn holdings_of(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
    ) -> Result<Vec<(VariantId, Holding)>, DispatchError> {
        let ledger = self.rehydrate(network_id)?;
        Ok(ledger
            .holdings_of(custodian)
            .map(|(variant, holding)| (variant, holding.clone()))
            .collect())
    }

    // ----- internals -----

    fn execute(
        &self,
        network_id: NetworkId,
        command: LedgerCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let ledger_id = ledger_id_for(network_id);
        let mut attempt = 0u32;
        loop {
            let result = self.dispatcher.dispatch(
                network_id,
                ledger_id.0,
                LEDGER_AGGREGATE_TYPE,
                command.clone(),
                |_, id| CustodyLedger::empty(LedgerId::new(id)),
            );
            match result {
                Err(DispatchError::Concurrency(reason)) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(%network_id, attempt, reason, "optimistic conflict, retrying");
                }
                other => return other,
            }
        }
    }

    fn rehydrate(&self, network_id: NetworkId) -> Result<CustodyLedger, DispatchError> {
        let ledger_id = ledger_id_for(network_id);
        let mut history = self.store.load_stream(network_id, ledger_id.0)?;
        history.sort_by_key(|e| e.sequence_number);

        let mut ledger = CustodyLedger::empty(ledger_id);
        for stored in history {
            let event: LedgerEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            ledger.apply(&event);
        }
        Ok(ledger)
    }
}

/// Shared-engine alias used by the API layer.
pub type SharedEngine<S, B> = Arc<DistributionEngine<S, B>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use tierstock_events::InMemoryEventBus;
    use tierstock_infra::event_store::InMemoryEventStore;
    use tierstock_ledger::{OrderStage, OrderStatus, RequestStatus};

    type TestEngine =
        DistributionEngine<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn engine() -> TestEngine {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        DistributionEngine::new(store, bus)
    }

    struct TestNetwork {
        engine: TestEngine,
        network_id: NetworkId,
        admin: CustodianId,
        leader: CustodianId,
        agent: CustodianId,
        variant: VariantId,
    }

    fn leader_prices() -> PriceSet {
        PriceSet {
            dealer_price: Some(4_500),
            selling_price: Some(5_000),
            ..PriceSet::EMPTY
        }
    }

    fn agent_prices() -> PriceSet {
        PriceSet {
            selling_price: Some(5_000),
            ..PriceSet::EMPTY
        }
    }

    fn network() -> TestNetwork {
        let engine = engine();
        let network_id = NetworkId::new();
        let admin = CustodianId::new();
        let leader = CustodianId::new();
        let agent = CustodianId::new();

        engine.open_network(network_id).unwrap();
        engine
            .register_custodian(network_id, admin, CustodianTier::Admin, None, "Warehouse")
            .unwrap();
        engine
            .register_custodian(network_id, leader, CustodianTier::Leader, Some(admin), "North")
            .unwrap();
        engine
            .register_custodian(network_id, agent, CustodianTier::Agent, Some(leader), "Agent A")
            .unwrap();

        TestNetwork {
            engine,
            network_id,
            admin,
            leader,
            agent,
            variant: VariantId::new(AggregateId::new()),
        }
    }

    #[test]
    fn round_trip_allocate_order_approve_remit() {
        let n = network();
        n.engine
            .receive_stock(n.network_id, n.admin, n.variant, 1_000, leader_prices())
            .unwrap();
        n.engine
            .allocate(n.network_id, n.admin, n.admin, n.leader, n.variant, 300, leader_prices())
            .unwrap();
        n.engine
            .allocate(n.network_id, n.leader, n.leader, n.agent, n.variant, 300, agent_prices())
            .unwrap();

        let order_id = n
            .engine
            .place_order(
                n.network_id,
                n.agent,
                ClientId::new(),
                vec![OrderItem {
                    variant_id: n.variant,
                    quantity: 50,
                    unit_price: 5_000,
                }],
            )
            .unwrap();

        // Placement reserves against the leader pool until the first
        // stage advance.
        let leader_view = n
            .engine
            .get_availability(n.network_id, n.leader, n.variant)
            .unwrap();
        assert_eq!(leader_view.reserved, 50);

        n.engine
            .advance_order_stage(n.network_id, order_id, n.leader)
            .unwrap();
        n.engine
            .advance_order_stage(n.network_id, order_id, n.admin)
            .unwrap();

        let order = n.engine.order(n.network_id, order_id).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Approved);
        assert_eq!(order.stage, OrderStage::AdminApproved);

        let outcome = n
            .engine
            .remit(n.network_id, n.agent, n.leader, vec![order_id], "sig://cycle-1")
            .unwrap();
        let record = match outcome {
            RemitOutcome::Recorded(record) => record,
            other => panic!("expected a recorded remittance, got {other:?}"),
        };
        assert_eq!(record.total_units, 250);
        assert_eq!(record.total_revenue, 250_000);
        assert_eq!(record.orders_count, 1);

        let holdings = n.engine.holdings_of(n.network_id, n.agent).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].1.quantity, 0);

        let stored = n
            .engine
            .remittance(n.network_id, record.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn remitting_an_empty_cycle_is_a_no_op() {
        let n = network();
        let outcome = n
            .engine
            .remit(n.network_id, n.agent, n.leader, vec![], "sig://empty")
            .unwrap();
        assert_eq!(outcome, RemitOutcome::NothingToRemit);
    }

    #[test]
    fn batch_allocation_reports_per_item_outcomes() {
        let n = network();
        n.engine
            .receive_stock(n.network_id, n.admin, n.variant, 100, leader_prices())
            .unwrap();
        let other_variant = VariantId::new(AggregateId::new());

        let outcomes = n.engine.allocate_batch(
            n.network_id,
            n.admin,
            n.admin,
            n.leader,
            vec![
                AllocationItem {
                    variant_id: n.variant,
                    quantity: 60,
                    prices: leader_prices(),
                },
                AllocationItem {
                    variant_id: other_variant,
                    quantity: 10,
                    prices: leader_prices(),
                },
            ],
        );

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].outcome.is_ok());
        match &outcomes[1].outcome {
            Err(DispatchError::InsufficientStock { available, .. }) => assert_eq!(*available, 0),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // The good line committed despite its failing sibling.
        assert_eq!(
            n.engine
                .get_availability(n.network_id, n.leader, n.variant)
                .unwrap()
                .total,
            60
        );
    }

    #[test]
    fn forwarded_request_approval_reaches_the_agent() {
        let n = network();
        n.engine
            .receive_stock(n.network_id, n.admin, n.variant, 500, leader_prices())
            .unwrap();

        let request_ids = n
            .engine
            .submit_requests(
                n.network_id,
                n.agent,
                vec![RequestedItem {
                    variant_id: n.variant,
                    quantity: 40,
                }],
                None,
            )
            .unwrap();
        assert_eq!(request_ids.len(), 1);

        // Leader has no stock, so escalate.
        let child = n
            .engine
            .decide_request(n.network_id, request_ids[0], n.leader, RequestAction::Forward)
            .unwrap()
            .expect("forward returns the escalated copy's id");

        n.engine
            .decide_request(
                n.network_id,
                child,
                n.admin,
                RequestAction::Approve {
                    prices: leader_prices(),
                    responder_notes: None,
                },
            )
            .unwrap();

        // The chained approval settles both requests and moves stock
        // admin -> leader -> agent.
        let original = n
            .engine
            .request(n.network_id, request_ids[0])
            .unwrap()
            .unwrap();
        assert_eq!(original.status, RequestStatus::Approved);
        assert_eq!(
            n.engine
                .get_availability(n.network_id, n.agent, n.variant)
                .unwrap()
                .total,
            40
        );
    }

    #[test]
    fn racing_allocations_never_jointly_exceed_availability() {
        // Four leaders racing for 30 each out of 100: at most three can
        // win, and every loser must see InsufficientStock, never a
        // surfaced conflict.
        let n = network();
        let shared = Arc::new(n.engine.with_max_retries(16));
        let mut leaders = Vec::new();
        for i in 0..4 {
            let leader = CustodianId::new();
            shared
                .register_custodian(
                    n.network_id,
                    leader,
                    CustodianTier::Leader,
                    Some(n.admin),
                    format!("racer-{i}"),
                )
                .unwrap();
            leaders.push(leader);
        }
        shared
            .receive_stock(n.network_id, n.admin, n.variant, 100, leader_prices())
            .unwrap();

        let handles: Vec<_> = leaders
            .iter()
            .map(|leader| {
                let engine = shared.clone();
                let leader = *leader;
                let network_id = n.network_id;
                let admin = n.admin;
                let variant = n.variant;
                thread::spawn(move || {
                    engine.allocate(network_id, admin, admin, leader, variant, 30, leader_prices())
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(()) => successes += 1,
                Err(DispatchError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected failure: {other:?}"),
            }
        }
        assert!(successes <= 3);

        let allocated: i64 = leaders
            .iter()
            .map(|leader| {
                shared
                    .get_availability(n.network_id, *leader, n.variant)
                    .unwrap()
                    .total
            })
            .sum();
        assert!(allocated <= 100);
        assert_eq!(allocated, successes * 30);
    }
}
