//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → EventBus → ProjectionWorker → read models
//!
//! Verifies that dispatched ledger commands land in every read model,
//! that network isolation holds end to end, and that rejected commands
//! leave both the store and the read models untouched.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tierstock_catalog::{PriceSet, VariantId};
use tierstock_core::{AggregateId, ExpectedVersion, NetworkId};
use tierstock_events::{Event, EventEnvelope, InMemoryEventBus};
use tierstock_ledger::{
    AdvanceOrderStage, AllocateStock, ApproveRequest, ClientId, CustodianId, CustodianTier,
    CustodyLedger, LedgerCommand, LedgerId, LedgerOpened, OpenLedger, OrderId, OrderItem,
    OrderStage, OrderStatus, PlaceOrder, ReceiveStock, RegisterCustodian, Remit, RemittanceId,
    RemittanceRecord, RequestDraft, RequestId, RequestStatus, SubmitRequests,
    LEDGER_AGGREGATE_TYPE,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::projections::{
    OrderLogProjection, OrderReadModel, RemittanceLogProjection, RequestQueueProjection,
    RequestReadModel, StockPositionKey, StockPositionReadModel, StockPositionsProjection,
};
use crate::read_model::InMemoryNetworkStore;
use crate::workers::{ProjectionWorker, WorkerHandle};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type StockProj =
    Arc<StockPositionsProjection<Arc<InMemoryNetworkStore<StockPositionKey, StockPositionReadModel>>>>;
type OrderProj = Arc<OrderLogProjection<Arc<InMemoryNetworkStore<OrderId, OrderReadModel>>>>;
type RequestProj =
    Arc<RequestQueueProjection<Arc<InMemoryNetworkStore<RequestId, RequestReadModel>>>>;
type RemittanceProj =
    Arc<RemittanceLogProjection<Arc<InMemoryNetworkStore<RemittanceId, RemittanceRecord>>>>;

struct Harness {
    dispatcher: CommandDispatcher<Arc<InMemoryEventStore>, Bus>,
    store: Arc<InMemoryEventStore>,
    stock: StockProj,
    orders: OrderProj,
    requests: RequestProj,
    remittances: RemittanceProj,
    // Kept alive for the duration of the test.
    _workers: Vec<WorkerHandle>,
}

/// Wire the in-memory store and bus, and spawn one projection worker
/// per read model. Workers subscribe before the harness is returned,
/// so no early event can be missed.
fn harness() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

    let stock: StockProj = Arc::new(StockPositionsProjection::new(Arc::new(
        InMemoryNetworkStore::new(),
    )));
    let orders: OrderProj = Arc::new(OrderLogProjection::new(Arc::new(InMemoryNetworkStore::new())));
    let requests: RequestProj = Arc::new(RequestQueueProjection::new(Arc::new(
        InMemoryNetworkStore::new(),
    )));
    let remittances: RemittanceProj = Arc::new(RemittanceLogProjection::new(Arc::new(
        InMemoryNetworkStore::new(),
    )));

    let workers = vec![
        {
            let p = stock.clone();
            ProjectionWorker::spawn("stock-positions", bus.clone(), None, move |env| {
                p.apply_envelope(&env)
            })
        },
        {
            let p = orders.clone();
            ProjectionWorker::spawn("order-log", bus.clone(), None, move |env| {
                p.apply_envelope(&env)
            })
        },
        {
            let p = requests.clone();
            ProjectionWorker::spawn("request-queue", bus.clone(), None, move |env| {
                p.apply_envelope(&env)
            })
        },
        {
            let p = remittances.clone();
            ProjectionWorker::spawn("remittance-log", bus.clone(), None, move |env| {
                p.apply_envelope(&env)
            })
        },
    ];

    Harness {
        dispatcher,
        store,
        stock,
        orders,
        requests,
        remittances,
        _workers: workers,
    }
}

/// The worker threads deliver synchronously once woken; a short sleep
/// is enough for the read models to catch up.
fn wait_for_processing() {
    std::thread::sleep(std::time::Duration::from_millis(100));
}

struct Network {
    network_id: NetworkId,
    ledger_id: LedgerId,
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

fn dispatch(harness: &Harness, network: &Network, command: LedgerCommand) -> Result<usize, DispatchError> {
    harness
        .dispatcher
        .dispatch(
            network.network_id,
            network.ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            command,
            |_, id| CustodyLedger::empty(LedgerId::new(id)),
        )
        .map(|committed| committed.len())
}

/// Open a ledger, register the three-tier chain and stock the admin
/// with 100 units of one variant.
fn seeded_network(harness: &Harness) -> Network {
    let network = Network {
        network_id: NetworkId::new(),
        ledger_id: LedgerId::new(AggregateId::new()),
        admin: CustodianId::new(),
        leader: CustodianId::new(),
        agent: CustodianId::new(),
        variant: VariantId::new(AggregateId::new()),
    };

    dispatch(
        harness,
        &network,
        LedgerCommand::OpenLedger(OpenLedger {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();

    for (custodian_id, tier, parent, name) in [
        (network.admin, CustodianTier::Admin, None, "Warehouse"),
        (network.leader, CustodianTier::Leader, Some(network.admin), "North"),
        (network.agent, CustodianTier::Agent, Some(network.leader), "Agent A"),
    ] {
        dispatch(
            harness,
            &network,
            LedgerCommand::RegisterCustodian(RegisterCustodian {
                network_id: network.network_id,
                ledger_id: network.ledger_id,
                custodian_id,
                tier,
                parent,
                display_name: name.to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    dispatch(
        harness,
        &network,
        LedgerCommand::ReceiveStock(ReceiveStock {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            admin: network.admin,
            variant_id: network.variant,
            quantity: 100,
            prices: leader_prices(),
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();

    network
}

fn allocate(
    harness: &Harness,
    network: &Network,
    parent: CustodianId,
    child: CustodianId,
    quantity: i64,
    prices: PriceSet,
) -> Result<usize, DispatchError> {
    dispatch(
        harness,
        network,
        LedgerCommand::AllocateStock(AllocateStock {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            allocated_by: parent,
            parent,
            child,
            variant_id: network.variant,
            quantity,
            prices,
            occurred_at: Utc::now(),
        }),
    )
}

#[test]
fn allocation_chain_updates_stock_positions() {
    let harness = harness();
    let network = seeded_network(&harness);

    allocate(&harness, &network, network.admin, network.leader, 40, leader_prices()).unwrap();
    allocate(&harness, &network, network.leader, network.agent, 15, agent_prices()).unwrap();
    wait_for_processing();

    // Parent rows are high-water marks: allocating down the chain never
    // decrements them.
    let admin_row = harness
        .stock
        .get(network.network_id, network.admin, network.variant)
        .unwrap();
    assert_eq!(admin_row.quantity, 100);

    let leader_row = harness
        .stock
        .get(network.network_id, network.leader, network.variant)
        .unwrap();
    assert_eq!(leader_row.quantity, 40);

    let agent_row = harness
        .stock
        .get(network.network_id, network.agent, network.variant)
        .unwrap();
    assert_eq!(agent_row.quantity, 15);
    assert_eq!(agent_row.prices, agent_prices());
}

#[test]
fn order_lifecycle_lands_in_order_log_and_remittance_log() {
    let harness = harness();
    let network = seeded_network(&harness);
    allocate(&harness, &network, network.admin, network.leader, 40, leader_prices()).unwrap();
    allocate(&harness, &network, network.leader, network.agent, 15, agent_prices()).unwrap();

    let order_id = OrderId::new();
    dispatch(
        &harness,
        &network,
        LedgerCommand::PlaceOrder(PlaceOrder {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            order_id,
            agent: network.agent,
            client: ClientId::new(),
            items: vec![OrderItem {
                variant_id: network.variant,
                quantity: 5,
                unit_price: 5_000,
            }],
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    wait_for_processing();

    // Placement debits the agent immediately.
    let agent_row = harness
        .stock
        .get(network.network_id, network.agent, network.variant)
        .unwrap();
    assert_eq!(agent_row.quantity, 10);
    let order_row = harness.orders.get(network.network_id, order_id).unwrap();
    assert_eq!(order_row.status, OrderStatus::Pending);
    assert_eq!(order_row.total_amount, 25_000);

    // Leader then admin approve.
    for approver in [network.leader, network.admin] {
        dispatch(
            &harness,
            &network,
            LedgerCommand::AdvanceOrderStage(AdvanceOrderStage {
                network_id: network.network_id,
                ledger_id: network.ledger_id,
                order_id,
                advanced_by: approver,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }
    wait_for_processing();

    let order_row = harness.orders.get(network.network_id, order_id).unwrap();
    assert_eq!(order_row.status, OrderStatus::Approved);
    assert_eq!(order_row.stage, OrderStage::AdminApproved);

    // Remit: leftover agent stock is returned, the order is marked
    // remitted, and the frozen record reaches the remittance log.
    dispatch(
        &harness,
        &network,
        LedgerCommand::Remit(Remit {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            remittance_id: RemittanceId::new(),
            agent: network.agent,
            leader: network.leader,
            order_ids: vec![order_id],
            signature_ref: "sig://remit/cycle-1".to_string(),
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    wait_for_processing();

    let agent_row = harness
        .stock
        .get(network.network_id, network.agent, network.variant)
        .unwrap();
    assert_eq!(agent_row.quantity, 0);

    let order_row = harness.orders.get(network.network_id, order_id).unwrap();
    assert!(order_row.remitted);

    let history = harness
        .remittances
        .history_of(network.network_id, network.agent);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_revenue, 25_000);
    assert_eq!(history[0].total_units, 10);
    assert_eq!(history[0].orders_count, 1);
}

#[test]
fn approved_request_allocates_and_resolves_the_queue_row() {
    let harness = harness();
    let network = seeded_network(&harness);
    allocate(&harness, &network, network.admin, network.leader, 40, leader_prices()).unwrap();

    let request_id = RequestId::new();
    dispatch(
        &harness,
        &network,
        LedgerCommand::SubmitRequests(SubmitRequests {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            requester: network.agent,
            items: vec![RequestDraft {
                request_id,
                variant_id: network.variant,
                quantity: 10,
            }],
            notes: Some("restock for the weekend".to_string()),
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    wait_for_processing();

    let pending = harness
        .requests
        .pending_for(network.network_id, network.leader);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, request_id);

    dispatch(
        &harness,
        &network,
        LedgerCommand::ApproveRequest(ApproveRequest {
            network_id: network.network_id,
            ledger_id: network.ledger_id,
            request_id,
            approved_by: network.leader,
            prices: agent_prices(),
            responder_notes: None,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();
    wait_for_processing();

    let row = harness.requests.get(network.network_id, request_id).unwrap();
    assert_eq!(row.status, RequestStatus::Approved);
    assert!(harness
        .requests
        .pending_for(network.network_id, network.leader)
        .is_empty());

    // Approval carries the allocation with it.
    let agent_row = harness
        .stock
        .get(network.network_id, network.agent, network.variant)
        .unwrap();
    assert_eq!(agent_row.quantity, 10);
}

#[test]
fn network_isolation_preserved_across_read_models() {
    let harness = harness();
    let network_a = seeded_network(&harness);
    let network_b = seeded_network(&harness);

    allocate(&harness, &network_a, network_a.admin, network_a.leader, 40, leader_prices()).unwrap();
    wait_for_processing();

    // Network B never sees network A's rows.
    assert!(harness
        .stock
        .get(network_b.network_id, network_a.leader, network_a.variant)
        .is_none());
    let b_rows = harness.stock.list(network_b.network_id);
    assert_eq!(b_rows.len(), 1);
    assert_eq!(b_rows[0].custodian, network_b.admin);
}

#[test]
fn rejected_allocation_leaves_store_and_read_models_untouched() {
    let harness = harness();
    let network = seeded_network(&harness);

    let before = harness
        .store
        .load_stream(network.network_id, network.ledger_id.0)
        .unwrap()
        .len();

    let err = allocate(&harness, &network, network.admin, network.leader, 1_000, leader_prices())
        .unwrap_err();
    match err {
        DispatchError::InsufficientStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 1_000);
            assert_eq!(available, 100);
        }
        e => panic!("expected InsufficientStock, got: {e:?}"),
    }
    wait_for_processing();

    let after = harness
        .store
        .load_stream(network.network_id, network.ledger_id.0)
        .unwrap()
        .len();
    assert_eq!(before, after);
    assert!(harness
        .stock
        .get(network.network_id, network.leader, network.variant)
        .is_none());
}

#[test]
fn stale_append_is_rejected_by_the_store() {
    let harness = harness();
    let network = seeded_network(&harness);

    // A writer that decided against version 0 while the stream has
    // moved on must be rejected.
    let stale = LedgerOpened {
        network_id: network.network_id,
        ledger_id: network.ledger_id,
        occurred_at: Utc::now(),
    };
    let event = tierstock_ledger::LedgerEvent::LedgerOpened(stale);
    let uncommitted = UncommittedEvent::from_typed(
        network.network_id,
        network.ledger_id.0,
        LEDGER_AGGREGATE_TYPE,
        Uuid::now_v7(),
        &event,
    )
    .unwrap();

    let err = harness
        .store
        .append(vec![uncommitted], ExpectedVersion::Exact(0))
        .unwrap_err();
    assert!(matches!(
        err,
        crate::event_store::EventStoreError::Concurrency(_)
    ));
}

#[test]
fn pinned_worker_ignores_other_networks() {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let _ = store;

    let stock: StockProj = Arc::new(StockPositionsProjection::new(Arc::new(
        InMemoryNetworkStore::new(),
    )));
    let pinned_network = NetworkId::new();
    let other_network = NetworkId::new();

    let p = stock.clone();
    let _worker = ProjectionWorker::spawn(
        "stock-positions-pinned",
        bus.clone(),
        Some(pinned_network),
        move |env: EventEnvelope<JsonValue>| p.apply_envelope(&env),
    );

    for network_id in [pinned_network, other_network] {
        let ledger_id = LedgerId::new(AggregateId::new());
        let event = tierstock_ledger::LedgerEvent::StockReceived(tierstock_ledger::StockReceived {
            network_id,
            ledger_id,
            admin: CustodianId::new(),
            variant_id: VariantId::new(AggregateId::new()),
            quantity: 50,
            prices: leader_prices(),
            occurred_at: Utc::now(),
        });
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            network_id,
            ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            event.event_type(),
            1,
            serde_json::to_value(&event).unwrap(),
        );
        use tierstock_events::EventBus as _;
        bus.publish(envelope).unwrap();
    }
    wait_for_processing();

    assert_eq!(stock.list(pinned_network).len(), 1);
    assert!(stock.list(other_network).is_empty());
}
