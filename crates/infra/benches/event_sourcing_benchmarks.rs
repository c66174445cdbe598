use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use tierstock_catalog::{PriceSet, VariantId};
use tierstock_core::{AggregateId, ExpectedVersion, NetworkId};
use tierstock_events::{EventEnvelope, InMemoryEventBus};
use tierstock_infra::command_dispatcher::CommandDispatcher;
use tierstock_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use tierstock_infra::projections::{StockPositionKey, StockPositionReadModel, StockPositionsProjection};
use tierstock_infra::read_model::InMemoryNetworkStore;
use tierstock_ledger::{
    AllocateStock, CustodianId, CustodianTier, CustodyLedger, LedgerCommand, LedgerEvent, LedgerId,
    OpenLedger, ReceiveStock, RegisterCustodian, StockAllocated, StockReceived,
    LEDGER_AGGREGATE_TYPE,
};

type Dispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

struct Fixture {
    dispatcher: Dispatcher,
    network_id: NetworkId,
    ledger_id: LedgerId,
    admin: CustodianId,
    leader: CustodianId,
    variant: VariantId,
}

fn leader_prices() -> PriceSet {
    PriceSet {
        dealer_price: Some(4_500),
        selling_price: Some(5_000),
        ..PriceSet::EMPTY
    }
}

fn dispatch(fixture: &Fixture, command: LedgerCommand) {
    fixture
        .dispatcher
        .dispatch(
            fixture.network_id,
            fixture.ledger_id.0,
            LEDGER_AGGREGATE_TYPE,
            command,
            |_, id| CustodyLedger::empty(LedgerId::new(id)),
        )
        .unwrap();
}

/// A ledger with the admin/leader chain registered and a large stock
/// intake so allocation benchmarks never run dry.
fn seeded_fixture() -> Fixture {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let fixture = Fixture {
        dispatcher: CommandDispatcher::new(store, bus),
        network_id: NetworkId::new(),
        ledger_id: LedgerId::new(AggregateId::new()),
        admin: CustodianId::new(),
        leader: CustodianId::new(),
        variant: VariantId::new(AggregateId::new()),
    };

    dispatch(
        &fixture,
        LedgerCommand::OpenLedger(OpenLedger {
            network_id: fixture.network_id,
            ledger_id: fixture.ledger_id,
            occurred_at: Utc::now(),
        }),
    );
    for (custodian_id, tier, parent) in [
        (fixture.admin, CustodianTier::Admin, None),
        (fixture.leader, CustodianTier::Leader, Some(fixture.admin)),
    ] {
        dispatch(
            &fixture,
            LedgerCommand::RegisterCustodian(RegisterCustodian {
                network_id: fixture.network_id,
                ledger_id: fixture.ledger_id,
                custodian_id,
                tier,
                parent,
                display_name: "bench".to_string(),
                occurred_at: Utc::now(),
            }),
        );
    }
    dispatch(
        &fixture,
        LedgerCommand::ReceiveStock(ReceiveStock {
            network_id: fixture.network_id,
            ledger_id: fixture.ledger_id,
            admin: fixture.admin,
            variant_id: fixture.variant,
            quantity: 100_000_000,
            prices: leader_prices(),
            occurred_at: Utc::now(),
        }),
    );

    fixture
}

fn allocate_command(fixture: &Fixture) -> LedgerCommand {
    LedgerCommand::AllocateStock(AllocateStock {
        network_id: fixture.network_id,
        ledger_id: fixture.ledger_id,
        allocated_by: fixture.admin,
        parent: fixture.admin,
        child: fixture.leader,
        variant_id: fixture.variant,
        quantity: 1,
        prices: leader_prices(),
        occurred_at: Utc::now(),
    })
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // Dispatch against a short stream: rehydration cost is negligible.
    group.bench_function("allocate_shallow_history", |b| {
        let fixture = seeded_fixture();
        b.iter(|| dispatch(&fixture, black_box(allocate_command(&fixture))));
    });

    // Dispatch after thousands of committed events: measures the full
    // load + rehydrate + decide + append round trip.
    group.bench_function("allocate_deep_history", |b| {
        let fixture = seeded_fixture();
        for _ in 0..5_000 {
            dispatch(&fixture, allocate_command(&fixture));
        }
        b.iter(|| dispatch(&fixture, black_box(allocate_command(&fixture))));
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let network_id = NetworkId::new();
                let ledger_id = LedgerId::new(AggregateId::new());
                let admin = CustodianId::new();
                let leader = CustodianId::new();
                let variant = VariantId::new(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|i| {
                            let event = LedgerEvent::StockAllocated(StockAllocated {
                                network_id,
                                ledger_id,
                                allocated_by: admin,
                                parent: admin,
                                child: leader,
                                variant_id: variant,
                                quantity: i as i64 + 1,
                                prices: leader_prices(),
                                request_id: None,
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                network_id,
                                ledger_id.0,
                                LEDGER_AGGREGATE_TYPE,
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_stock_positions", event_count),
            event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let network_id = NetworkId::new();
                let ledger_id = LedgerId::new(AggregateId::new());
                let admin = CustodianId::new();
                let variant = VariantId::new(AggregateId::new());

                // Pre-commit the history once; the benchmark replays it.
                let mut all_envelopes = Vec::new();
                for i in 0..count {
                    let event = LedgerEvent::StockReceived(StockReceived {
                        network_id,
                        ledger_id,
                        admin,
                        variant_id: variant,
                        quantity: (i % 10) as i64 + 1,
                        prices: leader_prices(),
                        occurred_at: Utc::now(),
                    });
                    let uncommitted = UncommittedEvent::from_typed(
                        network_id,
                        ledger_id.0,
                        LEDGER_AGGREGATE_TYPE,
                        uuid::Uuid::now_v7(),
                        &event,
                    )
                    .unwrap();
                    let stored = store
                        .append(vec![uncommitted], ExpectedVersion::Exact(i as u64))
                        .unwrap();
                    all_envelopes.push(stored[0].to_envelope());
                }

                let read_model_store: Arc<
                    InMemoryNetworkStore<StockPositionKey, StockPositionReadModel>,
                > = Arc::new(InMemoryNetworkStore::new());
                let projection = StockPositionsProjection::new(read_model_store);

                b.iter(|| {
                    projection
                        .rebuild_from_scratch(black_box(all_envelopes.clone()))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
