use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use serde::de::DeserializeOwned;
use serde::Serialize;

use tierstock_core::{Aggregate, AggregateId, DomainError, NetworkId};
use tierstock_engine::{ChangeNotice, ChangeTopic, Debouncer, DistributionEngine};
use tierstock_events::{EventEnvelope, InMemoryEventBus};
use tierstock_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, StoredEvent},
    projections::{
        OrderLogProjection, OrderReadModel, RemittanceLogProjection, RequestQueueProjection,
        RequestReadModel, StockPositionKey, StockPositionReadModel, StockPositionsProjection,
    },
    read_model::InMemoryNetworkStore,
    ProjectionWorker, WorkerHandle,
};
use tierstock_ledger::{
    CustodianId, OrderId, RemittanceId, RemittanceRecord, RequestId, LEDGER_AGGREGATE_TYPE,
};

type ApiStore = Arc<InMemoryEventStore>;
type ApiBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type ApiEngine = DistributionEngine<ApiStore, ApiBus>;

type StockProjection =
    StockPositionsProjection<Arc<InMemoryNetworkStore<StockPositionKey, StockPositionReadModel>>>;
type OrdersProjection = OrderLogProjection<Arc<InMemoryNetworkStore<OrderId, OrderReadModel>>>;
type RequestsProjection =
    RequestQueueProjection<Arc<InMemoryNetworkStore<RequestId, RequestReadModel>>>;
type RemittancesProjection =
    RemittanceLogProjection<Arc<InMemoryNetworkStore<RemittanceId, RemittanceRecord>>>;

/// Shared application services behind the HTTP layer.
///
/// Commands run through the [`ApiEngine`] (rehydrate + retry), queries
/// run against the projections, and every committed event feeds the
/// debounced change broadcast behind `/events/stream`.
pub struct AppServices {
    engine: Arc<ApiEngine>,
    store: ApiStore,
    dispatcher: CommandDispatcher<ApiStore, ApiBus>,
    stock_projection: Arc<StockProjection>,
    orders_projection: Arc<OrdersProjection>,
    requests_projection: Arc<RequestsProjection>,
    remittances_projection: Arc<RemittancesProjection>,
    realtime_tx: broadcast::Sender<ChangeNotice>,
    // Held for graceful lifetime; dropped with the services.
    _workers: Vec<WorkerHandle>,
}

pub fn build_services() -> AppServices {
    // In-memory infra wiring (dev/test): store + bus + projections.
    let store: ApiStore = Arc::new(InMemoryEventStore::new());
    let bus: ApiBus = Arc::new(InMemoryEventBus::new());

    let stock_projection: Arc<StockProjection> = Arc::new(StockPositionsProjection::new(Arc::new(
        InMemoryNetworkStore::new(),
    )));
    let orders_projection: Arc<OrdersProjection> =
        Arc::new(OrderLogProjection::new(Arc::new(InMemoryNetworkStore::new())));
    let requests_projection: Arc<RequestsProjection> = Arc::new(RequestQueueProjection::new(
        Arc::new(InMemoryNetworkStore::new()),
    ));
    let remittances_projection: Arc<RemittancesProjection> = Arc::new(
        RemittanceLogProjection::new(Arc::new(InMemoryNetworkStore::new())),
    );

    // Realtime channel (SSE): lossy broadcast, network-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<ChangeNotice>(256);

    // Background workers: bus -> projections, one worker per read model.
    let mut workers = Vec::new();
    {
        let stock = stock_projection.clone();
        workers.push(ProjectionWorker::spawn(
            "projection.stock_positions",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| stock.apply_envelope(&env),
        ));
    }
    {
        let orders = orders_projection.clone();
        workers.push(ProjectionWorker::spawn(
            "projection.order_log",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| orders.apply_envelope(&env),
        ));
    }
    {
        let requests = requests_projection.clone();
        workers.push(ProjectionWorker::spawn(
            "projection.request_queue",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| requests.apply_envelope(&env),
        ));
    }
    {
        let remittances = remittances_projection.clone();
        workers.push(ProjectionWorker::spawn(
            "projection.remittance_log",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| remittances.apply_envelope(&env),
        ));
    }

    // Change notifier: committed events -> debounced topic notices.
    {
        let debouncer = Debouncer::from_env();
        let realtime_tx = realtime_tx.clone();
        workers.push(ProjectionWorker::spawn(
            "notify.change_feed",
            bus.clone(),
            None,
            move |env: EventEnvelope<JsonValue>| {
                if env.aggregate_type() != LEDGER_AGGREGATE_TYPE {
                    return Ok::<(), Infallible>(());
                }
                if let Some(topic) = ChangeTopic::for_event_type(env.event_type()) {
                    if let Some(notice) = debouncer.observe(env.network_id(), topic) {
                        // Lossy by design of the channel; subscribers
                        // converge by querying.
                        let _ = realtime_tx.send(notice);
                    }
                }
                Ok(())
            },
        ));
    }

    let engine = Arc::new(DistributionEngine::new(store.clone(), bus.clone()));
    let dispatcher = CommandDispatcher::new(store.clone(), bus);

    AppServices {
        engine,
        store,
        dispatcher,
        stock_projection,
        orders_projection,
        requests_projection,
        remittances_projection,
        realtime_tx,
        _workers: workers,
    }
}

impl AppServices {
    pub fn engine(&self) -> &ApiEngine {
        &self.engine
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<ChangeNotice> {
        &self.realtime_tx
    }

    /// Dispatch a command against an arbitrary event-sourced aggregate
    /// (catalog routes use this; ledger commands go through the engine).
    pub fn dispatch<A>(
        &self,
        network_id: NetworkId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(NetworkId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tierstock_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(network_id, aggregate_id, aggregate_type, command, make_aggregate)
    }

    /// Rehydrate an aggregate for a read (catalog has no projection;
    /// its aggregates are small enough to fold on every query).
    pub fn load_aggregate<A>(
        &self,
        network_id: NetworkId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(NetworkId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let mut history = self.store.load_stream(network_id, aggregate_id)?;
        history.sort_by_key(|e| e.sequence_number);

        let mut aggregate = make_aggregate(network_id, aggregate_id);
        for stored in history {
            let event: A::Event = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            aggregate.apply(&event);
        }
        Ok(aggregate)
    }

    // ----- stock positions -----

    pub fn stock_list(&self, network_id: NetworkId) -> Vec<StockPositionReadModel> {
        self.stock_projection.list(network_id)
    }

    pub fn stock_positions_of(
        &self,
        network_id: NetworkId,
        custodian: CustodianId,
    ) -> Vec<StockPositionReadModel> {
        self.stock_projection.positions_of(network_id, custodian)
    }

    // ----- orders -----

    pub fn orders_get(&self, network_id: NetworkId, order_id: OrderId) -> Option<OrderReadModel> {
        self.orders_projection.get(network_id, order_id)
    }

    pub fn orders_list(&self, network_id: NetworkId) -> Vec<OrderReadModel> {
        self.orders_projection.list(network_id)
    }

    pub fn orders_of(&self, network_id: NetworkId, agent: CustodianId) -> Vec<OrderReadModel> {
        self.orders_projection.orders_of(network_id, agent)
    }

    pub fn orders_pending(&self, network_id: NetworkId) -> Vec<OrderReadModel> {
        self.orders_projection.pending(network_id)
    }

    // ----- requests -----

    pub fn requests_get(
        &self,
        network_id: NetworkId,
        request_id: RequestId,
    ) -> Option<RequestReadModel> {
        self.requests_projection.get(network_id, request_id)
    }

    pub fn requests_list(&self, network_id: NetworkId) -> Vec<RequestReadModel> {
        self.requests_projection.list(network_id)
    }

    pub fn requests_pending_for(
        &self,
        network_id: NetworkId,
        target: CustodianId,
    ) -> Vec<RequestReadModel> {
        self.requests_projection.pending_for(network_id, target)
    }

    // ----- remittances -----

    pub fn remittances_get(
        &self,
        network_id: NetworkId,
        id: RemittanceId,
    ) -> Option<RemittanceRecord> {
        self.remittances_projection.get(network_id, id)
    }

    pub fn remittances_list(&self, network_id: NetworkId) -> Vec<RemittanceRecord> {
        self.remittances_projection.list(network_id)
    }

    pub fn remittances_of(
        &self,
        network_id: NetworkId,
        agent: CustodianId,
    ) -> Vec<RemittanceRecord> {
        self.remittances_projection.history_of(network_id, agent)
    }
}

/// Build an SSE stream of debounced change notices for one network
/// (used by `/events/stream`).
pub fn network_sse_stream(
    services: Arc<AppServices>,
    network_id: NetworkId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(notice) if notice.network_id == network_id => {
            let data = serde_json::to_string(&notice).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(notice.topic.as_str()).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
