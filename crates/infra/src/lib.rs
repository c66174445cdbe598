//! Infrastructure layer: event store, command pipeline, read models.
//!
//! Everything here is generic over the [`event_store::EventStore`] and
//! `EventBus` traits; the in-memory implementations back tests and the
//! dev server, and a durable backend can be swapped in behind the same
//! traits without touching domain code.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent,
};
pub use projections::{
    OrderLogProjection, OrderProjectionError, OrderReadModel, RemittanceLogProjection,
    RemittanceProjectionError, RequestProjectionError, RequestQueueProjection, RequestReadModel,
    StockPositionKey, StockPositionReadModel, StockPositionsProjection, StockProjectionError,
};
pub use read_model::{InMemoryNetworkStore, NetworkStore};
pub use workers::{ProjectionWorker, WorkerHandle};
