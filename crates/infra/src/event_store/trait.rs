use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tierstock_core::{AggregateId, ExpectedVersion, NetworkId};
use std::sync::Arc;

/// An event ready to be appended to a stream, not yet assigned a
/// sequence number.
///
/// Events move through four shapes: the typed domain event decided by
/// `handle()`, an `UncommittedEvent` carrying stream metadata, a
/// [`StoredEvent`] once the store assigned its sequence number, and an
/// `EventEnvelope` when published to the bus.
///
/// Use [`UncommittedEvent::from_typed`] to build one from a typed
/// domain event; it serializes the payload and captures the event
/// metadata (`event_type`, schema version, business time) needed to
/// deserialize it again during rehydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub network_id: NetworkId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A persisted event with its assigned position in the stream.
///
/// Sequence numbers are assigned by the store during append. They are
/// per-stream (the stream key is `(network_id, aggregate_id)`),
/// monotonically increasing from 1 with no gaps, and immutable once
/// assigned. They drive replay ordering, optimistic concurrency and
/// projection cursor dedupe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub network_id: NetworkId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a network-scoped envelope for
    /// publication. The envelope keeps `event_type` so consumers that
    /// only see JSON payloads (projections, the change notifier) can
    /// still route by it.
    pub fn to_envelope(&self) -> tierstock_events::EventEnvelope<JsonValue> {
        tierstock_events::EventEnvelope::new(
            self.event_id,
            self.network_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.event_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store operation error.
///
/// Infrastructure failures only (storage, concurrency, isolation);
/// deterministic domain failures never reach this type.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("network isolation violation: {0}")]
    NetworkIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only, network-scoped event store.
///
/// One stream per aggregate instance, keyed `(network_id,
/// aggregate_id)`. Implementations must:
/// - enforce network isolation on both read and write
/// - enforce optimistic concurrency against the current stream version
/// - assign `sequence_number`s monotonically starting at
///   `current_version + 1`
/// - persist a batch atomically (all events or none)
///
/// Multi-event batches matter here: cascading decisions (a chained
/// request approval, a forward-deny) commit several events under one
/// version check, and readers must never observe half of one.
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream (append-only).
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a network + aggregate, in sequence
    /// number order. Missing streams load as empty.
    fn load_stream(
        &self,
        network_id: NetworkId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(
        &self,
        network_id: NetworkId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(network_id, aggregate_id)
    }
}

impl UncommittedEvent {
    /// Build an uncommitted event from a typed domain event.
    pub fn from_typed<E>(
        network_id: NetworkId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: tierstock_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            network_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
