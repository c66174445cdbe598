//! Command execution pipeline (application-level orchestration).
//!
//! Every write in the system goes through the same lifecycle:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (network-scoped)
//!   ↓
//! 2. Rehydrate aggregate (fold history into current state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections, change notifier)
//! ```
//!
//! Rehydrating before every decision is what makes availability checks
//! trustworthy: the aggregate always decides against the latest
//! committed state, and the `ExpectedVersion::Exact` append rejects any
//! decision made against a state that moved in the meantime. Two
//! concurrent allocations against the same pool therefore serialize:
//! one commits, the other fails with [`DispatchError::Concurrency`] and
//! can be retried against fresh state.
//!
//! This module contains no IO itself; it composes the [`EventStore`]
//! and `EventBus` traits, so tests run it against the in-memory pair.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tierstock_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, NetworkId};
use tierstock_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    Concurrency(String),
    /// Network isolation violation (cross-network or cross-aggregate
    /// stream mixing).
    NetworkIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// An allocation or order asked for more than the pool can give.
    InsufficientStock {
        variant: String,
        requested: i64,
        available: i64,
    },
    /// An allocation to a sellable tier is missing a required price.
    MissingPrice { variant: String, field: &'static str },
    /// A remittance was attempted without a captured signature.
    MissingSignature,
    /// A state machine refused the transition (stale client state).
    InvalidTransition(String),
    /// Failed to deserialize historical payloads into the aggregate
    /// event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once;
    /// retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::NetworkIsolation(msg) => DispatchError::NetworkIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InsufficientStock {
                variant,
                requested,
                available,
            } => DispatchError::InsufficientStock {
                variant,
                requested,
                available,
            },
            DomainError::MissingPrice { variant, field } => {
                DispatchError::MissingPrice { variant, field }
            }
            DomainError::MissingSignature => DispatchError::MissingSignature,
            DomainError::InvalidTransition(msg) => DispatchError::InvalidTransition(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the application layer and the storage traits, giving
/// every command the same guarantees:
///
/// - **Atomicity**: events are persisted before publication; if the
///   append fails, nothing is published.
/// - **Consistency**: network isolation and optimistic concurrency are
///   enforced on every dispatch.
/// - **At-least-once publication**: if the bus fails after a successful
///   append the error surfaces as [`DispatchError::Publish`], with the
///   events already durable; downstream consumers must dedupe by
///   sequence number.
///
/// `S` and `B` are the store and bus implementations, so tests wire the
/// in-memory pair and production can swap a durable backend without
/// touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// The `make_aggregate` closure builds a fresh, empty aggregate for
    /// rehydration (e.g. `CustodyLedger::empty(id)`); the dispatcher
    /// stays generic over aggregate construction.
    ///
    /// Returns the committed [`StoredEvent`]s with assigned sequence
    /// numbers. An accepted command that decides no events (an
    /// idempotent no-op) returns an empty vec without touching the
    /// store.
    pub fn dispatch<A>(
        &self,
        network_id: NetworkId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(NetworkId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: tierstock_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (network-scoped)
        let history = self.store.load_stream(network_id, aggregate_id)?;
        validate_loaded_stream(network_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(network_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    network_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    network_id: NetworkId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce network isolation even if a buggy backend returns
    // cross-network data, and require monotonic sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.network_id != network_id {
            return Err(DispatchError::NetworkIsolation(format!(
                "loaded stream contains wrong network_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::NetworkIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
