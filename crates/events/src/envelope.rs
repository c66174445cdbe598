use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tierstock_core::{AggregateId, NetworkId};

/// Envelope for an event, carrying network + stream metadata.
///
/// This is the unit that moves through the event bus after an append.
///
/// Notes:
/// - **Network isolation** is enforced here via `network_id`; one
///   distribution network never observes another's envelopes.
/// - **Append-only**: `sequence_number` is monotonically increasing per
///   stream, so consumers can dedupe and order.
/// - `event_type` is duplicated out of the payload so that consumers
///   holding an opaque (JSON) payload can still route by topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    network_id: NetworkId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    event_type: String,

    /// Monotonically increasing position in the aggregate stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        network_id: NetworkId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            network_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
