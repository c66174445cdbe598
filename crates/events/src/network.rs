use tierstock_core::NetworkId;

use crate::EventEnvelope;

/// Helper trait for network-scoped messages.
///
/// Infrastructure components that fan events out (projection workers,
/// the change notifier) use this to filter or pin processing to one
/// distribution network without knowing the concrete message type.
///
/// A worker pinned to a network rejects envelopes from any other
/// network, which keeps a misrouted message from ever touching the
/// wrong read model.
pub trait NetworkScoped {
    fn network_id(&self) -> NetworkId;
}

impl<E> NetworkScoped for EventEnvelope<E> {
    fn network_id(&self) -> NetworkId {
        self.network_id()
    }
}
