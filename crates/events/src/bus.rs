//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes events to consumers **after** they have been
//! appended to the event store. It is deliberately lightweight:
//!
//! - **Transport-agnostic**: in-memory channels today, a broker later.
//! - **At-least-once**: consumers must be idempotent; the store, not the
//!   bus, is the source of truth, so re-delivery is always safe.
//! - **No persistence**: a missed message can be recovered by replaying
//!   the stream from the store.
//!
//! In this system the consumers are the read-model projections
//! (stock positions, request queue, order log, remittance log) and the
//! change notifier that feeds the live-update endpoint.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives a copy of every message published to the
/// bus (broadcast semantics). Subscriptions are designed for
/// single-threaded consumption; a worker loop typically polls with
/// [`Subscription::recv_timeout`] so it can also observe a shutdown flag:
///
/// ```ignore
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(envelope) => apply(envelope),
///         Err(RecvTimeoutError::Timeout) => continue,      // check shutdown
///         Err(RecvTimeoutError::Disconnected) => break,    // bus dropped
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Events are **stored first**, then published. If `publish` fails the
/// events are still in the store and can be republished, which is why
/// at-least-once is an acceptable contract here.
///
/// The trait requires `Send + Sync` so a single bus can be shared across
/// the dispatcher, projection workers and the notifier.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
