//! `tierstock-events`: event-sourcing mechanics shared by every layer.
//!
//! This crate defines the **contracts** between the domain (which decides
//! events) and the infrastructure (which stores, publishes and projects
//! them). It contains no business rules and no IO:
//!
//! - [`Event`]: what a domain event must expose (type name, schema
//!   version, business time)
//! - [`EventEnvelope`]: the network-scoped unit that travels through
//!   stores and buses
//! - [`EventBus`] / [`Subscription`]: pub/sub distribution after append
//! - [`execute`]: the minimal decide-then-evolve step for tests and
//!   inline processing
//!
//! Read-model building lives with the infrastructure: each projection
//! keeps its own per-stream cursor over these envelopes.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod network;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use network::NetworkScoped;
