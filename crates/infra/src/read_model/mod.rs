//! Network-isolated read model storage abstractions.

pub mod network_store;

pub use network_store::{InMemoryNetworkStore, NetworkStore};
