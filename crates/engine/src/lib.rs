//! Operation surface and change notification over the custody ledger.
//!
//! This crate is the seam between the HTTP boundary and the
//! event-sourced core: it owns conflict retries, batch fan-out,
//! remittance sequencing and the debounced change feed, and keeps the
//! aggregate and dispatcher free of transport concerns.

pub mod engine;
pub mod notify;

pub use engine::{
    ledger_id_for, AllocationItem, BatchItemOutcome, DistributionEngine, RemitOutcome,
    RequestAction, RequestedItem, SharedEngine,
};
pub use notify::{ChangeNotice, ChangeTopic, Debouncer, NOTIFY_DEBOUNCE_ENV};
