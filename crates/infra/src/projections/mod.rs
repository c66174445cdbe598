//! Projection implementations (read model builders).
//!
//! Projections consume published ledger events and build
//! query-optimized read models. All projections are:
//! - **Rebuildable**: reconstructed from the event stream
//! - **Network-isolated**: data is partitioned by network
//! - **Idempotent**: safe for at-least-once delivery
//!
//! Read models serve listing and dashboard queries only. Allocation
//! decisions never read them; those run against freshly rehydrated
//! aggregate state inside the dispatcher.

pub mod order_log;
pub mod remittance_log;
pub mod request_queue;
pub mod stock_positions;

pub use order_log::{OrderLogProjection, OrderProjectionError, OrderReadModel};
pub use remittance_log::{RemittanceLogProjection, RemittanceProjectionError};
pub use request_queue::{RequestProjectionError, RequestQueueProjection, RequestReadModel};
pub use stock_positions::{
    StockPositionKey, StockPositionReadModel, StockPositionsProjection, StockProjectionError,
};

use tierstock_core::NetworkId;
use tierstock_ledger::{LedgerEvent, LedgerId};

/// The (network, ledger) scope a ledger event claims to belong to.
///
/// Projections cross-check this against the envelope so a buggy
/// publisher can never leak one network's rows into another's read
/// model.
pub(crate) fn event_scope(event: &LedgerEvent) -> (NetworkId, LedgerId) {
    match event {
        LedgerEvent::LedgerOpened(e) => (e.network_id, e.ledger_id),
        LedgerEvent::CustodianRegistered(e) => (e.network_id, e.ledger_id),
        LedgerEvent::StockReceived(e) => (e.network_id, e.ledger_id),
        LedgerEvent::StockAllocated(e) => (e.network_id, e.ledger_id),
        LedgerEvent::OrderPlaced(e) => (e.network_id, e.ledger_id),
        LedgerEvent::OrderStageAdvanced(e) => (e.network_id, e.ledger_id),
        LedgerEvent::OrderDenied(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RequestSubmitted(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RequestApproved(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RequestForwarded(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RequestDenied(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RequestCancelled(e) => (e.network_id, e.ledger_id),
        LedgerEvent::RemittanceRecorded(e) => (e.network_id, e.ledger_id),
    }
}
