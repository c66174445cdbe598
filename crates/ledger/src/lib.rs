//! Custody ledger domain: the hierarchical stock books of a
//! distribution network.
//!
//! One event-sourced aggregate per network tracks which custodian holds
//! how much of which variant, the client orders that debit those
//! holdings, the stock requests moving quantities down the chain and
//! the remittances that close an agent's selling cycle. Availability is
//! never stored; [`availability_of`] derives it from holdings and open
//! orders on demand.

pub mod availability;
pub mod custodian;
pub mod holding;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod remittance;
pub mod request;
pub mod tier;

pub use availability::{availability_of, available_quantity, Availability};
pub use custodian::CustodianRecord;
pub use holding::Holding;
pub use ids::{ClientId, CustodianId, OrderId, RemittanceId, RequestId};
pub use ledger::{
    AdvanceOrderStage, AllocateStock, ApproveRequest, CancelRequest, CustodianRegistered,
    CustodyLedger, DenyOrder, DenyRequest, ForwardRequest, LedgerCommand, LedgerEvent, LedgerId,
    LedgerOpened, OpenLedger, OrderDenied, OrderPlaced, OrderStageAdvanced, PlaceOrder,
    ReceiveStock, RegisterCustodian, Remit, RemittanceRecorded, RequestApproved, RequestCancelled,
    RequestDenied, RequestDraft, RequestForwarded, RequestSubmitted, StockAllocated, StockReceived,
    SubmitRequests, LEDGER_AGGREGATE_TYPE,
};
pub use order::{ClientOrder, OrderItem, OrderStage, OrderStatus};
pub use remittance::{RemittanceRecord, ReturnedStock};
pub use request::{RequestLevel, RequestStatus, StockRequest};
pub use tier::CustodianTier;
