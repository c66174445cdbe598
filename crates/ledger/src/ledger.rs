//! The custody ledger aggregate.
//!
//! One `CustodyLedger` owns *all* state one distribution network's
//! availability math reads: the custodian registry, every
//! (custodian, variant) holding row, all client orders, all stock
//! requests and all remittance records. Keeping them in a single
//! aggregate means every decision (an allocation's availability check,
//! a chained approval, a remittance snapshot) is made against one
//! consistent state and committed under one optimistic version check.
//! Operations that must move several records together (forward-deny
//! cascades, chained approvals, remittances) emit several events in one
//! append, which the store commits all-or-nothing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierstock_catalog::{PriceSet, VariantId};
use tierstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, NetworkId};
use tierstock_events::Event;

use crate::availability::available_quantity;
use crate::custodian::CustodianRecord;
use crate::holding::Holding;
use crate::ids::{ClientId, CustodianId, OrderId, RemittanceId, RequestId};
use crate::order::{ClientOrder, OrderItem, OrderStage, OrderStatus};
use crate::remittance::{RemittanceRecord, ReturnedStock};
use crate::request::{RequestLevel, RequestStatus, StockRequest};
use crate::tier::CustodianTier;

/// Stream type identifier for custody ledger aggregates.
pub const LEDGER_AGGREGATE_TYPE: &str = "custody.ledger";

/// Custody ledger identifier (aggregate id; one per network).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: CustodyLedger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodyLedger {
    id: LedgerId,
    network_id: Option<NetworkId>,
    custodians: BTreeMap<CustodianId, CustodianRecord>,
    holdings: BTreeMap<(CustodianId, VariantId), Holding>,
    orders: BTreeMap<OrderId, ClientOrder>,
    requests: BTreeMap<RequestId, StockRequest>,
    remittances: BTreeMap<RemittanceId, RemittanceRecord>,
    /// Cached root custodian; set when the admin registers.
    admin: Option<CustodianId>,
    version: u64,
    created: bool,
}

impl CustodyLedger {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            network_id: None,
            custodians: BTreeMap::new(),
            holdings: BTreeMap::new(),
            orders: BTreeMap::new(),
            requests: BTreeMap::new(),
            remittances: BTreeMap::new(),
            admin: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    pub fn admin(&self) -> Option<CustodianId> {
        self.admin
    }

    pub fn custodian(&self, id: CustodianId) -> Option<&CustodianRecord> {
        self.custodians.get(&id)
    }

    pub fn custodians(&self) -> impl Iterator<Item = (CustodianId, &CustodianRecord)> {
        self.custodians.iter().map(|(id, record)| (*id, record))
    }

    pub fn holding(&self, custodian: CustodianId, variant: VariantId) -> Option<&Holding> {
        self.holdings.get(&(custodian, variant))
    }

    /// Row quantity, 0 if the row does not exist yet.
    pub fn holding_quantity(&self, custodian: CustodianId, variant: VariantId) -> i64 {
        self.holdings
            .get(&(custodian, variant))
            .map(|holding| holding.quantity)
            .unwrap_or(0)
    }

    pub fn holdings(&self) -> impl Iterator<Item = (CustodianId, VariantId, &Holding)> {
        self.holdings
            .iter()
            .map(|((custodian, variant), holding)| (*custodian, *variant, holding))
    }

    /// All rows of one custodian, sorted by variant.
    pub fn holdings_of(
        &self,
        custodian: CustodianId,
    ) -> impl Iterator<Item = (VariantId, &Holding)> {
        self.holdings
            .iter()
            .filter(move |((owner, _), _)| *owner == custodian)
            .map(|((_, variant), holding)| (*variant, holding))
    }

    pub fn order(&self, id: OrderId) -> Option<&ClientOrder> {
        self.orders.get(&id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &ClientOrder> {
        self.orders.values()
    }

    pub fn request(&self, id: RequestId) -> Option<&StockRequest> {
        self.requests.get(&id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &StockRequest> {
        self.requests.values()
    }

    pub fn remittance(&self, id: RemittanceId) -> Option<&RemittanceRecord> {
        self.remittances.get(&id)
    }

    pub fn remittances(&self) -> impl Iterator<Item = &RemittanceRecord> {
        self.remittances.values()
    }

    pub fn direct_children(&self, custodian: CustodianId) -> impl Iterator<Item = CustodianId> {
        self.custodians
            .iter()
            .filter(move |(_, record)| record.parent == Some(custodian))
            .map(|(id, _)| *id)
    }

    /// Walk the parent chain of `descendant` looking for `ancestor`.
    /// A custodian is not its own descendant.
    pub fn is_strict_descendant(&self, descendant: CustodianId, ancestor: CustodianId) -> bool {
        if descendant == ancestor {
            return false;
        }
        let mut current = self
            .custodians
            .get(&descendant)
            .and_then(|record| record.parent);
        // The chain is three tiers deep; the bound guards a corrupted
        // registry from looping forever.
        let mut hops = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > 4 {
                return false;
            }
            current = self.custodians.get(&parent).and_then(|record| record.parent);
        }
        false
    }
}

impl AggregateRoot for CustodyLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Command: OpenLedger (creates the per-network stream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLedger {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterCustodian.
///
/// Mirrors the external org structure into the ledger; role resolution
/// stays with the session layer, the ledger only records the shape the
/// availability math needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustodian {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub custodian_id: CustodianId,
    pub tier: CustodianTier,
    pub parent: Option<CustodianId>,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (external intake into the admin's main ledger).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub admin: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateStock (custody transfer one hop down the chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub allocated_by: CustodianId,
    pub parent: CustodianId,
    pub child: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceOrder (agent sale; firm reservation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub agent: CustodianId,
    pub client: ClientId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceOrderStage.
///
/// The stage to advance to is derived from the actor: the agent's
/// leader takes `None → LeaderApproved`, the admin takes
/// `LeaderApproved → AdminApproved` (which also resolves the order as
/// approved). Stage transitions never touch holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOrderStage {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub advanced_by: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DenyOrder (returns the ordered items to the agent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyOrder {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub denied_by: CustodianId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// One row of a request batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub request_id: RequestId,
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Command: SubmitRequests (one or many; each row becomes its own
/// request, all sharing the batch timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequests {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub requester: CustodianId,
    pub items: Vec<RequestDraft>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequest.
///
/// The approver supplies the prices for the resulting allocation.
/// Approving a forwarded copy settles the original in the same append:
/// stock flows admin → leader → agent under one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub approved_by: CustodianId,
    pub prices: PriceSet,
    pub responder_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ForwardRequest (leader escalates an agent request to admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub child_request_id: RequestId,
    pub forwarded_by: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DenyRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRequest {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub denied_by: CustodianId,
    pub denial_reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRequest (requester only, pending only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub cancelled_by: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Remit (closes an agent's selling cycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remit {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub remittance_id: RemittanceId,
    pub agent: CustodianId,
    pub leader: CustodianId,
    pub order_ids: Vec<OrderId>,
    pub signature_ref: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    OpenLedger(OpenLedger),
    RegisterCustodian(RegisterCustodian),
    ReceiveStock(ReceiveStock),
    AllocateStock(AllocateStock),
    PlaceOrder(PlaceOrder),
    AdvanceOrderStage(AdvanceOrderStage),
    DenyOrder(DenyOrder),
    SubmitRequests(SubmitRequests),
    ApproveRequest(ApproveRequest),
    ForwardRequest(ForwardRequest),
    DenyRequest(DenyRequest),
    CancelRequest(CancelRequest),
    Remit(Remit),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event: LedgerOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOpened {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustodianRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianRegistered {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub custodian_id: CustodianId,
    pub tier: CustodianTier,
    pub parent: Option<CustodianId>,
    pub display_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub admin: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAllocated (the audit trail row for every custody hop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocated {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub allocated_by: CustodianId,
    pub parent: CustodianId,
    pub child: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub prices: PriceSet,
    /// Set when this allocation fulfils an approved stock request.
    pub request_id: Option<RequestId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub agent: CustodianId,
    pub client: ClientId,
    pub items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStageAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStageAdvanced {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub stage: OrderStage,
    pub advanced_by: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDenied (carries the items returned to the agent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDenied {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub order_id: OrderId,
    pub agent: CustodianId,
    pub denied_by: CustodianId,
    pub reason: String,
    pub returned_items: Vec<OrderItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub requester: CustodianId,
    pub target: CustodianId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub level: RequestLevel,
    pub parent_request: Option<RequestId>,
    pub requester_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub approved_by: CustodianId,
    pub responder_notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestForwarded.
///
/// Apply creates the `LeaderToAdmin` copy (same variant, quantity and
/// notes as the original) and links it on the original, which stays
/// pending until the copy resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestForwarded {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub child_request_id: RequestId,
    pub forwarded_by: CustodianId,
    /// The admin custodian the forwarded copy targets.
    pub target: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestDenied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDenied {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub denied_by: CustodianId,
    pub denial_reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelled {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub request_id: RequestId,
    pub cancelled_by: CustodianId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RemittanceRecorded (carries the full immutable record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceRecorded {
    pub network_id: NetworkId,
    pub ledger_id: LedgerId,
    pub record: RemittanceRecord,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerOpened(LedgerOpened),
    CustodianRegistered(CustodianRegistered),
    StockReceived(StockReceived),
    StockAllocated(StockAllocated),
    OrderPlaced(OrderPlaced),
    OrderStageAdvanced(OrderStageAdvanced),
    OrderDenied(OrderDenied),
    RequestSubmitted(RequestSubmitted),
    RequestApproved(RequestApproved),
    RequestForwarded(RequestForwarded),
    RequestDenied(RequestDenied),
    RequestCancelled(RequestCancelled),
    RemittanceRecorded(RemittanceRecorded),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerOpened(_) => "ledger.opened",
            LedgerEvent::CustodianRegistered(_) => "ledger.custodian.registered",
            LedgerEvent::StockReceived(_) => "ledger.stock.received",
            LedgerEvent::StockAllocated(_) => "ledger.stock.allocated",
            LedgerEvent::OrderPlaced(_) => "ledger.order.placed",
            LedgerEvent::OrderStageAdvanced(_) => "ledger.order.stage_advanced",
            LedgerEvent::OrderDenied(_) => "ledger.order.denied",
            LedgerEvent::RequestSubmitted(_) => "ledger.request.submitted",
            LedgerEvent::RequestApproved(_) => "ledger.request.approved",
            LedgerEvent::RequestForwarded(_) => "ledger.request.forwarded",
            LedgerEvent::RequestDenied(_) => "ledger.request.denied",
            LedgerEvent::RequestCancelled(_) => "ledger.request.cancelled",
            LedgerEvent::RemittanceRecorded(_) => "ledger.remittance.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LedgerOpened(e) => e.occurred_at,
            LedgerEvent::CustodianRegistered(e) => e.occurred_at,
            LedgerEvent::StockReceived(e) => e.occurred_at,
            LedgerEvent::StockAllocated(e) => e.occurred_at,
            LedgerEvent::OrderPlaced(e) => e.occurred_at,
            LedgerEvent::OrderStageAdvanced(e) => e.occurred_at,
            LedgerEvent::OrderDenied(e) => e.occurred_at,
            LedgerEvent::RequestSubmitted(e) => e.occurred_at,
            LedgerEvent::RequestApproved(e) => e.occurred_at,
            LedgerEvent::RequestForwarded(e) => e.occurred_at,
            LedgerEvent::RequestDenied(e) => e.occurred_at,
            LedgerEvent::RequestCancelled(e) => e.occurred_at,
            LedgerEvent::RemittanceRecorded(e) => e.occurred_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate lifecycle
// ---------------------------------------------------------------------------

impl Aggregate for CustodyLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LedgerOpened(e) => {
                self.id = e.ledger_id;
                self.network_id = Some(e.network_id);
                self.created = true;
            }
            LedgerEvent::CustodianRegistered(e) => {
                self.custodians.insert(
                    e.custodian_id,
                    CustodianRecord {
                        tier: e.tier,
                        parent: e.parent,
                        display_name: e.display_name.clone(),
                        registered_at: e.occurred_at,
                    },
                );
                if e.tier == CustodianTier::Admin {
                    self.admin = Some(e.custodian_id);
                }
            }
            LedgerEvent::StockReceived(e) => {
                self.holdings
                    .entry((e.admin, e.variant_id))
                    .and_modify(|holding| holding.credit(e.quantity, e.prices, e.occurred_at))
                    .or_insert_with(|| Holding::new(e.quantity, e.prices, e.occurred_at));
            }
            LedgerEvent::StockAllocated(e) => {
                // The parent row is untouched; availability is derived.
                self.holdings
                    .entry((e.child, e.variant_id))
                    .and_modify(|holding| holding.credit(e.quantity, e.prices, e.occurred_at))
                    .or_insert_with(|| Holding::new(e.quantity, e.prices, e.occurred_at));
            }
            LedgerEvent::OrderPlaced(e) => {
                for item in &e.items {
                    if let Some(holding) = self.holdings.get_mut(&(e.agent, item.variant_id)) {
                        holding.debit(item.quantity);
                    }
                }
                self.orders.insert(
                    e.order_id,
                    ClientOrder {
                        id: e.order_id,
                        agent: e.agent,
                        client: e.client,
                        items: e.items.clone(),
                        status: OrderStatus::Pending,
                        stage: OrderStage::None,
                        remitted: false,
                        placed_at: e.occurred_at,
                        decided_at: None,
                        decided_by: None,
                        denial_reason: None,
                    },
                );
            }
            LedgerEvent::OrderStageAdvanced(e) => {
                if let Some(order) = self.orders.get_mut(&e.order_id) {
                    order.stage = e.stage;
                    if e.stage == OrderStage::AdminApproved {
                        order.status = OrderStatus::Approved;
                        order.decided_at = Some(e.occurred_at);
                        order.decided_by = Some(e.advanced_by);
                    }
                }
            }
            LedgerEvent::OrderDenied(e) => {
                if let Some(order) = self.orders.get_mut(&e.order_id) {
                    order.status = OrderStatus::Denied;
                    order.denial_reason = Some(e.reason.clone());
                    order.decided_at = Some(e.occurred_at);
                    order.decided_by = Some(e.denied_by);
                }
                for item in &e.returned_items {
                    if let Some(holding) = self.holdings.get_mut(&(e.agent, item.variant_id)) {
                        holding.restock(item.quantity);
                    }
                }
            }
            LedgerEvent::RequestSubmitted(e) => {
                self.requests.insert(
                    e.request_id,
                    StockRequest {
                        id: e.request_id,
                        requester: e.requester,
                        target: e.target,
                        variant_id: e.variant_id,
                        quantity: e.quantity,
                        level: e.level,
                        status: RequestStatus::Pending,
                        parent_request: e.parent_request,
                        forwarded_child: None,
                        requester_notes: e.requester_notes.clone(),
                        responder_notes: None,
                        denial_reason: None,
                        requested_at: e.occurred_at,
                        responded_at: None,
                    },
                );
            }
            LedgerEvent::RequestApproved(e) => {
                if let Some(request) = self.requests.get_mut(&e.request_id) {
                    request.status = RequestStatus::Approved;
                    request.responder_notes = e.responder_notes.clone();
                    request.responded_at = Some(e.occurred_at);
                }
            }
            LedgerEvent::RequestForwarded(e) => {
                let original_fields = self.requests.get(&e.request_id).map(|original| {
                    (
                        original.variant_id,
                        original.quantity,
                        original.requester_notes.clone(),
                    )
                });
                if let Some((variant_id, quantity, requester_notes)) = original_fields {
                    self.requests.insert(
                        e.child_request_id,
                        StockRequest {
                            id: e.child_request_id,
                            requester: e.forwarded_by,
                            target: e.target,
                            variant_id,
                            quantity,
                            level: RequestLevel::LeaderToAdmin,
                            status: RequestStatus::Pending,
                            parent_request: Some(e.request_id),
                            forwarded_child: None,
                            requester_notes,
                            responder_notes: None,
                            denial_reason: None,
                            requested_at: e.occurred_at,
                            responded_at: None,
                        },
                    );
                    if let Some(original) = self.requests.get_mut(&e.request_id) {
                        original.forwarded_child = Some(e.child_request_id);
                    }
                }
            }
            LedgerEvent::RequestDenied(e) => {
                if let Some(request) = self.requests.get_mut(&e.request_id) {
                    request.status = RequestStatus::Denied;
                    request.denial_reason = Some(e.denial_reason.clone());
                    request.responded_at = Some(e.occurred_at);
                }
            }
            LedgerEvent::RequestCancelled(e) => {
                let mut original_id = None;
                if let Some(request) = self.requests.get_mut(&e.request_id) {
                    request.status = RequestStatus::Cancelled;
                    request.responded_at = Some(e.occurred_at);
                    original_id = request.parent_request;
                }
                // Cancelling a forwarded copy alone hands the original
                // back to its own queue.
                if let Some(original_id) = original_id {
                    if let Some(original) = self.requests.get_mut(&original_id) {
                        if original.is_pending() {
                            original.forwarded_child = None;
                        }
                    }
                }
            }
            LedgerEvent::RemittanceRecorded(e) => {
                for returned in &e.record.returned {
                    if let Some(holding) =
                        self.holdings.get_mut(&(e.record.agent, returned.variant_id))
                    {
                        holding.debit_to_zero();
                    }
                }
                for order_id in &e.record.order_ids {
                    if let Some(order) = self.orders.get_mut(order_id) {
                        order.remitted = true;
                    }
                }
                self.remittances.insert(e.record.id, e.record.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::OpenLedger(cmd) => self.handle_open(cmd),
            LedgerCommand::RegisterCustodian(cmd) => self.handle_register_custodian(cmd),
            LedgerCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            LedgerCommand::AllocateStock(cmd) => self.handle_allocate(cmd),
            LedgerCommand::PlaceOrder(cmd) => self.handle_place_order(cmd),
            LedgerCommand::AdvanceOrderStage(cmd) => self.handle_advance_stage(cmd),
            LedgerCommand::DenyOrder(cmd) => self.handle_deny_order(cmd),
            LedgerCommand::SubmitRequests(cmd) => self.handle_submit_requests(cmd),
            LedgerCommand::ApproveRequest(cmd) => self.handle_approve_request(cmd),
            LedgerCommand::ForwardRequest(cmd) => self.handle_forward_request(cmd),
            LedgerCommand::DenyRequest(cmd) => self.handle_deny_request(cmd),
            LedgerCommand::CancelRequest(cmd) => self.handle_cancel_request(cmd),
            LedgerCommand::Remit(cmd) => self.handle_remit(cmd),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision logic
// ---------------------------------------------------------------------------

impl CustodyLedger {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_network(&self, network_id: NetworkId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.network_id != Some(network_id) {
            return Err(DomainError::invariant("network mismatch"));
        }
        Ok(())
    }

    fn ensure_ledger(&self, ledger_id: LedgerId) -> Result<(), DomainError> {
        if self.id != ledger_id {
            return Err(DomainError::invariant("ledger_id mismatch"));
        }
        Ok(())
    }

    fn scope_checks(&self, network_id: NetworkId, ledger_id: LedgerId) -> Result<(), DomainError> {
        self.ensure_open()?;
        self.ensure_network(network_id)?;
        self.ensure_ledger(ledger_id)?;
        Ok(())
    }

    fn custodian_record(&self, id: CustodianId) -> Result<&CustodianRecord, DomainError> {
        self.custodians
            .get(&id)
            .ok_or_else(|| DomainError::validation(format!("custodian {id} is not registered")))
    }

    /// Shared allocation precondition checks (§ the three gates:
    /// quantity, availability, tier-required prices), used by direct
    /// allocation and by request approval.
    fn check_allocation(
        &self,
        parent: CustodianId,
        child: CustodianId,
        variant_id: VariantId,
        quantity: i64,
        prices: &PriceSet,
    ) -> Result<(), DomainError> {
        self.custodian_record(parent)?;
        let child_record = self.custodian_record(child)?;
        if child_record.parent != Some(parent) {
            return Err(DomainError::validation(format!(
                "custodian {child} is not a direct child of {parent}"
            )));
        }

        if quantity <= 0 {
            return Err(DomainError::validation(
                "allocation quantity must be positive",
            ));
        }

        let available = available_quantity(self, parent, variant_id);
        if available < quantity {
            return Err(DomainError::insufficient_stock(
                variant_id, quantity, available,
            ));
        }

        // Never create sellable stock with an unknown price.
        for field in child_record.tier.required_price_fields() {
            match prices.get(*field) {
                Some(value) if value > 0 => {}
                _ => return Err(DomainError::missing_price(variant_id, field.as_str())),
            }
        }
        prices.validate(variant_id)?;

        Ok(())
    }

    fn handle_open(&self, cmd: &OpenLedger) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("ledger already opened"));
        }
        Ok(vec![LedgerEvent::LedgerOpened(LedgerOpened {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_custodian(
        &self,
        cmd: &RegisterCustodian,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        if self.custodians.contains_key(&cmd.custodian_id) {
            return Err(DomainError::conflict("custodian already registered"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        match cmd.tier.parent_tier() {
            None => {
                if cmd.parent.is_some() {
                    return Err(DomainError::validation(
                        "the admin custodian has no parent",
                    ));
                }
                if self.admin.is_some() {
                    return Err(DomainError::conflict(
                        "network already has an admin custodian",
                    ));
                }
            }
            Some(expected) => {
                let Some(parent_id) = cmd.parent else {
                    return Err(DomainError::validation(format!(
                        "{} custodians require a parent",
                        cmd.tier
                    )));
                };
                let parent = self.custodian_record(parent_id)?;
                if parent.tier != expected {
                    return Err(DomainError::validation(format!(
                        "parent of a {} must be a {}",
                        cmd.tier, expected
                    )));
                }
            }
        }

        Ok(vec![LedgerEvent::CustodianRegistered(CustodianRegistered {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            custodian_id: cmd.custodian_id,
            tier: cmd.tier,
            parent: cmd.parent,
            display_name: cmd.display_name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let admin = self.custodian_record(cmd.admin)?;
        if admin.tier != CustodianTier::Admin {
            return Err(DomainError::Unauthorized);
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation(
                "received quantity must be positive",
            ));
        }
        cmd.prices.validate(cmd.variant_id)?;

        Ok(vec![LedgerEvent::StockReceived(StockReceived {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            admin: cmd.admin,
            variant_id: cmd.variant_id,
            quantity: cmd.quantity,
            prices: cmd.prices,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        // Only the custodian giving stock away decides a direct allocation.
        if cmd.allocated_by != cmd.parent {
            return Err(DomainError::Unauthorized);
        }
        self.check_allocation(
            cmd.parent,
            cmd.child,
            cmd.variant_id,
            cmd.quantity,
            &cmd.prices,
        )?;

        Ok(vec![LedgerEvent::StockAllocated(StockAllocated {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            allocated_by: cmd.allocated_by,
            parent: cmd.parent,
            child: cmd.child,
            variant_id: cmd.variant_id,
            quantity: cmd.quantity,
            prices: cmd.prices,
            request_id: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place_order(&self, cmd: &PlaceOrder) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let agent = self.custodian_record(cmd.agent)?;
        if agent.tier != CustodianTier::Agent {
            return Err(DomainError::validation(
                "only agent custodians place client orders",
            ));
        }
        if self.orders.contains_key(&cmd.order_id) {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation(
                "order must contain at least one item",
            ));
        }

        let mut totals: BTreeMap<VariantId, i64> = BTreeMap::new();
        for item in &cmd.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation("order quantity must be positive"));
            }
            if item.unit_price == 0 {
                return Err(DomainError::validation("order unit price must be positive"));
            }
            *totals.entry(item.variant_id).or_insert(0) += item.quantity;
        }

        // The debit happens at placement, so the agent's own row is the
        // gate, not the derived availability of an ancestor.
        for (variant_id, requested) in &totals {
            let held = self.holding_quantity(cmd.agent, *variant_id);
            if held < *requested {
                return Err(DomainError::insufficient_stock(*variant_id, *requested, held));
            }
        }

        Ok(vec![LedgerEvent::OrderPlaced(OrderPlaced {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            order_id: cmd.order_id,
            agent: cmd.agent,
            client: cmd.client,
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance_stage(
        &self,
        cmd: &AdvanceOrderStage,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let order = self.orders.get(&cmd.order_id).ok_or_else(DomainError::not_found)?;
        if order.remitted {
            return Err(DomainError::invalid_transition(format!(
                "order {} was already remitted",
                cmd.order_id
            )));
        }
        if order.is_resolved() {
            return Err(DomainError::invalid_transition(format!(
                "order {} is already resolved",
                cmd.order_id
            )));
        }

        let actor = self.custodian_record(cmd.advanced_by)?;
        let agent = self.custodian_record(order.agent)?;

        let stage = match actor.tier {
            CustodianTier::Leader => {
                if agent.parent != Some(cmd.advanced_by) {
                    return Err(DomainError::Unauthorized);
                }
                if order.stage != OrderStage::None {
                    return Err(DomainError::invalid_transition(format!(
                        "order {} already passed the leader stage",
                        cmd.order_id
                    )));
                }
                OrderStage::LeaderApproved
            }
            CustodianTier::Admin => {
                if order.stage != OrderStage::LeaderApproved {
                    return Err(DomainError::invalid_transition(
                        "the admin stage follows the leader stage",
                    ));
                }
                OrderStage::AdminApproved
            }
            CustodianTier::Agent => return Err(DomainError::Unauthorized),
        };

        Ok(vec![LedgerEvent::OrderStageAdvanced(OrderStageAdvanced {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            order_id: cmd.order_id,
            stage,
            advanced_by: cmd.advanced_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deny_order(&self, cmd: &DenyOrder) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let order = self.orders.get(&cmd.order_id).ok_or_else(DomainError::not_found)?;
        if order.remitted {
            return Err(DomainError::invalid_transition(format!(
                "order {} was already remitted",
                cmd.order_id
            )));
        }
        if order.is_resolved() {
            return Err(DomainError::invalid_transition(format!(
                "order {} is already resolved",
                cmd.order_id
            )));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("denial reason is mandatory"));
        }

        let actor = self.custodian_record(cmd.denied_by)?;
        let agent = self.custodian_record(order.agent)?;
        let may_deny = match actor.tier {
            CustodianTier::Leader => agent.parent == Some(cmd.denied_by),
            CustodianTier::Admin => true,
            CustodianTier::Agent => false,
        };
        if !may_deny {
            return Err(DomainError::Unauthorized);
        }

        Ok(vec![LedgerEvent::OrderDenied(OrderDenied {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            order_id: cmd.order_id,
            agent: order.agent,
            denied_by: cmd.denied_by,
            reason: cmd.reason.clone(),
            returned_items: order.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit_requests(
        &self,
        cmd: &SubmitRequests,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let requester = self.custodian_record(cmd.requester)?;
        let Some(level) = requester.tier.request_level() else {
            return Err(DomainError::validation(
                "the admin tier cannot request stock",
            ));
        };
        let Some(target) = requester.parent else {
            return Err(DomainError::invariant("requester has no parent custodian"));
        };

        if cmd.items.is_empty() {
            return Err(DomainError::validation(
                "request batch must contain at least one item",
            ));
        }
        let mut seen = BTreeSet::new();
        for item in &cmd.items {
            if !seen.insert(item.request_id) {
                return Err(DomainError::conflict("duplicate request id in batch"));
            }
            if self.requests.contains_key(&item.request_id) {
                return Err(DomainError::conflict(format!(
                    "request {} already exists",
                    item.request_id
                )));
            }
            if item.quantity <= 0 {
                return Err(DomainError::validation(
                    "requested quantity must be positive",
                ));
            }
        }

        // Every row of the batch shares the submission timestamp so the
        // reviewing tier can group them as one logical action.
        Ok(cmd
            .items
            .iter()
            .map(|item| {
                LedgerEvent::RequestSubmitted(RequestSubmitted {
                    network_id: cmd.network_id,
                    ledger_id: cmd.ledger_id,
                    request_id: item.request_id,
                    requester: cmd.requester,
                    target,
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                    level,
                    parent_request: None,
                    requester_notes: cmd.notes.clone(),
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    fn handle_approve_request(
        &self,
        cmd: &ApproveRequest,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let request = self
            .requests
            .get(&cmd.request_id)
            .ok_or_else(DomainError::not_found)?;
        if !request.is_pending() {
            return Err(DomainError::invalid_transition(format!(
                "request {} is already resolved",
                cmd.request_id
            )));
        }
        if request.awaiting_forward() {
            return Err(DomainError::invalid_transition(format!(
                "request {} was forwarded and resolves with its forwarded copy",
                cmd.request_id
            )));
        }
        if cmd.approved_by != request.target {
            return Err(DomainError::Unauthorized);
        }

        self.check_allocation(
            request.target,
            request.requester,
            request.variant_id,
            request.quantity,
            &cmd.prices,
        )?;

        let mut events = vec![
            LedgerEvent::RequestApproved(RequestApproved {
                network_id: cmd.network_id,
                ledger_id: cmd.ledger_id,
                request_id: cmd.request_id,
                approved_by: cmd.approved_by,
                responder_notes: cmd.responder_notes.clone(),
                occurred_at: cmd.occurred_at,
            }),
            LedgerEvent::StockAllocated(StockAllocated {
                network_id: cmd.network_id,
                ledger_id: cmd.ledger_id,
                allocated_by: cmd.approved_by,
                parent: request.target,
                child: request.requester,
                variant_id: request.variant_id,
                quantity: request.quantity,
                prices: cmd.prices,
                request_id: Some(cmd.request_id),
                occurred_at: cmd.occurred_at,
            }),
        ];

        // Approving a forwarded copy settles the original in the same
        // append: the admin's single decision moves stock admin → leader
        // → agent, never stranding it with the leader.
        if let Some(original_id) = request.parent_request {
            let original = self
                .requests
                .get(&original_id)
                .ok_or_else(|| DomainError::invariant("forwarded request has no original"))?;
            if !original.is_pending() {
                return Err(DomainError::invariant(
                    "original of a forwarded request is not pending",
                ));
            }

            // The second hop is checked against the state after the
            // first one lands, not against stale pre-approval state.
            let mut scratch = self.clone();
            for event in &events {
                scratch.apply(event);
            }
            scratch.check_allocation(
                original.target,
                original.requester,
                original.variant_id,
                original.quantity,
                &cmd.prices,
            )?;

            events.push(LedgerEvent::RequestApproved(RequestApproved {
                network_id: cmd.network_id,
                ledger_id: cmd.ledger_id,
                request_id: original_id,
                approved_by: cmd.approved_by,
                responder_notes: cmd.responder_notes.clone(),
                occurred_at: cmd.occurred_at,
            }));
            events.push(LedgerEvent::StockAllocated(StockAllocated {
                network_id: cmd.network_id,
                ledger_id: cmd.ledger_id,
                allocated_by: cmd.approved_by,
                parent: original.target,
                child: original.requester,
                variant_id: original.variant_id,
                quantity: original.quantity,
                prices: cmd.prices,
                request_id: Some(original_id),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_forward_request(
        &self,
        cmd: &ForwardRequest,
    ) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let request = self
            .requests
            .get(&cmd.request_id)
            .ok_or_else(DomainError::not_found)?;
        if !request.is_pending() {
            return Err(DomainError::invalid_transition(format!(
                "request {} is already resolved",
                cmd.request_id
            )));
        }
        if request.forwarded_child.is_some() {
            return Err(DomainError::invalid_transition(format!(
                "request {} was already forwarded",
                cmd.request_id
            )));
        }
        if request.level != RequestLevel::AgentToLeader {
            return Err(DomainError::invalid_transition(
                "only agent-level requests can be forwarded",
            ));
        }
        if cmd.forwarded_by != request.target {
            return Err(DomainError::Unauthorized);
        }
        if self.requests.contains_key(&cmd.child_request_id) {
            return Err(DomainError::conflict("forwarded request id already exists"));
        }
        let Some(admin_id) = self.admin else {
            return Err(DomainError::invariant("network has no admin custodian"));
        };

        Ok(vec![LedgerEvent::RequestForwarded(RequestForwarded {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            request_id: cmd.request_id,
            child_request_id: cmd.child_request_id,
            forwarded_by: cmd.forwarded_by,
            target: admin_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deny_request(&self, cmd: &DenyRequest) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let request = self
            .requests
            .get(&cmd.request_id)
            .ok_or_else(DomainError::not_found)?;
        if !request.is_pending() {
            return Err(DomainError::invalid_transition(format!(
                "request {} is already resolved",
                cmd.request_id
            )));
        }
        if request.awaiting_forward() {
            return Err(DomainError::invalid_transition(format!(
                "request {} was forwarded and resolves with its forwarded copy",
                cmd.request_id
            )));
        }
        if cmd.denied_by != request.target {
            return Err(DomainError::Unauthorized);
        }
        if cmd.denial_reason.trim().is_empty() {
            return Err(DomainError::validation("denial_reason is mandatory"));
        }

        let mut events = vec![LedgerEvent::RequestDenied(RequestDenied {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            request_id: cmd.request_id,
            denied_by: cmd.denied_by,
            denial_reason: cmd.denial_reason.clone(),
            occurred_at: cmd.occurred_at,
        })];

        // Once the forwarded copy is denied the original ask can never
        // be fulfilled; it is denied with the same reason in the same
        // append.
        if let Some(original_id) = request.parent_request {
            events.push(LedgerEvent::RequestDenied(RequestDenied {
                network_id: cmd.network_id,
                ledger_id: cmd.ledger_id,
                request_id: original_id,
                denied_by: cmd.denied_by,
                denial_reason: cmd.denial_reason.clone(),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_cancel_request(&self, cmd: &CancelRequest) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let request = self
            .requests
            .get(&cmd.request_id)
            .ok_or_else(DomainError::not_found)?;
        if !request.is_pending() {
            return Err(DomainError::invalid_transition(
                "only pending requests can be cancelled",
            ));
        }
        if cmd.cancelled_by != request.requester {
            return Err(DomainError::Unauthorized);
        }

        let mut events = vec![LedgerEvent::RequestCancelled(RequestCancelled {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            request_id: cmd.request_id,
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })];

        // Withdrawing the original withdraws its escalation too.
        if let Some(child_id) = request.forwarded_child {
            let child_pending = self
                .requests
                .get(&child_id)
                .map(|child| child.is_pending())
                .unwrap_or(false);
            if child_pending {
                events.push(LedgerEvent::RequestCancelled(RequestCancelled {
                    network_id: cmd.network_id,
                    ledger_id: cmd.ledger_id,
                    request_id: child_id,
                    cancelled_by: cmd.cancelled_by,
                    occurred_at: cmd.occurred_at,
                }));
            }
        }

        Ok(events)
    }

    fn handle_remit(&self, cmd: &Remit) -> Result<Vec<LedgerEvent>, DomainError> {
        self.scope_checks(cmd.network_id, cmd.ledger_id)?;

        let agent = self.custodian_record(cmd.agent)?;
        if agent.tier != CustodianTier::Agent {
            return Err(DomainError::validation("only agent custodians remit"));
        }
        if agent.parent != Some(cmd.leader) {
            return Err(DomainError::validation(format!(
                "{} is not the leader of agent {}",
                cmd.leader, cmd.agent
            )));
        }
        if self.remittances.contains_key(&cmd.remittance_id) {
            return Err(DomainError::conflict("remittance already recorded"));
        }
        // Signature capture is sequenced before the transaction; the
        // command still refuses to mutate anything without one.
        if cmd.signature_ref.trim().is_empty() {
            return Err(DomainError::MissingSignature);
        }

        let mut seen = BTreeSet::new();
        for order_id in &cmd.order_ids {
            if !seen.insert(*order_id) {
                return Err(DomainError::validation("duplicate order in remittance"));
            }
            let order = self.orders.get(order_id).ok_or_else(DomainError::not_found)?;
            if order.agent != cmd.agent {
                return Err(DomainError::Unauthorized);
            }
            if order.remitted {
                return Err(DomainError::invalid_transition(format!(
                    "order {order_id} was already remitted"
                )));
            }
            if order.status == OrderStatus::Denied {
                return Err(DomainError::invalid_transition(
                    "denied orders cannot be remitted",
                ));
            }
        }

        // Snapshot the unsold rows; BTreeMap order keeps the event
        // payload replay-stable.
        let returned: Vec<ReturnedStock> = self
            .holdings
            .iter()
            .filter(|((owner, _), holding)| *owner == cmd.agent && holding.quantity > 0)
            .map(|((_, variant_id), holding)| ReturnedStock {
                variant_id: *variant_id,
                quantity: holding.quantity,
            })
            .collect();

        if returned.is_empty() && cmd.order_ids.is_empty() {
            // Nothing left to remit: report a no-op, never a double remit.
            return Ok(vec![]);
        }

        let items_remitted = returned.len() as u32;
        let total_units: i64 = returned.iter().map(|row| row.quantity).sum();
        let total_revenue: u64 = cmd
            .order_ids
            .iter()
            .filter_map(|order_id| self.orders.get(order_id))
            .map(|order| order.total_amount())
            .sum();

        let record = RemittanceRecord {
            id: cmd.remittance_id,
            agent: cmd.agent,
            leader: cmd.leader,
            returned,
            order_ids: cmd.order_ids.clone(),
            items_remitted,
            total_units,
            orders_count: cmd.order_ids.len() as u32,
            total_revenue,
            signature_ref: cmd.signature_ref.clone(),
            recorded_at: cmd.occurred_at,
        };

        Ok(vec![LedgerEvent::RemittanceRecorded(RemittanceRecorded {
            network_id: cmd.network_id,
            ledger_id: cmd.ledger_id,
            record,
            occurred_at: cmd.occurred_at,
        })])
    }
}
