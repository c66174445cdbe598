use serde::Deserialize;

use tierstock_catalog::{Brand, PriceSet, Variant, VariantId};
use tierstock_infra::projections::{OrderReadModel, RequestReadModel, StockPositionReadModel};
use tierstock_ledger::{
    Availability, Holding, OrderStage, OrderStatus, RemittanceRecord, RequestLevel, RequestStatus,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterCustodianRequest {
    pub tier: String,
    pub parent: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub variant_id: String,
    pub quantity: i64,
    pub prices: PriceSet,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub parent: String,
    pub child: String,
    pub variant_id: String,
    pub quantity: i64,
    pub prices: PriceSet,
}

#[derive(Debug, Deserialize)]
pub struct AllocateBatchLineRequest {
    pub variant_id: String,
    pub quantity: i64,
    pub prices: PriceSet,
}

#[derive(Debug, Deserialize)]
pub struct AllocateBatchRequest {
    pub parent: String,
    pub child: String,
    pub items: Vec<AllocateBatchLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// Client reference; minted server-side when absent.
    pub client_id: Option<String>,
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct DenyOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestLineRequest {
    pub variant_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestsRequest {
    pub items: Vec<RequestLineRequest>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequestBody {
    pub prices: PriceSet,
    pub responder_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DenyRequestBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RemitRequest {
    pub leader: String,
    pub order_ids: Vec<String>,
    pub signature_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBrandRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVariantRequest {
    pub brand_id: String,
    pub name: String,
    pub prices: Option<PriceSet>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPricesRequest {
    pub prices: PriceSet,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn prices_to_json(p: &PriceSet) -> serde_json::Value {
    serde_json::json!({
        "unit_cost": p.unit_cost,
        "dealer_price": p.dealer_price,
        "selling_price": p.selling_price,
        "retail_price": p.retail_price,
    })
}

pub fn position_to_json(rm: StockPositionReadModel) -> serde_json::Value {
    serde_json::json!({
        "custodian": rm.custodian.to_string(),
        "variant_id": rm.variant_id.to_string(),
        "quantity": rm.quantity,
        "prices": prices_to_json(&rm.prices),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn availability_to_json(a: Availability) -> serde_json::Value {
    serde_json::json!({
        "total": a.total,
        "allocated_below": a.allocated_below,
        "reserved": a.reserved,
        "available": a.available,
    })
}

pub fn holding_to_json(variant_id: VariantId, h: &Holding) -> serde_json::Value {
    serde_json::json!({
        "variant_id": variant_id.to_string(),
        "quantity": h.quantity,
        "prices": prices_to_json(&h.prices),
        "last_credited_at": h.last_credited_at.to_rfc3339(),
    })
}

pub fn order_to_json(rm: OrderReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.order_id.to_string(),
        "agent": rm.agent.to_string(),
        "client": rm.client.to_string(),
        "items": rm.items.iter().map(|i| serde_json::json!({
            "variant_id": i.variant_id.to_string(),
            "quantity": i.quantity,
            "unit_price": i.unit_price,
        })).collect::<Vec<_>>(),
        "total_amount": rm.total_amount,
        "status": order_status_str(rm.status),
        "stage": order_stage_str(rm.stage),
        "remitted": rm.remitted,
        "denial_reason": rm.denial_reason,
        "placed_at": rm.placed_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn request_to_json(rm: RequestReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.request_id.to_string(),
        "requester": rm.requester.to_string(),
        "target": rm.target.to_string(),
        "variant_id": rm.variant_id.to_string(),
        "quantity": rm.quantity,
        "level": request_level_str(rm.level),
        "status": request_status_str(rm.status),
        "parent_request": rm.parent_request.map(|id| id.to_string()),
        "forwarded_child": rm.forwarded_child.map(|id| id.to_string()),
        "requester_notes": rm.requester_notes,
        "responder_notes": rm.responder_notes,
        "denial_reason": rm.denial_reason,
        "requested_at": rm.requested_at.to_rfc3339(),
        "responded_at": rm.responded_at.map(|t| t.to_rfc3339()),
    })
}

pub fn remittance_to_json(record: RemittanceRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id.to_string(),
        "agent": record.agent.to_string(),
        "leader": record.leader.to_string(),
        "returned": record.returned.iter().map(|r| serde_json::json!({
            "variant_id": r.variant_id.to_string(),
            "quantity": r.quantity,
        })).collect::<Vec<_>>(),
        "order_ids": record.order_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "items_remitted": record.items_remitted,
        "total_units": record.total_units,
        "orders_count": record.orders_count,
        "total_revenue": record.total_revenue,
        "signature_ref": record.signature_ref,
        "recorded_at": record.recorded_at.to_rfc3339(),
    })
}

pub fn brand_to_json(brand: &Brand) -> serde_json::Value {
    serde_json::json!({
        "id": brand.id_typed().to_string(),
        "name": brand.name(),
    })
}

pub fn variant_to_json(variant: &Variant) -> serde_json::Value {
    serde_json::json!({
        "id": variant.id_typed().to_string(),
        "brand_id": variant.brand_id().map(|id| id.to_string()),
        "name": variant.name(),
        "prices": prices_to_json(variant.prices()),
    })
}

fn order_status_str(s: OrderStatus) -> &'static str {
    match s {
        OrderStatus::Pending => "pending",
        OrderStatus::Approved => "approved",
        OrderStatus::Denied => "denied",
    }
}

fn order_stage_str(s: OrderStage) -> &'static str {
    match s {
        OrderStage::None => "none",
        OrderStage::LeaderApproved => "leader_approved",
        OrderStage::AdminApproved => "admin_approved",
    }
}

fn request_status_str(s: RequestStatus) -> &'static str {
    match s {
        RequestStatus::Pending => "pending",
        RequestStatus::Approved => "approved",
        RequestStatus::Denied => "denied",
        RequestStatus::Cancelled => "cancelled",
    }
}

fn request_level_str(l: RequestLevel) -> &'static str {
    match l {
        RequestLevel::AgentToLeader => "agent_to_leader",
        RequestLevel::LeaderToAdmin => "leader_to_admin",
    }
}
