use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tierstock_catalog::VariantId;
use tierstock_core::AggregateId;
use tierstock_engine::AllocationItem;
use tierstock_ledger::CustodianId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, NetworkContext};

pub fn router() -> Router {
    Router::new()
        .route("/receive", post(receive_stock))
        .route("/allocate", post(allocate))
        .route("/allocate/batch", post(allocate_batch))
        .route("/positions", get(list_positions))
        .route("/positions/:custodian", get(positions_of))
        .route("/availability/:custodian/:variant", get(get_availability))
}

fn parse_variant(raw: &str) -> Result<VariantId, axum::response::Response> {
    raw.parse::<AggregateId>().map(VariantId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid variant id")
    })
}

fn parse_custodian(raw: &str) -> Result<CustodianId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid custodian id")
    })
}

/// External stock intake at the admin root. The acting custodian must
/// be the network's admin; the ledger enforces it.
pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::ReceiveStockRequest>,
) -> axum::response::Response {
    let variant_id = match parse_variant(&body.variant_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = services.engine().receive_stock(
        network.network_id(),
        actor.actor_id(),
        variant_id,
        body.quantity,
        body.prices,
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AllocateRequest>,
) -> axum::response::Response {
    let parent = match parse_custodian(&body.parent) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let child = match parse_custodian(&body.child) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let variant_id = match parse_variant(&body.variant_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = services.engine().allocate(
        network.network_id(),
        actor.actor_id(),
        parent,
        child,
        variant_id,
        body.quantity,
        body.prices,
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

/// Batch allocation: items commit independently, the response reports
/// one outcome per line.
pub async fn allocate_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AllocateBatchRequest>,
) -> axum::response::Response {
    let parent = match parse_custodian(&body.parent) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let child = match parse_custodian(&body.child) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut items = Vec::with_capacity(body.items.len());
    for line in body.items {
        let variant_id = match parse_variant(&line.variant_id) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        items.push(AllocationItem {
            variant_id,
            quantity: line.quantity,
            prices: line.prices,
        });
    }

    let outcomes =
        services
            .engine()
            .allocate_batch(network.network_id(), actor.actor_id(), parent, child, items);

    let results: Vec<_> = outcomes
        .iter()
        .map(|o| {
            serde_json::json!({
                "variant_id": o.variant_id.to_string(),
                "quantity": o.quantity,
                "ok": o.outcome.is_ok(),
                "error": o.outcome.as_ref().err().map(|e| format!("{e:?}")),
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "results": results })),
    )
        .into_response()
}

pub async fn list_positions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let rows: Vec<_> = services
        .stock_list(network.network_id())
        .into_iter()
        .map(dto::position_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "positions": rows }))).into_response()
}

pub async fn positions_of(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(custodian): Path<String>,
) -> axum::response::Response {
    let custodian = match parse_custodian(&custodian) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let rows: Vec<_> = services
        .stock_positions_of(network.network_id(), custodian)
        .into_iter()
        .map(dto::position_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "positions": rows }))).into_response()
}

/// Authoritative availability breakdown for one (custodian, variant),
/// computed from rehydrated ledger state on every call.
pub async fn get_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path((custodian, variant)): Path<(String, String)>,
) -> axum::response::Response {
    let custodian = match parse_custodian(&custodian) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let variant_id = match parse_variant(&variant) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let availability =
        match services
            .engine()
            .get_availability(network.network_id(), custodian, variant_id)
        {
            Ok(a) => a,
            Err(e) => return errors::dispatch_error_to_response(e),
        };

    (StatusCode::OK, Json(dto::availability_to_json(availability))).into_response()
}
