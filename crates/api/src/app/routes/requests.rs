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
use tierstock_engine::{RequestAction, RequestedItem};
use tierstock_ledger::{CustodianId, RequestId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, NetworkContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_requests).get(list_requests))
        .route("/pending/:target", get(pending_for))
        .route("/:id", get(get_request))
        .route("/:id/approve", post(approve_request))
        .route("/:id/forward", post(forward_request))
        .route("/:id/deny", post(deny_request))
        .route("/:id/cancel", post(cancel_request))
}

fn parse_request_id(raw: &str) -> Result<RequestId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid request id")
    })
}

/// Submit a batch of stock requests to the acting custodian's parent.
/// Each item becomes its own request; ids come back in item order.
pub async fn submit_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::SubmitRequestsRequest>,
) -> axum::response::Response {
    let mut items = Vec::with_capacity(body.items.len());
    for line in body.items {
        let variant_id = match line.variant_id.parse::<AggregateId>() {
            Ok(v) => VariantId::new(v),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_id",
                    "invalid variant id",
                )
            }
        };
        items.push(RequestedItem {
            variant_id,
            quantity: line.quantity,
        });
    }

    let request_ids = match services.engine().submit_requests(
        network.network_id(),
        actor.actor_id(),
        items,
        body.notes,
    ) {
        Ok(ids) => ids,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "ids": request_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        })),
    )
        .into_response()
}

/// Approve a pending request: allocates the requested stock down the
/// chain in the same commit.
pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApproveRequestBody>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = services.engine().decide_request(
        network.network_id(),
        request_id,
        actor.actor_id(),
        RequestAction::Approve {
            prices: body.prices,
            responder_notes: body.responder_notes,
        },
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

/// Escalate an agent request one level up. The response carries the id
/// of the new leader-to-admin copy.
pub async fn forward_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let forwarded = match services.engine().decide_request(
        network.network_id(),
        request_id,
        actor.actor_id(),
        RequestAction::Forward,
    ) {
        Ok(child) => child,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "forwarded_to": forwarded.map(|id| id.to_string()),
        })),
    )
        .into_response()
}

pub async fn deny_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DenyRequestBody>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = services.engine().decide_request(
        network.network_id(),
        request_id,
        actor.actor_id(),
        RequestAction::Deny { reason: body.reason },
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

pub async fn cancel_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = services.engine().decide_request(
        network.network_id(),
        request_id,
        actor.actor_id(),
        RequestAction::Cancel,
    ) {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let request_id = match parse_request_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.requests_get(network.network_id(), request_id) {
        Some(rm) => (StatusCode::OK, Json(dto::request_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "request not found"),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let rows: Vec<_> = services
        .requests_list(network.network_id())
        .into_iter()
        .map(dto::request_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "requests": rows }))).into_response()
}

/// The decision queue for one custodian: pending requests targeting it.
pub async fn pending_for(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(target): Path<String>,
) -> axum::response::Response {
    let target: CustodianId = match target.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid custodian id")
        }
    };

    let rows: Vec<_> = services
        .requests_pending_for(network.network_id(), target)
        .into_iter()
        .map(dto::request_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "requests": rows }))).into_response()
}
