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
use tierstock_ledger::{ClientId, CustodianId, OrderId, OrderItem};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, NetworkContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/pending", get(pending_orders))
        .route("/agent/:id", get(orders_of_agent))
        .route("/:id", get(get_order))
        .route("/:id/advance", post(advance_order))
        .route("/:id/deny", post(deny_order))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

/// Place a client order. The acting custodian is the selling agent;
/// placement debits its holdings immediately.
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let client = match body.client_id.as_deref() {
        Some(raw) => match raw.parse::<ClientId>() {
            Ok(id) => id,
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid client id")
            }
        },
        None => ClientId::new(),
    };

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
        items.push(OrderItem {
            variant_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        });
    }

    let order_id =
        match services
            .engine()
            .place_order(network.network_id(), actor.actor_id(), client, items)
        {
            Ok(id) => id,
            Err(e) => return errors::dispatch_error_to_response(e),
        };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": order_id.to_string(),
            "client": client.to_string(),
        })),
    )
        .into_response()
}

/// Advance the order one stage up the approval chain: leader first,
/// then admin. The admin advance resolves the order as approved.
pub async fn advance_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) =
        services
            .engine()
            .advance_order_stage(network.network_id(), order_id, actor.actor_id())
    {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

pub async fn deny_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DenyOrderRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) =
        services
            .engine()
            .deny_order(network.network_id(), order_id, actor.actor_id(), body.reason)
    {
        return errors::dispatch_error_to_response(e);
    }

    StatusCode::OK.into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders_get(network.network_id(), order_id) {
        Some(rm) => (StatusCode::OK, Json(dto::order_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let rows: Vec<_> = services
        .orders_list(network.network_id())
        .into_iter()
        .map(dto::order_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "orders": rows }))).into_response()
}

pub async fn pending_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let rows: Vec<_> = services
        .orders_pending(network.network_id())
        .into_iter()
        .map(dto::order_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "orders": rows }))).into_response()
}

pub async fn orders_of_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agent: CustodianId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid custodian id")
        }
    };

    let rows: Vec<_> = services
        .orders_of(network.network_id(), agent)
        .into_iter()
        .map(dto::order_to_json)
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "orders": rows }))).into_response()
}
