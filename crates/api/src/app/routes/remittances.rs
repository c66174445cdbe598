use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tierstock_engine::RemitOutcome;
use tierstock_ledger::{CustodianId, OrderId, RemittanceId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, NetworkContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(remit).get(list_remittances))
        .route("/agent/:id", get(remittances_of_agent))
        .route("/:id", get(get_remittance))
}

/// Close the acting agent's selling cycle: return leftover stock and
/// freeze the included orders into an immutable record.
pub async fn remit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::RemitRequest>,
) -> axum::response::Response {
    let leader: CustodianId = match body.leader.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid leader id")
        }
    };

    let mut order_ids = Vec::with_capacity(body.order_ids.len());
    for raw in &body.order_ids {
        match raw.parse::<OrderId>() {
            Ok(id) => order_ids.push(id),
            Err(_) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id")
            }
        }
    }

    let outcome = match services.engine().remit(
        network.network_id(),
        actor.actor_id(),
        leader,
        order_ids,
        body.signature_ref,
    ) {
        Ok(outcome) => outcome,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    match outcome {
        RemitOutcome::Recorded(record) => {
            (StatusCode::CREATED, Json(dto::remittance_to_json(record))).into_response()
        }
        RemitOutcome::NothingToRemit => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "nothing_to_remit" })),
        )
            .into_response(),
    }
}

pub async fn get_remittance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let remittance_id: RemittanceId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid remittance id",
            )
        }
    };

    match services.remittances_get(network.network_id(), remittance_id) {
        Some(record) => (StatusCode::OK, Json(dto::remittance_to_json(record))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "remittance not found"),
    }
}

pub async fn list_remittances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let rows: Vec<_> = services
        .remittances_list(network.network_id())
        .into_iter()
        .map(dto::remittance_to_json)
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "remittances": rows })),
    )
        .into_response()
}

pub async fn remittances_of_agent(
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
        .remittances_of(network.network_id(), agent)
        .into_iter()
        .map(dto::remittance_to_json)
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "remittances": rows })),
    )
        .into_response()
}
