use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use tierstock_ledger::CustodianId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::NetworkContext;

pub fn router() -> Router {
    Router::new()
        .route("/open", post(open_network))
        .route("/custodians", post(register_custodian))
        .route("/custodians/:id/holdings", get(get_holdings))
}

/// Open the custody ledger for the caller's network. Idempotent:
/// reopening an already-open network commits nothing.
pub async fn open_network(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Response {
    let ledger_id = match services.engine().open_network(network.network_id()) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "ledger_id": ledger_id.to_string(),
        })),
    )
        .into_response()
}

pub async fn register_custodian(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Json(body): Json<dto::RegisterCustodianRequest>,
) -> axum::response::Response {
    let tier = match errors::parse_tier(&body.tier) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let parent: Option<CustodianId> = match body.parent.as_deref() {
        Some(raw) => match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_id",
                    "invalid parent custodian id",
                )
            }
        },
        None => None,
    };

    let custodian_id = CustodianId::new();
    if let Err(e) = services.engine().register_custodian(
        network.network_id(),
        custodian_id,
        tier,
        parent,
        body.display_name,
    ) {
        return errors::dispatch_error_to_response(e);
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": custodian_id.to_string(),
        })),
    )
        .into_response()
}

/// Authoritative holdings of one custodian, straight from rehydrated
/// ledger state (not the stock projection).
pub async fn get_holdings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let custodian: CustodianId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid custodian id")
        }
    };

    let holdings = match services.engine().holdings_of(network.network_id(), custodian) {
        Ok(h) => h,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let rows: Vec<_> = holdings
        .iter()
        .map(|(variant_id, holding)| dto::holding_to_json(*variant_id, holding))
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "custodian": custodian.to_string(),
            "holdings": rows,
        })),
    )
        .into_response()
}
