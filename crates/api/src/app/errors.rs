use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tierstock_infra::command_dispatcher::DispatchError;
use tierstock_ledger::CustodianTier;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::InsufficientStock {
            variant,
            requested,
            available,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("requested {requested} of {variant}, only {available} available"),
                "variant": variant,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        DispatchError::MissingPrice { variant, field } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            axum::Json(json!({
                "error": "missing_price",
                "message": format!("allocation of {variant} requires {field} > 0"),
                "variant": variant,
                "field": field,
            })),
        )
            .into_response(),
        DispatchError::MissingSignature => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "missing_signature",
            "remittance requires a captured signature reference",
        ),
        DispatchError::InvalidTransition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", msg)
        }
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::NetworkIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "network_isolation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_tier(s: &str) -> Result<CustodianTier, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "admin" => Ok(CustodianTier::Admin),
        "leader" => Ok(CustodianTier::Leader),
        "agent" => Ok(CustodianTier::Agent),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_tier",
            "tier must be one of: admin, leader, agent",
        )),
    }
}
