use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use tierstock_catalog::{
    Brand, BrandCommand, BrandId, RegisterBrand, RegisterVariant, RenameBrand, RenameVariant,
    SetVariantPrices, Variant, VariantCommand, VariantId, BRAND_AGGREGATE_TYPE,
    VARIANT_AGGREGATE_TYPE,
};
use tierstock_core::AggregateId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::NetworkContext;

pub fn router() -> Router {
    Router::new()
        .route("/brands", post(register_brand))
        .route("/brands/:id", get(get_brand))
        .route("/brands/:id/rename", post(rename_brand))
        .route("/variants", post(register_variant))
        .route("/variants/:id", get(get_variant))
        .route("/variants/:id/rename", post(rename_variant))
        .route("/variants/:id/prices", post(set_variant_prices))
}

pub async fn register_brand(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Json(body): Json<dto::RegisterBrandRequest>,
) -> axum::response::Response {
    let brand_id = BrandId::new(AggregateId::new());

    let command = BrandCommand::RegisterBrand(RegisterBrand {
        network_id: network.network_id(),
        brand_id,
        name: body.name,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Brand>(
        network.network_id(),
        brand_id.0,
        BRAND_AGGREGATE_TYPE,
        command,
        |_, id| Brand::empty(BrandId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": brand_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn rename_brand(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameRequest>,
) -> axum::response::Response {
    let brand_id = match parse_brand(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let command = BrandCommand::RenameBrand(RenameBrand {
        network_id: network.network_id(),
        brand_id,
        name: body.name,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Brand>(
        network.network_id(),
        brand_id.0,
        BRAND_AGGREGATE_TYPE,
        command,
        |_, id| Brand::empty(BrandId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": brand_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_brand(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let brand_id = match parse_brand(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let brand: Brand = match services.load_aggregate(network.network_id(), brand_id.0, |_, id| {
        Brand::empty(BrandId::new(id))
    }) {
        Ok(brand) => brand,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    // An empty stream (or a stream owned by another network) rehydrates
    // to a not-yet-created aggregate.
    match brand.network_id() {
        Some(owner) if owner == network.network_id() => {
            (StatusCode::OK, Json(dto::brand_to_json(&brand))).into_response()
        }
        _ => errors::json_error(StatusCode::NOT_FOUND, "not_found", "brand not found"),
    }
}

pub async fn register_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Json(body): Json<dto::RegisterVariantRequest>,
) -> axum::response::Response {
    let brand_id = match parse_brand(&body.brand_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let variant_id = VariantId::new(AggregateId::new());

    let command = VariantCommand::RegisterVariant(RegisterVariant {
        network_id: network.network_id(),
        variant_id,
        brand_id,
        name: body.name,
        prices: body.prices,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Variant>(
        network.network_id(),
        variant_id.0,
        VARIANT_AGGREGATE_TYPE,
        command,
        |_, id| Variant::empty(VariantId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": variant_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn rename_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameRequest>,
) -> axum::response::Response {
    let variant_id = match parse_variant(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let command = VariantCommand::RenameVariant(RenameVariant {
        network_id: network.network_id(),
        variant_id,
        name: body.name,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Variant>(
        network.network_id(),
        variant_id.0,
        VARIANT_AGGREGATE_TYPE,
        command,
        |_, id| Variant::empty(VariantId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": variant_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn set_variant_prices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetPricesRequest>,
) -> axum::response::Response {
    let variant_id = match parse_variant(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let command = VariantCommand::SetVariantPrices(SetVariantPrices {
        network_id: network.network_id(),
        variant_id,
        prices: body.prices,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Variant>(
        network.network_id(),
        variant_id.0,
        VARIANT_AGGREGATE_TYPE,
        command,
        |_, id| Variant::empty(VariantId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": variant_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let variant_id = match parse_variant(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let variant: Variant =
        match services.load_aggregate(network.network_id(), variant_id.0, |_, id| {
            Variant::empty(VariantId::new(id))
        }) {
            Ok(variant) => variant,
            Err(e) => return errors::dispatch_error_to_response(e),
        };

    match variant.network_id() {
        Some(owner) if owner == network.network_id() => {
            (StatusCode::OK, Json(dto::variant_to_json(&variant))).into_response()
        }
        _ => errors::json_error(StatusCode::NOT_FOUND, "not_found", "variant not found"),
    }
}

fn parse_brand(raw: &str) -> Result<BrandId, axum::response::Response> {
    raw.parse::<AggregateId>().map(BrandId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid brand id")
    })
}

fn parse_variant(raw: &str) -> Result<VariantId, axum::response::Response> {
    raw.parse::<AggregateId>().map(VariantId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid variant id")
    })
}
