use axum::{routing::get, Router};

pub mod catalog;
pub mod network;
pub mod orders;
pub mod remittances;
pub mod requests;
pub mod stock;
pub mod system;

/// Router for all authenticated (network-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/events/stream", get(system::stream))
        .nest("/network", network::router())
        .nest("/catalog", catalog::router())
        .nest("/stock", stock::router())
        .nest("/orders", orders::router())
        .nest("/requests", requests::router())
        .nest("/remittances", remittances::router())
}
