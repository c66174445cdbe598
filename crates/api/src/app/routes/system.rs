use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{sse::Event as SseEvent, IntoResponse},
    Json,
};

use crate::app::services::{self, AppServices};
use crate::context::{ActorContext, NetworkContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(network): Extension<NetworkContext>,
    Extension(actor): Extension<ActorContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "network_id": network.network_id().to_string(),
        "actor_id": actor.actor_id().to_string(),
    }))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(network): Extension<NetworkContext>,
) -> axum::response::Sse<impl tokio_stream::Stream<Item = Result<SseEvent, std::convert::Infallible>>>
{
    services::network_sse_stream(services, network.network_id())
}
