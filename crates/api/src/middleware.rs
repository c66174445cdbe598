use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use tierstock_core::NetworkId;
use tierstock_ledger::CustodianId;

use crate::context::{ActorContext, NetworkContext};

pub const NETWORK_HEADER: &str = "x-network-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Establish the network and actor context from request headers.
///
/// Identity verification (sessions, tokens) sits in front of this
/// service; by the time a request lands here the headers are trusted.
/// Missing or malformed headers are a 401.
pub async fn session_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let network_id: NetworkId = parse_header(req.headers(), NETWORK_HEADER)?;
    let actor_id: CustodianId = parse_header(req.headers(), ACTOR_HEADER)?;

    req.extensions_mut().insert(NetworkContext::new(network_id));
    req.extensions_mut().insert(ActorContext::new(actor_id));

    Ok(next.run(req).await)
}

fn parse_header<T: core::str::FromStr>(headers: &HeaderMap, name: &str) -> Result<T, StatusCode> {
    let value = headers.get(name).ok_or(StatusCode::UNAUTHORIZED)?;
    let value = value.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
    value.trim().parse().map_err(|_| StatusCode::UNAUTHORIZED)
}
