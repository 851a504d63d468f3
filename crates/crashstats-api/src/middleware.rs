//! Request middleware: CORS, client address, caller resolution, rate limiting.
use crate::envelope::{too_many_requests, ApiError};
use crate::identity::resolve_caller;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use crashstats_core::{Caller, GatewayError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// `Access-Control-Allow-Origin: *` on every response, with or without an
/// `Origin` request header.
pub fn cors() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    )
}

/// Client address: the first `X-Forwarded-For` entry when the proxy is
/// trusted, else the socket peer.
///
/// The first entry is whatever the client sent unless the trusted proxy
/// overwrites the header. A proxy that appends to it lets clients pick
/// their own rate-limit key.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded_for: bool) -> IpAddr {
    let forwarded = trust_forwarded_for
        .then(|| headers.get(FORWARDED_FOR))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    forwarded
        .or(peer)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

async fn limited(state: &AppState, caller: &Caller) -> bool {
    if state.limiter.check(caller).await.is_limited() {
        warn!(caller = %caller.label(), "Rate limit exceeded");
        state.metrics.observe_rate_limited();
        true
    } else {
        false
    }
}

/// Resolve the caller, count the request, and hand the [`Caller`] to the
/// handler as a request extension.
pub async fn identify_and_limit(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let headers = req.headers().clone();
    let ip = client_ip(&headers, peer, state.config.trust_forwarded_for);

    match resolve_caller(state.identities.as_ref(), &headers, ip, Utc::now()).await {
        Ok(caller) => {
            if limited(&state, &caller).await {
                return too_many_requests();
            }
            debug!(caller = %caller.label(), "Caller resolved");
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(err) => {
            // bad tokens still count against the address they came from
            if limited(&state, &Caller::anonymous(ip)).await {
                return too_many_requests();
            }
            warn!(ip = %ip, error = %err, "Token rejected");
            ApiError(GatewayError::Forbidden(err.to_string())).into_response()
        }
    }
}
