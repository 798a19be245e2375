//! Request forwarding under the proxy prefix.
//!
//! [`proxy_handler`] is the last stage of the dispatch pipeline: by the
//! time it runs, CORS, the rate limiter and both IP filters have let the
//! request through. Submodules handle path normalization ([`path`]),
//! backend lookup and the upstream client ([`registry`]), sticky
//! selection ([`selection`]) and header rewriting ([`headers`]).

pub mod headers;
pub mod path;
pub mod registry;
pub mod selection;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::routes::{route_not_found, JsonMessage};
use crate::server::AppState;
use headers::{ForwardContext, CORRELATION_ID};
use path::Fingerprint;

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let settings = &state.config.proxy;
    let Some(forward_path) = path::rewrite(request.uri().path(), &settings.prefix, settings.path_rewrite)
    else {
        tracing::debug!(path = %request.uri().path(), "path escapes proxy prefix");
        return route_not_found(&state.config.app_name);
    };

    let fingerprint = Fingerprint::new(&forward_path, request.uri().query());
    let selection = state.selector.select(&fingerprint, &state.registry);
    let endpoint = selection.endpoint;

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    tracing::info!(
        target: crate::logging::ACCESS_TARGET,
        app = %state.config.app_name,
        target = %endpoint.authority(),
        path = %forward_path,
        backend = %endpoint.key(),
        cache_hit = selection.cache_hit,
        correlation_id = %correlation_id,
        "proxying request"
    );

    let client_ip = addr.ip().to_canonical().to_string();
    let ctx = ForwardContext {
        client_ip: &client_ip,
        correlation_id: &correlation_id,
        inbound_proto: if state.config.tls.enabled { "https" } else { "http" },
    };

    match endpoint.forward(request, &forward_path, &ctx).await {
        Ok(upstream) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            let (mut parts, incoming) = upstream.into_parts();
            headers::strip_response_hop_by_hop(&mut parts.headers);
            if let Ok(val) = HeaderValue::from_str(&correlation_id) {
                parts.headers.insert(CORRELATION_ID, val);
            }
            Response::from_parts(parts, Body::new(incoming))
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                correlation_id = %correlation_id,
                backend = %endpoint.key(),
                error = %e,
                "forwarding failed"
            );
            let status = e.status();
            let message = if status == StatusCode::GATEWAY_TIMEOUT {
                "The upstream service did not respond in time."
            } else {
                "The upstream service is unavailable."
            };
            (status, Json(JsonMessage::new(message))).into_response()
        }
    }
}
