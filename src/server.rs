//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding config, backend
//! registry, selection cache, admission filters, stats, and uptime),
//! [`build_router`] for wiring the dispatch pipeline, and
//! [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::uri::PathAndQuery;
use axum::http::Uri;
use axum::middleware::{from_fn_with_state, map_request};
use axum::routing::{any, get, options};
use axum::Router;
use tower::{Layer, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::Config;
use crate::error::TurnstileError;
use crate::health::health_handler;
use crate::middleware::cors::{cors_layer, cors_middleware};
use crate::middleware::ip_filter::{
    ip_allow_list_middleware, ip_range_middleware, IpAllowList, IpRangeFilter,
};
use crate::middleware::rate_limit::{rate_limit_middleware, ClientRateLimiter};
use crate::proxy::registry::BackendRegistry;
use crate::proxy::selection::{BackendSelector, RandomStrategy, SelectionStrategy};
use crate::{proxy, routes};

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub rate_limited: AtomicU64,
    pub denied: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }
}

pub struct AppState {
    pub config: Arc<Config>,
    pub registry: BackendRegistry,
    pub selector: BackendSelector,
    pub rate_limiter: ClientRateLimiter,
    pub ip_ranges: IpRangeFilter,
    pub ip_allow_list: IpAllowList,
    pub start_time: Instant,
    pub stats: Stats,
}

impl AppState {
    /// Build the runtime state with uniform random backend selection.
    pub fn new(config: Config) -> Result<Self, TurnstileError> {
        Self::with_strategy(config, Box::new(RandomStrategy))
    }

    /// Every error here is fatal at startup: an empty or malformed
    /// backend list, a non-positive rate, or an unparseable IP rule.
    pub fn with_strategy(
        config: Config,
        strategy: Box<dyn SelectionStrategy>,
    ) -> Result<Self, TurnstileError> {
        let registry = BackendRegistry::new(&config.backends, &config.proxy)?;
        let rate_limiter = ClientRateLimiter::new(config.rate_limit.requests_per_second)?;
        let ip_ranges = IpRangeFilter::new(&config.access.allowed_ip_ranges)?;
        let ip_allow_list = IpAllowList::new(&config.access.allowed_ips)?;
        let selector = BackendSelector::new(config.proxy.cache_expiry, strategy);

        Ok(Self {
            config: Arc::new(config),
            registry,
            selector,
            rate_limiter,
            ip_ranges,
            ip_allow_list,
            start_time: Instant::now(),
            stats: Stats::new(),
        })
    }
}

/// Wire the full router.
///
/// Requests under the proxy prefix pass rate limit, IP range and IP
/// allow list checks (in that order) before [`proxy::proxy_handler`].
/// Static routes skip admission control. CORS, tracing and the body
/// limit wrap everything, and the request path is cleaned before any
/// route is matched.
pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.proxy.prefix.as_str();
    let max_body = state.config.server.max_body.unwrap_or(usize::MAX);

    let admission = ServiceBuilder::new()
        .layer(from_fn_with_state(Arc::clone(&state), rate_limit_middleware))
        .layer(from_fn_with_state(Arc::clone(&state), ip_range_middleware))
        .layer(from_fn_with_state(Arc::clone(&state), ip_allow_list_middleware));

    let api = Router::new()
        .route(prefix, any(proxy::proxy_handler))
        .route(&format!("{prefix}/{{*rest}}"), any(proxy::proxy_handler))
        .route_layer(admission);

    let app = Router::new()
        .route("/", get(routes::welcome))
        .route("/opts", options(routes::opts))
        .route("/health", get(health_handler))
        .merge(api)
        .fallback(routes::not_found)
        .method_not_allowed_fallback(routes::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn_with_state(
                    cors_layer(&state.config.cors),
                    cors_middleware,
                ))
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state);

    // `Router::layer` runs after route matching, so the path has to be
    // cleaned by a service wrapped around the finished router.
    Router::new().fallback_service(map_request(normalize_path).layer(app))
}

/// Collapse `.`, `..` and repeated slashes in the request path, keeping
/// the query untouched.
async fn normalize_path(mut request: Request) -> Request {
    let cleaned = proxy::path::clean(request.uri().path());
    if cleaned == request.uri().path() {
        return request;
    }

    let path_and_query = match request.uri().query() {
        Some(query) => format!("{cleaned}?{query}"),
        None => cleaned,
    };
    let mut parts = request.uri().clone().into_parts();
    if let Ok(path_and_query) = PathAndQuery::try_from(path_and_query) {
        parts.path_and_query = Some(path_and_query);
        if let Ok(uri) = Uri::from_parts(parts) {
            *request.uri_mut() = uri;
        }
    }
    request
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
