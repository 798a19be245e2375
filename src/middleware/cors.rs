//! CORS policy built from [`CorsConfig`].
//!
//! Installed router-wide so it runs before admission control. Only
//! requests that carry an `Origin` header go through the CORS layer;
//! `tower-http` treats every `OPTIONS` as a preflight, so a bare
//! `OPTIONS /opts` (or an `OPTIONS` meant for a backend) would otherwise
//! never reach its handler. Disallowed origins get no CORS headers
//! rather than an error status.

use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::model::CorsConfig;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

#[must_use]
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let origin = if config.allow_all_origins {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(PREFLIGHT_MAX_AGE)
}

/// Apply `layer` to cross-origin requests and pass everything else through.
pub async fn cors_middleware(
    State(layer): State<CorsLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !request.headers().contains_key(header::ORIGIN) {
        return next.run(request).await;
    }
    match layer.layer(next).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_methods_are_skipped() {
        let config = CorsConfig {
            allowed_methods: vec!["get".into(), "NOT A METHOD".into()],
            ..CorsConfig::default()
        };
        // Building must not panic on a bad token; validation reports it.
        let _ = cors_layer(&config);
    }
}
