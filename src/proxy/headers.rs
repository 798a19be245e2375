//! Header construction for forwarded requests and relayed responses.
//!
//! [`build_forwarded_headers`] keeps the client's headers, strips
//! hop-by-hop headers, rewrites `Host` to the chosen backend and adds the
//! usual proxy metadata (`X-Forwarded-For`, `X-Real-IP`,
//! `X-Forwarded-Host`, `X-Forwarded-Proto`, `Via`, `X-Correlation-Id`).

use std::sync::LazyLock;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
        "proxy-connection",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

pub const CORRELATION_ID: &str = "x-correlation-id";

/// Per-request facts the header builder needs.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub client_ip: &'a str,
    pub correlation_id: &'a str,
    /// Scheme the client used to reach the gateway.
    pub inbound_proto: &'a str,
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(axum::http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Strip hop-by-hop headers from an upstream response before relaying it.
///
/// The body is streamed through unchanged, so `content-length` stays.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
}

pub fn build_forwarded_headers(
    original: &HeaderMap,
    target_url: &url::Url,
    ctx: &ForwardContext<'_>,
) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);

    // Rewrite Host
    if let Some(host) = target_url.host_str() {
        let host_value = target_url
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(val) = HeaderValue::from_str(&host_value) {
            headers.insert("host", val);
        }
    }

    // X-Forwarded-For: append to chain
    let xff = original
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || ctx.client_ip.to_string(),
            |existing| format!("{existing}, {}", ctx.client_ip),
        );
    if let Ok(val) = HeaderValue::from_str(&xff) {
        headers.insert("x-forwarded-for", val);
    }

    // X-Real-IP is the peer the admission filters saw, never a client claim
    if let Ok(val) = HeaderValue::from_str(ctx.client_ip) {
        headers.insert("x-real-ip", val);
    }

    if let Ok(val) = HeaderValue::from_str(ctx.inbound_proto) {
        headers.insert("x-forwarded-proto", val);
    }

    // X-Forwarded-Host (original Host the client targeted)
    if let Some(original_host) = original.get("host") {
        headers.insert("x-forwarded-host", original_host.clone());
    }

    headers.insert("via", HeaderValue::from_static("1.1 turnstile"));

    if let Ok(val) = HeaderValue::from_str(ctx.correlation_id) {
        headers.insert(CORRELATION_ID, val);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ForwardContext<'static> {
        ForwardContext {
            client_ip: "10.0.0.1",
            correlation_id: "test-id",
            inbound_proto: "http",
        }
    }

    #[test]
    fn strips_hop_by_hop_and_connection_named_headers() {
        let mut original = HeaderMap::new();
        original.insert("connection", "keep-alive, x-session-hint".parse().unwrap());
        original.insert("x-session-hint", "abc".parse().unwrap());
        original.insert("content-type", "application/json".parse().unwrap());

        let target = url::Url::parse("http://b1:9000").unwrap();
        let result = build_forwarded_headers(&original, &target, &ctx());

        assert!(result.get("connection").is_none());
        assert!(result.get("x-session-hint").is_none());
        assert!(result.get("content-type").is_some());
    }

    #[test]
    fn rewrites_host_and_records_original() {
        let mut original = HeaderMap::new();
        original.insert("host", "gateway.example.com".parse().unwrap());
        let target = url::Url::parse("http://backend:9090/base").unwrap();
        let result = build_forwarded_headers(&original, &target, &ctx());

        assert_eq!(result.get("host").unwrap(), "backend:9090");
        assert_eq!(result.get("x-forwarded-host").unwrap(), "gateway.example.com");
    }

    #[test]
    fn default_port_is_omitted_from_host() {
        let target = url::Url::parse("https://backend").unwrap();
        let result = build_forwarded_headers(&HeaderMap::new(), &target, &ctx());
        assert_eq!(result.get("host").unwrap(), "backend");
    }

    #[test]
    fn appends_x_forwarded_for() {
        let mut original = HeaderMap::new();
        original.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());

        let target = url::Url::parse("http://b1:9000").unwrap();
        let result = build_forwarded_headers(&original, &target, &ctx());

        assert_eq!(result.get("x-forwarded-for").unwrap(), "1.2.3.4, 10.0.0.1");
        assert_eq!(result.get("x-real-ip").unwrap(), "10.0.0.1");
    }

    #[test]
    fn client_supplied_real_ip_is_replaced() {
        let mut original = HeaderMap::new();
        original.insert("x-real-ip", "6.6.6.6".parse().unwrap());
        original.insert("x-forwarded-for", "6.6.6.6".parse().unwrap());

        let target = url::Url::parse("http://b1:9000").unwrap();
        let result = build_forwarded_headers(&original, &target, &ctx());

        assert_eq!(result.get("x-real-ip").unwrap(), "10.0.0.1");
        assert_eq!(result.get_all("x-real-ip").iter().count(), 1);
    }

    #[test]
    fn sets_proxy_metadata() {
        let target = url::Url::parse("http://b1:9000").unwrap();
        let ctx = ForwardContext {
            inbound_proto: "https",
            correlation_id: "my-correlation-id",
            ..ctx()
        };
        let result = build_forwarded_headers(&HeaderMap::new(), &target, &ctx);

        assert_eq!(result.get(CORRELATION_ID).unwrap(), "my-correlation-id");
        assert_eq!(result.get("x-forwarded-proto").unwrap(), "https");
        assert_eq!(result.get("via").unwrap(), "1.1 turnstile");
    }

    #[test]
    fn response_keeps_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", "12".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        strip_response_hop_by_hop(&mut headers);
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("content-length").unwrap(), "12");
    }
}
