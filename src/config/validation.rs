//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for everything
//! that must be fatal at startup: no backends, malformed backend URLs,
//! a non-positive rate, bad CIDR ranges, and so on. All problems are
//! collected into one list of [`ValidationError`] values so the operator
//! can fix them in a single pass.

use std::collections::HashSet;
use std::net::IpAddr;

use url::Url;

use super::model::Config;
use crate::error::ValidationError;
use crate::middleware::ip_filter::CidrRange;

/// Paths served by the gateway itself; the proxy prefix may not shadow them.
const RESERVED_PATHS: &[&str] = &["/health", "/opts"];

/// Validate a single backend URL. Returns `Ok(())` or a human-readable error.
pub fn validate_backend_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else if parsed.host_str().map_or(true, str::is_empty) {
                Err(format!("'{url}' has no host"))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate the proxy prefix. Returns `Ok(())` or a human-readable error.
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if !prefix.starts_with('/') {
        return Err("prefix must start with '/'".into());
    }
    if prefix == "/" {
        return Err("prefix cannot be the root path".into());
    }
    if prefix.ends_with('/') {
        return Err("prefix must not end with '/'".into());
    }
    if prefix.contains(['{', '}', '*']) {
        return Err("prefix must be a literal path".into());
    }
    if crate::proxy::path::clean(prefix) != prefix {
        return Err("prefix must not contain '.', '..' or empty segments".into());
    }
    if RESERVED_PATHS.contains(&prefix) {
        return Err(format!("prefix '{prefix}' collides with a built-in route"));
    }
    Ok(())
}

fn push(
    errors: &mut Vec<ValidationError>,
    section: &str,
    field: &str,
    message: String,
    suggestion: Option<String>,
) {
    errors.push(ValidationError {
        section: section.into(),
        field: field.into(),
        message,
        suggestion,
    });
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.app_name.trim().is_empty() {
        push(
            &mut errors,
            "root",
            "app_name",
            "app_name cannot be empty".into(),
            None,
        );
    }

    if config.backends.is_empty() {
        push(
            &mut errors,
            "root",
            "backends",
            "at least one backend must be defined".into(),
            None,
        );
    }

    let mut seen = HashSet::new();
    for url in &config.backends {
        if let Err(msg) = validate_backend_url(url) {
            let suggestion = (!url.contains("://")).then(|| format!("did you mean 'http://{url}'?"));
            push(&mut errors, "root", "backends", msg, suggestion);
        }
        if !seen.insert(url.as_str()) {
            push(
                &mut errors,
                "root",
                "backends",
                format!("duplicate backend '{url}'"),
                None,
            );
        }
    }

    if config.server.host.parse::<IpAddr>().is_err() {
        let suggestion = (config.server.host == "localhost").then(|| "did you mean '127.0.0.1'?".to_string());
        push(
            &mut errors,
            "server",
            "host",
            format!("'{}' is not an IP address", config.server.host),
            suggestion,
        );
    }

    if config.server.max_body == Some(0) {
        push(
            &mut errors,
            "server",
            "max_body",
            "max_body must be greater than zero".into(),
            None,
        );
    }

    let proxy = &config.proxy;
    if let Err(msg) = validate_prefix(&proxy.prefix) {
        let suggestion = if proxy.prefix.starts_with('/') {
            let trimmed = proxy.prefix.trim_end_matches('/');
            (!trimmed.is_empty()).then(|| format!("did you mean '{trimmed}'?"))
        } else {
            Some(format!("did you mean '/{}'?", proxy.prefix))
        };
        push(&mut errors, "proxy", "prefix", msg, suggestion);
    }
    if proxy.sweep_interval == 0 {
        push(
            &mut errors,
            "proxy",
            "sweep_interval",
            "sweep_interval must be greater than zero".into(),
            None,
        );
    }
    if proxy.timeout == 0 {
        push(
            &mut errors,
            "proxy",
            "timeout",
            "timeout must be greater than zero".into(),
            None,
        );
    }

    let limit = &config.rate_limit;
    if !limit.requests_per_second.is_finite() || limit.requests_per_second <= 0.0 {
        push(
            &mut errors,
            "rate_limit",
            "requests_per_second",
            format!(
                "{} is not a valid rate (expected a number above zero)",
                limit.requests_per_second
            ),
            None,
        );
    }
    if !(400..500).contains(&limit.status) {
        push(
            &mut errors,
            "rate_limit",
            "status",
            format!("{} is not a client error status", limit.status),
            Some("429 is the conventional choice".into()),
        );
    }
    if limit.cleanup_interval == 0 {
        push(
            &mut errors,
            "rate_limit",
            "cleanup_interval",
            "cleanup_interval must be greater than zero".into(),
            None,
        );
    }

    for method in &config.cors.allowed_methods {
        if http::Method::from_bytes(method.as_bytes()).is_err() {
            push(
                &mut errors,
                "cors",
                "allowed_methods",
                format!("'{method}' is not a valid HTTP method"),
                None,
            );
        }
    }
    for header in &config.cors.allowed_headers {
        if header.parse::<http::HeaderName>().is_err() {
            push(
                &mut errors,
                "cors",
                "allowed_headers",
                format!("'{header}' is not a valid header name"),
                None,
            );
        }
    }
    for origin in &config.cors.allowed_origins {
        if origin == "*" {
            push(
                &mut errors,
                "cors",
                "allowed_origins",
                "'*' is not an origin".into(),
                Some("set allow_all_origins: true instead".into()),
            );
        } else if http::HeaderValue::from_str(origin).is_err() {
            push(
                &mut errors,
                "cors",
                "allowed_origins",
                format!("'{origin}' is not a valid origin"),
                None,
            );
        }
    }

    for range in &config.access.allowed_ip_ranges {
        if let Err(msg) = range.parse::<CidrRange>() {
            push(&mut errors, "access", "allowed_ip_ranges", msg, None);
        }
    }
    for ip in &config.access.allowed_ips {
        if ip.parse::<IpAddr>().is_err() {
            let suggestion = ip
                .contains('/')
                .then(|| "CIDR ranges belong in allowed_ip_ranges".to_string());
            push(
                &mut errors,
                "access",
                "allowed_ips",
                format!("'{ip}' is not a valid IP address"),
                suggestion,
            );
        }
    }

    if config.tls.enabled && config.tls.cert_dir.as_os_str().is_empty() {
        push(
            &mut errors,
            "tls",
            "cert_dir",
            "cert_dir is required when TLS is enabled".into(),
            None,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let mut lines = vec![format!(
        "  {} ({} backends)\n",
        config.app_name,
        config.backends.len()
    )];

    for backend in &config.backends {
        lines.push(format!("    -> {backend}"));
    }

    let expiry = if config.proxy.cache_expiry == 0 {
        "never".to_string()
    } else {
        format!("{}s", config.proxy.cache_expiry)
    };
    lines.push(format!(
        "  prefix:     {} ({:?})",
        config.proxy.prefix, config.proxy.path_rewrite
    ));
    lines.push(format!("  stickiness: {expiry}"));
    lines.push(format!(
        "  rate limit: {} req/s per client",
        config.rate_limit.requests_per_second
    ));
    lines.push(format!(
        "  access:     {} ranges, {} ips",
        config.access.allowed_ip_ranges.len(),
        config.access.allowed_ips.len()
    ));
    lines.push(format!(
        "  listen:     {}://{}:{}",
        if config.tls.enabled { "https" } else { "http" },
        config.server.host,
        config.server.port
    ));

    format!("{} is valid\n{}", path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> Config {
        Config {
            app_name: "Gateway".into(),
            backends: vec!["http://b1:9000".into(), "https://b2:9443".into()],
            ..Config::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn empty_backends_fails() {
        let config = Config {
            backends: vec![],
            ..minimal_config()
        };
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least one backend"));
    }

    #[test]
    fn malformed_backend_fails_with_suggestion() {
        let config = Config {
            backends: vec!["b1:9000".into()],
            ..minimal_config()
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("did you mean 'http://b1:9000'?")));
    }

    #[test]
    fn non_http_scheme_fails() {
        let config = Config {
            backends: vec!["ftp://files:21".into()],
            ..minimal_config()
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unsupported scheme")));
    }

    #[test]
    fn duplicate_backend_fails() {
        let config = Config {
            backends: vec!["http://b1:9000".into(), "http://b1:9000".into()],
            ..minimal_config()
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn zero_rate_fails() {
        let mut config = minimal_config();
        config.rate_limit.requests_per_second = 0.0;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors[0].field, "requests_per_second");
    }

    #[test]
    fn nan_rate_fails() {
        let mut config = minimal_config();
        config.rate_limit.requests_per_second = f64::NAN;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn server_error_rejection_status_fails() {
        let mut config = minimal_config();
        config.rate_limit.status = 503;
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors[0].field, "status");
    }

    #[test]
    fn prefix_rules() {
        assert!(validate_prefix("/api").is_ok());
        assert!(validate_prefix("/api/v1").is_ok());
        assert!(validate_prefix("api").is_err());
        assert!(validate_prefix("/").is_err());
        assert!(validate_prefix("/api/").is_err());
        assert!(validate_prefix("/api/{*rest}").is_err());
        assert!(validate_prefix("/api//v1").is_err());
        assert!(validate_prefix("/api/../v1").is_err());
        assert!(validate_prefix("/health").is_err());
    }

    #[test]
    fn prefix_with_trailing_slash_suggests_trimmed() {
        let mut config = minimal_config();
        config.proxy.prefix = "/api/".into();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors[0].suggestion.as_deref(), Some("did you mean '/api'?"));
    }

    #[test]
    fn bad_access_lists_fail() {
        let mut config = minimal_config();
        config.access.allowed_ip_ranges = vec!["10.0.0.0/33".into(), "192.168.0.0/16".into()];
        config.access.allowed_ips = vec!["10.0.0.0/8".into()];
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("CIDR ranges belong in allowed_ip_ranges")));
    }

    #[test]
    fn hostname_listen_address_fails() {
        let mut config = minimal_config();
        config.server.host = "localhost".into();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors[0].field, "host");
        assert_eq!(errors[0].suggestion.as_deref(), Some("did you mean '127.0.0.1'?"));
    }

    #[test]
    fn wildcard_origin_fails() {
        let mut config = minimal_config();
        config.cors.allowed_origins = vec!["*".into()];
        let errors = validate(&config).unwrap_err();
        assert!(errors[0].suggestion.as_deref().unwrap().contains("allow_all_origins"));
    }

    #[test]
    fn invalid_cors_method_fails() {
        let mut config = minimal_config();
        config.cors.allowed_methods = vec!["GET".into(), "NOT A METHOD".into()];
        let errors = validate(&config).unwrap_err();
        assert!(errors[0].message.contains("not a valid HTTP method"));
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = minimal_config();
        config.app_name = String::new();
        config.backends = vec![];
        config.proxy.prefix = "api".into();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn report_lists_backends() {
        let report = format_validation_report("turnstile.yaml", &minimal_config());
        assert!(report.starts_with("turnstile.yaml is valid"));
        assert!(report.contains("-> http://b1:9000"));
        assert!(report.contains("stickiness: 300s"));
    }
}
