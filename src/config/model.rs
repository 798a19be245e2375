//! Serde data structures for the Turnstile configuration.
//!
//! [`Config`] is the root. Everything except `app_name` and `backends`
//! has a default, so a minimal file only names the application and its
//! backends. All types use `deny_unknown_fields` for strict parsing.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Message returned to clients that exceed the rate limit.
pub const RATE_LIMIT_MESSAGE: &str = "You have reached the request limit.";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_prefix() -> String {
    "/api".to_string()
}

const fn default_cache_expiry() -> u64 {
    300
}

const fn default_sweep_interval() -> u64 {
    600
}

const fn default_timeout() -> u64 {
    30_000
}

const fn default_true() -> bool {
    true
}

const fn default_rps() -> f64 {
    10.0
}

const fn default_rejection_status() -> u16 {
    429
}

const fn default_cleanup_interval() -> u64 {
    60
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
        .iter()
        .map(|m| (*m).to_string())
        .collect()
}

fn default_headers() -> Vec<String> {
    ["Origin", "Content-Length", "Content-Type"]
        .iter()
        .map(|h| (*h).to_string())
        .collect()
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub app_name: String,

    pub backends: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Max request body size in bytes. Unset relays bodies of any size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body: None,
        }
    }
}

/// How the request path is rewritten before it is forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRewrite {
    /// Forward everything after the prefix: `/api/v1/users/42` -> `/v1/users/42`.
    #[default]
    StripPrefix,
    /// Forward only the final segment: `/api/v1/users/42` -> `/42`.
    LastSegment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub path_rewrite: PathRewrite,

    /// Seconds a fingerprint stays pinned to one backend. `0` pins forever.
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry: u64,

    /// Seconds between sweeps of expired selection cache entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Upstream response-header timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub skip_tls_verify: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            path_rewrite: PathRewrite::default(),
            cache_expiry: default_cache_expiry(),
            sweep_interval: default_sweep_interval(),
            timeout: default_timeout(),
            skip_tls_verify: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    /// Status code returned on rejection.
    #[serde(default = "default_rejection_status")]
    pub status: u16,

    /// Seconds between purges of idle client state.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            status: default_rejection_status(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_all_origins: bool,

    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_headers")]
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_all_origins: false,
            allowed_origins: Vec::new(),
            allowed_methods: default_methods(),
            allowed_headers: default_headers(),
        }
    }
}

/// IP admission lists. An empty list disables that check.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_ip_ranges: Vec<String>,

    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding `cert.pem` and `key.pem`.
    #[serde(default = "default_cert_dir")]
    pub cert_dir: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_dir: default_cert_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Send per-request access lines to the local syslog daemon instead
    /// of stdout.
    #[serde(default)]
    pub syslog: bool,
}

impl TlsConfig {
    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join("cert.pem")
    }

    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join("key.pem")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"app_name": "Gateway", "backends": ["http://b1:9000"]}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_body, None);
        assert_eq!(config.proxy.prefix, "/api");
        assert_eq!(config.proxy.path_rewrite, PathRewrite::StripPrefix);
        assert_eq!(config.proxy.cache_expiry, 300);
        assert_eq!(config.proxy.sweep_interval, 600);
        assert!(config.proxy.skip_tls_verify);
        assert_eq!(config.rate_limit.status, 429);
        assert!(!config.tls.enabled);
        assert!(!config.logging.syslog);
        assert_eq!(config.cors.allowed_headers.len(), 3);
    }

    #[test]
    fn path_rewrite_uses_snake_case() {
        let config: Config = serde_json::from_str(
            r#"{"app_name": "g", "backends": [], "proxy": {"path_rewrite": "last_segment"}}"#,
        )
        .unwrap();
        assert_eq!(config.proxy.path_rewrite, PathRewrite::LastSegment);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = serde_json::from_str(
            r#"{"app_name": "g", "backends": [], "sub_services": []}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_backends_is_a_parse_error() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"app_name": "g"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn logging_section_enables_syslog() {
        let config: Config = serde_json::from_str(
            r#"{"app_name": "g", "backends": [], "logging": {"syslog": true}}"#,
        )
        .unwrap();
        assert!(config.logging.syslog);
    }

    #[test]
    fn tls_paths_join_cert_dir() {
        let tls = TlsConfig {
            enabled: true,
            cert_dir: PathBuf::from("/etc/turnstile"),
        };
        assert_eq!(tls.cert_path(), PathBuf::from("/etc/turnstile/cert.pem"));
        assert_eq!(tls.key_path(), PathBuf::from("/etc/turnstile/key.pem"));
    }
}
