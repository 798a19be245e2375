//! Environment-variable config source.
//!
//! Reads the flat variable set used by container deployments
//! (`APP_NAME`, `SUB_SERVICES`, `PER_REQUEST_LIMIT`, ...). List values
//! are comma-separated. Numeric values must parse; a bad number is a
//! [`TurnstileError::ConfigParse`] and stops startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;

use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::ConfigSource;
use crate::error::TurnstileError;

pub const APP_NAME: &str = "APP_NAME";
pub const PORT: &str = "PORT";
pub const SUB_SERVICES: &str = "SUB_SERVICES";
pub const CACHE_EXPIRY: &str = "CACHE_EXPIRY";
pub const PER_REQUEST_LIMIT: &str = "PER_REQUEST_LIMIT";
pub const ALLOW_ALL_ORIGINS: &str = "ALLOW_ALL_ORIGINS";
pub const ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ALLOWED_REST_METHODS: &str = "ALLOWED_REST_METHODS";
pub const ALLOWED_REST_HEADERS: &str = "ALLOWED_REST_HEADERS";
pub const ALLOWED_IP_RANGES: &str = "ALLOWED_IP_RANGES";
pub const ALLOWED_SPECIFIC_IPS: &str = "ALLOWED_SPECIFIC_IPS";
pub const CERT_FOLDER: &str = "CERT_FOLDER";
pub const HTTPS: &str = "HTTPS";
pub const SYSLOG: &str = "SYSLOG";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvSource {
    lookup: Lookup,
}

impl EnvSource {
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    #[must_use]
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |key| vars.get(key).cloned()),
        }
    }

    /// Whether the environment looks configured at all.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.get(SUB_SERVICES).is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }

    fn number<T>(&self, key: &str) -> Result<Option<T>, TurnstileError>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| TurnstileError::ConfigParse {
                    path: format!("environment ({key}={raw})"),
                    source: Box::new(e),
                })
            })
            .transpose()
    }

    /// Build a [`Config`] from the environment without validating it.
    pub fn build(&self) -> Result<Config, TurnstileError> {
        let mut config = Config {
            app_name: self.get(APP_NAME).unwrap_or_default(),
            backends: self.list(SUB_SERVICES).unwrap_or_default(),
            ..Config::default()
        };

        if let Some(port) = self.number::<u16>(PORT)? {
            config.server.port = port;
        }
        if let Some(expiry) = self.number::<u64>(CACHE_EXPIRY)? {
            config.proxy.cache_expiry = expiry;
        }
        if let Some(rps) = self.number::<f64>(PER_REQUEST_LIMIT)? {
            config.rate_limit.requests_per_second = rps;
        }

        if let Some(all) = self.flag(ALLOW_ALL_ORIGINS) {
            config.cors.allow_all_origins = all;
        }
        if let Some(origins) = self.list(ALLOWED_ORIGINS) {
            config.cors.allowed_origins = origins;
        }
        if let Some(methods) = self.list(ALLOWED_REST_METHODS) {
            config.cors.allowed_methods = methods;
        }
        if let Some(headers) = self.list(ALLOWED_REST_HEADERS) {
            config.cors.allowed_headers = headers;
        }

        if let Some(ranges) = self.list(ALLOWED_IP_RANGES) {
            config.access.allowed_ip_ranges = ranges;
        }
        if let Some(ips) = self.list(ALLOWED_SPECIFIC_IPS) {
            config.access.allowed_ips = ips;
        }

        if let Some(dir) = self.get(CERT_FOLDER) {
            config.tls.cert_dir = PathBuf::from(dir);
        }
        if let Some(https) = self.flag(HTTPS) {
            config.tls.enabled = https;
        }
        if let Some(syslog) = self.flag(SYSLOG) {
            config.logging.syslog = syslog;
        }

        Ok(config)
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn load(&self) -> Result<Config, TurnstileError> {
        let config = self.build()?;
        if let Err(errors) = validate(&config) {
            return Err(TurnstileError::ConfigValidation { errors });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(vars: &[(&str, &str)]) -> EnvSource {
        EnvSource::from_map(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn reads_lists_and_numbers() {
        let env = source(&[
            (APP_NAME, "Edge"),
            (SUB_SERVICES, "http://b1:9000, http://b2:9000,"),
            (CACHE_EXPIRY, "5"),
            (PER_REQUEST_LIMIT, "2.5"),
            (ALLOWED_IP_RANGES, "10.0.0.0/8,192.168.0.0/16"),
            (HTTPS, "true"),
            (CERT_FOLDER, "/etc/certs"),
        ]);
        let config = env.build().unwrap();
        assert_eq!(config.app_name, "Edge");
        assert_eq!(config.backends, vec!["http://b1:9000", "http://b2:9000"]);
        assert_eq!(config.proxy.cache_expiry, 5);
        assert!((config.rate_limit.requests_per_second - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.access.allowed_ip_ranges.len(), 2);
        assert!(config.tls.enabled);
        assert_eq!(config.tls.cert_path(), PathBuf::from("/etc/certs/cert.pem"));
    }

    #[test]
    fn syslog_flag_is_read() {
        let base = [(SUB_SERVICES, "http://b1:9000")];
        assert!(!source(&base).build().unwrap().logging.syslog);

        let on = source(&[base[0], (SYSLOG, "true")]).build().unwrap();
        assert!(on.logging.syslog);

        let off = source(&[base[0], (SYSLOG, "no")]).build().unwrap();
        assert!(!off.logging.syslog);
    }

    #[test]
    fn unparseable_cache_expiry_is_fatal() {
        let env = source(&[(SUB_SERVICES, "http://b1:9000"), (CACHE_EXPIRY, "soon")]);
        let err = env.build().unwrap_err();
        assert!(matches!(err, TurnstileError::ConfigParse { ref path, .. } if path.contains(CACHE_EXPIRY)));
    }

    #[test]
    fn unparseable_rate_limit_is_fatal() {
        let env = source(&[(SUB_SERVICES, "http://b1:9000"), (PER_REQUEST_LIMIT, "ten")]);
        assert!(env.build().is_err());
    }

    #[test]
    fn presence_depends_on_sub_services() {
        assert!(!source(&[(APP_NAME, "Edge")]).is_present());
        assert!(!source(&[(SUB_SERVICES, "  ")]).is_present());
        assert!(source(&[(SUB_SERVICES, "http://b1:9000")]).is_present());
    }

    #[tokio::test]
    async fn load_validates() {
        let env = source(&[(APP_NAME, "Edge"), (SUB_SERVICES, "not a url")]);
        let err = env.load().await.unwrap_err();
        assert!(matches!(err, TurnstileError::ConfigValidation { .. }));
    }

    #[tokio::test]
    async fn load_succeeds_for_complete_environment() {
        let env = source(&[(APP_NAME, "Edge"), (SUB_SERVICES, "http://b1:9000")]);
        let config = env.load().await.unwrap();
        assert_eq!(config.backends.len(), 1);
    }
}
