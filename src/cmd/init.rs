//! `turnstile init`: generate a starter configuration file.
//!
//! Writes a YAML, JSON, or TOML config with either a minimal or a fully
//! documented template. Refuses to overwrite an existing file.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::error::TurnstileError;

pub fn execute(args: &InitArgs) -> Result<(), TurnstileError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("turnstile.{}", args.format.extension())));

    if output.exists() {
        return Err(TurnstileError::FileExists { path: output });
    }

    std::fs::write(&output, template(&args.format, args.full))?;
    println!("Created {}", output.display());
    Ok(())
}

const fn template(format: &ConfigFormat, full: bool) -> &'static str {
    match (format, full) {
        (ConfigFormat::Yaml, false) => YAML_MINIMAL,
        (ConfigFormat::Yaml, true) => YAML_FULL,
        (ConfigFormat::Json, false) => JSON_MINIMAL,
        (ConfigFormat::Json, true) => JSON_FULL,
        (ConfigFormat::Toml, false) => TOML_MINIMAL,
        (ConfigFormat::Toml, true) => TOML_FULL,
    }
}

const YAML_MINIMAL: &str = r#"# Turnstile config

app_name: "My Gateway"
backends:
  - "http://localhost:8081"
  - "http://localhost:8082"
"#;

const YAML_FULL: &str = r#"# Turnstile config
#
# All values shown besides app_name and backends are defaults.

app_name: "My Gateway"

# Requests under proxy.prefix are spread across these backends.
backends:
  - "http://localhost:8081"
  - "http://localhost:8082"

server:
  host: "0.0.0.0"
  port: 3000
  # max_body: 1048576          # Request body limit in bytes; unset = no limit

proxy:
  prefix: "/api"
  path_rewrite: strip_prefix   # strip_prefix: /api/v1/x -> /v1/x
                               # last_segment: /api/v1/x -> /x
  cache_expiry: 300            # Seconds a path+query stays on one backend (0 = forever)
  sweep_interval: 600          # Seconds between expired-entry sweeps
  timeout: 30000               # Upstream response timeout in ms
  skip_tls_verify: true        # Accept any backend certificate

rate_limit:
  requests_per_second: 10.0    # Per client IP; fractions allowed
  status: 429
  cleanup_interval: 60         # Seconds between idle client purges

cors:
  allow_all_origins: false
  allowed_origins: []          # e.g. ["https://app.example.com"]
  allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
  allowed_headers: ["Origin", "Content-Length", "Content-Type"]

access:
  allowed_ip_ranges: []        # CIDR, e.g. ["10.0.0.0/8"]; empty = allow all
  allowed_ips: []              # e.g. ["203.0.113.7"]; empty = allow all

tls:
  enabled: false
  cert_dir: "certs"            # Must contain cert.pem and key.pem

logging:
  syslog: false                # Per-request access lines to the local syslog
"#;

const JSON_MINIMAL: &str = r#"{
  "app_name": "My Gateway",
  "backends": [
    "http://localhost:8081",
    "http://localhost:8082"
  ]
}
"#;

const JSON_FULL: &str = r#"{
  "app_name": "My Gateway",
  "backends": [
    "http://localhost:8081",
    "http://localhost:8082"
  ],
  "server": {
    "host": "0.0.0.0",
    "port": 3000
  },
  "proxy": {
    "prefix": "/api",
    "path_rewrite": "strip_prefix",
    "cache_expiry": 300,
    "sweep_interval": 600,
    "timeout": 30000,
    "skip_tls_verify": true
  },
  "rate_limit": {
    "requests_per_second": 10.0,
    "status": 429,
    "cleanup_interval": 60
  },
  "cors": {
    "allow_all_origins": false,
    "allowed_origins": [],
    "allowed_methods": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"],
    "allowed_headers": ["Origin", "Content-Length", "Content-Type"]
  },
  "access": {
    "allowed_ip_ranges": [],
    "allowed_ips": []
  },
  "tls": {
    "enabled": false,
    "cert_dir": "certs"
  },
  "logging": {
    "syslog": false
  }
}
"#;

const TOML_MINIMAL: &str = r#"# Turnstile config

app_name = "My Gateway"
backends = ["http://localhost:8081", "http://localhost:8082"]
"#;

const TOML_FULL: &str = r#"# Turnstile config
#
# All values shown besides app_name and backends are defaults.

app_name = "My Gateway"
backends = ["http://localhost:8081", "http://localhost:8082"]

[server]
host = "0.0.0.0"
port = 3000
# max_body = 1048576          # Request body limit in bytes; unset = no limit

[proxy]
prefix = "/api"
path_rewrite = "strip_prefix" # or "last_segment"
cache_expiry = 300            # Seconds a path+query stays on one backend (0 = forever)
sweep_interval = 600
timeout = 30000               # Upstream response timeout in ms
skip_tls_verify = true

[rate_limit]
requests_per_second = 10.0
status = 429
cleanup_interval = 60

[cors]
allow_all_origins = false
allowed_origins = []
allowed_methods = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
allowed_headers = ["Origin", "Content-Length", "Content-Type"]

[access]
allowed_ip_ranges = []        # CIDR; empty = allow all
allowed_ips = []

[tls]
enabled = false
cert_dir = "certs"            # Must contain cert.pem and key.pem

[logging]
syslog = false                # Per-request access lines to the local syslog
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Config;
    use crate::config::validation::validate;

    fn check(config: &Config) {
        assert_eq!(config.app_name, "My Gateway");
        assert_eq!(config.backends.len(), 2);
        validate(config).unwrap();
    }

    #[test]
    fn json_templates_are_valid() {
        for full in [false, true] {
            let config: Config = serde_json::from_str(template(&ConfigFormat::Json, full)).unwrap();
            check(&config);
        }
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_templates_are_valid() {
        for full in [false, true] {
            let config: Config = serde_yml::from_str(template(&ConfigFormat::Yaml, full)).unwrap();
            check(&config);
        }
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_templates_are_valid() {
        for full in [false, true] {
            let config: Config = toml::from_str(template(&ConfigFormat::Toml, full)).unwrap();
            check(&config);
        }
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("turnstile-init-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = dir.join("existing.yaml");
        std::fs::write(&output, "app_name: keep").unwrap();

        let args = InitArgs {
            format: ConfigFormat::Yaml,
            output: Some(output.clone()),
            full: false,
        };
        assert!(matches!(execute(&args), Err(TurnstileError::FileExists { .. })));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "app_name: keep");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
