//! Configuration loading and validation.
//!
//! Defines the [`ConfigSource`] trait for pluggable config sources and
//! [`resolve_source`], which picks one at startup. Configuration is read
//! once; the resulting [`Config`] is wrapped in an `Arc` and handed to
//! every component that needs it.

pub mod model;
pub mod sources;
pub mod validation;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::TurnstileError;
use model::Config;

/// File names probed in the working directory when no `--config` is given.
pub const AUTO_DETECT_CANDIDATES: &[&str] = &[
    "turnstile.yaml",
    "turnstile.yml",
    "turnstile.json",
    "turnstile.toml",
];

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits (Rust 1.75+) does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load and validate. Any error here must abort startup.
    async fn load(&self) -> Result<Config, TurnstileError>;
}

/// Pick the config source: explicit file, then an auto-detected file,
/// then the process environment.
pub async fn resolve_source(
    explicit: Option<&Path>,
) -> Result<Box<dyn ConfigSource>, TurnstileError> {
    if let Some(path) = explicit {
        return create_file_source(path);
    }

    for name in AUTO_DETECT_CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected config file");
            return create_file_source(&path);
        }
    }

    let env = sources::env::EnvSource::from_process();
    if env.is_present() {
        tracing::info!("loading config from environment");
        return Ok(Box::new(env));
    }

    Err(TurnstileError::NoConfigSource {
        hint: "Provide --config <file>, place a turnstile.yaml in the working directory,\n  \
               or set SUB_SERVICES and friends in the environment.\n  \
               Run 'turnstile init' to create a config file."
            .into(),
    })
}

pub fn create_file_source(path: &Path) -> Result<Box<dyn ConfigSource>, TurnstileError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(sources::file_source::FileSource::yaml(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(sources::file_source::FileSource::json(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(sources::file_source::FileSource::toml(path.to_path_buf()))),

        other => Err(TurnstileError::UnsupportedFormat(other.to_string())),
    }
}
