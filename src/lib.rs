//! Turnstile is a policy-enforcing reverse proxy.
//!
//! Requests under a configurable prefix pass CORS, a per-client rate
//! limit and two IP admission filters, then go to one of several
//! interchangeable backends. The backend is chosen at random the first
//! time a path+query is seen and stays pinned to it for a configurable
//! window, so repeated requests for the same resource land on the same
//! backend.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- Configuration model, loading from files or the environment
//!   via the [`ConfigSource`](config::ConfigSource) trait, and validation.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- CORS, rate limiting and IP filtering.
//! - [`proxy`] -- Path normalization, backend registry, sticky selection and
//!   request forwarding.
//! - [`routes`] -- Static routes served by the gateway itself.
//! - [`server`] -- Shared application state, router wiring and graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file formats |
//! | `full` | All features |

// Library half of a binary crate; nothing here is a stable public API.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod server;
