//! `turnstile run`: start the gateway.
//!
//! Resolves and loads the configuration, starts logging, builds the
//! shared state (any error there is fatal), spawns the maintenance loop
//! and serves HTTP or HTTPS until Ctrl+C / SIGTERM.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::watch;

use crate::cli::RunArgs;
use crate::config;
use crate::error::TurnstileError;
use crate::logging;
use crate::server::{self, AppState};

const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn execute(args: RunArgs) -> Result<(), TurnstileError> {
    let source = config::resolve_source(args.config.as_deref()).await?;
    let mut config = source.load().await?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if args.syslog {
        config.logging.syslog = true;
    }

    // `logging.syslog` picks the access-line sink.
    logging::init(
        &args.log_level,
        logging::resolve_format(args.pretty, args.json),
        config.logging.syslog,
    )?;
    tracing::info!(
        source = source.name(),
        syslog = config.logging.syslog,
        "configuration loaded"
    );

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let tls = config.tls.clone();

    let state = Arc::new(AppState::new(config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = tokio::spawn(maintenance_loop(Arc::clone(&state), shutdown_rx));

    tracing::info!(
        addr = %addr,
        app = %state.config.app_name,
        backends = state.registry.len(),
        prefix = %state.config.proxy.prefix,
        tls = tls.enabled,
        "turnstile started"
    );

    let app = server::build_router(Arc::clone(&state))
        .into_make_service_with_connect_info::<SocketAddr>();

    if tls.enabled {
        let rustls = RustlsConfig::from_pem_file(tls.cert_path(), tls.key_path())
            .await
            .map_err(|e| TurnstileError::Tls { source: e.into() })?;

        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            signal_handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app)
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server::shutdown_signal().await;
                let _ = shutdown_tx.send(true);
            })
            .await?;
    }

    if let Err(e) = maintenance.await {
        tracing::error!(error = %e, "maintenance task failed");
    }

    tracing::info!("turnstile stopped");
    Ok(())
}

/// Periodically purge expired selection cache entries and idle rate
/// limiter state until `shutdown` fires or its sender is dropped.
pub async fn maintenance_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut sweep = tokio::time::interval(Duration::from_secs(state.config.proxy.sweep_interval));
    let mut cleanup =
        tokio::time::interval(Duration::from_secs(state.config.rate_limit.cleanup_interval));
    // Both intervals fire immediately; skip that first tick.
    sweep.tick().await;
    cleanup.tick().await;

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let purged = state.selector.sweep();
                tracing::debug!(
                    purged,
                    remaining = state.selector.cached_entries(),
                    "selection cache swept"
                );
            }
            _ = cleanup.tick() => {
                state.rate_limiter.retain_recent();
                tracing::debug!(
                    tracked = state.rate_limiter.tracked_clients(),
                    "rate limiter state trimmed"
                );
            }
            _ = shutdown.changed() => {
                tracing::debug!("maintenance loop shutting down");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::Config;
    use crate::proxy::path::Fingerprint;

    fn state(cache_expiry: u64, sweep_interval: u64) -> Arc<AppState> {
        let mut config = Config {
            app_name: "Gateway".into(),
            backends: vec!["http://127.0.0.1:9001".into()],
            ..Config::default()
        };
        config.proxy.cache_expiry = cache_expiry;
        config.proxy.sweep_interval = sweep_interval;
        Arc::new(AppState::new(config).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_expired_entries_on_schedule() {
        let state = state(5, 10);
        state
            .selector
            .select(&Fingerprint::new("/a", None), &state.registry);
        assert_eq!(state.selector.cached_entries(), 1);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(maintenance_loop(Arc::clone(&state), rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(state.selector.cached_entries(), 0);

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sender_dropped() {
        let state = state(300, 600);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(maintenance_loop(state, rx));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should exit")
            .unwrap();
    }
}
