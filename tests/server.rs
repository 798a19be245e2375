//! Integration tests for the static routes, health endpoint, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use turnstile::config::model::Config;
use turnstile::health::HealthResponse;
use turnstile::routes::JsonMessage;
use turnstile::server::{self, AppState};

fn test_config() -> Config {
    Config {
        app_name: "Test Gateway".into(),
        // Never contacted by these tests.
        backends: vec![
            "http://localhost:19999".into(),
            "http://localhost:19998".into(),
        ],
        ..Config::default()
    }
}

async fn start_test_server(config: Config) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let state = Arc::new(AppState::new(config).unwrap());
    let router = server::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

#[tokio::test]
async fn root_welcomes_with_app_name() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: JsonMessage = resp.json().await.unwrap();
    assert_eq!(body.message, "Welcome to the Test Gateway");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn opts_returns_no_content_with_allow_headers() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/opts"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers()["access-control-allow-methods"],
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    assert_eq!(
        resp.headers()["access-control-allow-headers"],
        "Origin, Content-Length, Content-Type"
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unmatched_route_returns_json_404() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let resp = reqwest::get(format!("http://{addr}/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: JsonMessage = resp.json().await.unwrap();
    assert_eq!(body.message, "Method or route not found in: Test Gateway");

    let _ = shutdown.send(());
}

#[tokio::test]
async fn wrong_method_on_static_route_returns_json_404() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: JsonMessage = resp.json().await.unwrap();
    assert!(body.message.ends_with("Test Gateway"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn static_routes_skip_rate_limit() {
    let mut config = test_config();
    config.rate_limit.requests_per_second = 1.0;
    let (addr, shutdown) = start_test_server(config).await;

    let client = reqwest::Client::new();
    for _ in 0..5 {
        let resp = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.app_name, "Test Gateway");
    assert_eq!(health.backends, 2);
    assert_eq!(health.cache_entries, 0);
    assert_eq!(health.stats.requests_forwarded, 0);
    assert_eq!(health.stats.requests_failed, 0);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, shutdown) = start_test_server(test_config()).await;

    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    let _ = shutdown.send(());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}
