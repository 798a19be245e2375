//! `turnstile health`: query `/health` on a running instance.

use std::time::Duration;

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::TurnstileError;
use crate::health::HealthResponse;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

fn request_error(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> TurnstileError {
    TurnstileError::HttpRequest {
        source: source.into(),
    }
}

pub async fn execute(args: HealthArgs) -> Result<(), TurnstileError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let uri: hyper::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
        TurnstileError::UriParse {
            source: Box::new(e),
        }
    })?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(request_error)?;

    let response = tokio::time::timeout(HEALTH_TIMEOUT, client.request(req))
        .await
        .map_err(|_| request_error("health check timed out after 10s"))?
        .map_err(request_error)?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(request_error)?
        .to_bytes();

    if !status.is_success() {
        return Err(TurnstileError::HealthCheckFailed(status));
    }

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => {
            println!("\u{2713} {} is healthy ({})", health.app_name, args.url);
            println!(
                "  version:        {} ({})",
                health.version, health.commit
            );
            println!("  uptime:         {}", format_uptime(health.uptime_seconds));
            println!(
                "  backends:       {} ({} pinned fingerprints)",
                health.backends, health.cache_entries
            );
            println!("  clients:        {} tracked", health.tracked_clients);
            println!(
                "  requests:       {} forwarded, {} failed, {} rate limited, {} denied",
                health.stats.requests_forwarded,
                health.stats.requests_failed,
                health.stats.requests_rate_limited,
                health.stats.requests_denied
            );
        }
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3 * 3600 + 61), "3h 1m 1s");
    }
}
