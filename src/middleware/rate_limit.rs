//! Per-client admission control.
//!
//! Wraps a [`governor`] keyed GCRA limiter. Each client IP gets its own
//! cell with a sustained rate of `requests_per_second` and a burst of
//! `max(1, floor(requests_per_second))`, so a limit of `1` admits exactly
//! one request per second and fractional limits such as `0.5` admit one
//! request every two seconds.
//!
//! The limiter keeps its own synchronisation (a sharded `DashMap`) and
//! never touches the selection cache lock. Idle keys are dropped by
//! [`ClientRateLimiter::retain_recent`], called from the maintenance loop.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

use crate::config::model::RATE_LIMIT_MESSAGE;
use crate::error::TurnstileError;
use crate::routes::JsonMessage;
use crate::server::AppState;

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct ClientRateLimiter {
    inner: Arc<KeyedLimiter>,
    clock: DefaultClock,
}

impl fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("tracked_clients", &self.inner.len())
            .finish_non_exhaustive()
    }
}

impl ClientRateLimiter {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(requests_per_second: f64) -> Result<Self, TurnstileError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(TurnstileError::InvalidRateLimit(requests_per_second));
        }

        let period = Duration::try_from_secs_f64(1.0 / requests_per_second)
            .map_err(|_| TurnstileError::InvalidRateLimit(requests_per_second))?;
        let burst = NonZeroU32::new(requests_per_second.floor().clamp(1.0, f64::from(u32::MAX)) as u32)
            .unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .ok_or(TurnstileError::InvalidRateLimit(requests_per_second))?
            .allow_burst(burst);

        Ok(Self {
            inner: Arc::new(RateLimiter::dashmap(quota)),
            clock: DefaultClock::default(),
        })
    }

    /// Admit or reject one request from `ip`. On rejection returns how long
    /// the client must wait before the next request would be admitted.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.inner
            .check_key(&ip.to_canonical())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    pub fn retain_recent(&self) {
        self.inner.retain_recent();
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.inner.len()
    }
}

fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match state.rate_limiter.check(ip) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            state.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                client = %ip,
                retry_after_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate limit exceeded"
            );
            let status = StatusCode::from_u16(state.config.rate_limit.status)
                .unwrap_or(StatusCode::TOO_MANY_REQUESTS);
            let mut response =
                (status, Json(JsonMessage::new(RATE_LIMIT_MESSAGE))).into_response();
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after_secs(wait)));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn one_per_second_rejects_second_request() {
        let limiter = ClientRateLimiter::new(1.0).unwrap();
        assert!(limiter.check(ip("10.0.0.1")).is_ok());
        let wait = limiter.check(ip("10.0.0.1")).unwrap_err();
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = ClientRateLimiter::new(1.0).unwrap();
        assert!(limiter.check(ip("10.0.0.1")).is_ok());
        assert!(limiter.check(ip("10.0.0.2")).is_ok());
        assert!(limiter.check(ip("10.0.0.1")).is_err());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn burst_matches_whole_rate() {
        let limiter = ClientRateLimiter::new(5.0).unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip("10.0.0.1")).is_ok());
        }
        assert!(limiter.check(ip("10.0.0.1")).is_err());
    }

    #[test]
    fn readmits_after_window() {
        let limiter = ClientRateLimiter::new(20.0).unwrap();
        for _ in 0..20 {
            assert!(limiter.check(ip("10.0.0.1")).is_ok());
        }
        assert!(limiter.check(ip("10.0.0.1")).is_err());
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check(ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn mapped_v6_shares_v4_bucket() {
        let limiter = ClientRateLimiter::new(1.0).unwrap();
        assert!(limiter.check(ip("127.0.0.1")).is_ok());
        assert!(limiter.check(ip("::ffff:127.0.0.1")).is_err());
    }

    #[test]
    fn invalid_rates_are_fatal() {
        assert!(ClientRateLimiter::new(0.0).is_err());
        assert!(ClientRateLimiter::new(-3.0).is_err());
        assert!(ClientRateLimiter::new(f64::NAN).is_err());
        assert!(ClientRateLimiter::new(f64::INFINITY).is_err());
        assert!(ClientRateLimiter::new(0.5).is_ok());
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(10)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }
}
