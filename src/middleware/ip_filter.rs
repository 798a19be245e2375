//! IP admission filters.
//!
//! Two independent checks run after the rate limiter: the client IP must
//! fall inside one of the configured CIDR ranges ([`IpRangeFilter`]) and
//! must appear in the explicit allow-list ([`IpAllowList`]). A filter
//! with an empty list is disabled. Either one denying ends the request
//! with `403` before a backend is chosen.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::TurnstileError;
use crate::routes::JsonMessage;
use crate::server::AppState;

/// An IPv4 or IPv6 network in CIDR notation. A bare address is a host route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix_len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix_len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

const fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

const fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix)
    }
}

impl FromStr for CidrRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network = addr
            .parse::<IpAddr>()
            .map_err(|_| format!("'{s}' is not a valid CIDR range"))?
            .to_canonical();
        let max = if network.is_ipv4() { 32 } else { 128 };

        let prefix_len = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("'{s}' has an invalid prefix length (0-{max})"))?,
            None => max,
        };

        Ok(Self {
            network,
            prefix_len,
        })
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpRangeFilter {
    ranges: Vec<CidrRange>,
}

impl IpRangeFilter {
    pub fn new(ranges: &[String]) -> Result<Self, TurnstileError> {
        let ranges = ranges
            .iter()
            .map(|r| {
                r.parse::<CidrRange>()
                    .map_err(|message| TurnstileError::ConfigValidation {
                        errors: vec![crate::error::ValidationError {
                            section: "access".into(),
                            field: "allowed_ip_ranges".into(),
                            message,
                            suggestion: None,
                        }],
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    #[must_use]
    pub fn allows(&self, ip: IpAddr) -> bool {
        !self.is_enabled() || self.ranges.iter().any(|r| r.contains(ip))
    }
}

#[derive(Debug, Clone, Default)]
pub struct IpAllowList {
    ips: HashSet<IpAddr>,
}

impl IpAllowList {
    pub fn new(ips: &[String]) -> Result<Self, TurnstileError> {
        let ips = ips
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map(|ip| ip.to_canonical())
                    .map_err(|_| TurnstileError::ConfigValidation {
                        errors: vec![crate::error::ValidationError {
                            section: "access".into(),
                            field: "allowed_ips".into(),
                            message: format!("'{ip}' is not a valid IP address"),
                            suggestion: None,
                        }],
                    })
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { ips })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ips.is_empty()
    }

    #[must_use]
    pub fn allows(&self, ip: IpAddr) -> bool {
        !self.is_enabled() || self.ips.contains(&ip.to_canonical())
    }
}

fn deny(state: &AppState, ip: IpAddr, check: &'static str) -> Response {
    state.stats.denied.fetch_add(1, Ordering::Relaxed);
    tracing::warn!(client = %ip, check, "client IP denied");
    (
        StatusCode::FORBIDDEN,
        Json(JsonMessage::new(format!("Access denied for IP {ip}"))),
    )
        .into_response()
}

pub async fn ip_range_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    if state.ip_ranges.allows(ip) {
        next.run(request).await
    } else {
        deny(&state, ip, "ip_range")
    }
}

pub async fn ip_allow_list_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    if state.ip_allow_list.allows(ip) {
        next.run(request).await
    } else {
        deny(&state, ip, "ip_allow_list")
    }
}
