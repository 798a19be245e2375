//! Policy layers of the dispatch pipeline.
//!
//! Order for every request under the proxy prefix: [`cors`] (router-wide),
//! then [`rate_limit`], then the two [`ip_filter`] checks. Each rejecting
//! stage ends the request; nothing later runs and no backend is contacted.
//! The wiring lives in [`server::build_router`](crate::server::build_router).

pub mod cors;
pub mod ip_filter;
pub mod rate_limit;
