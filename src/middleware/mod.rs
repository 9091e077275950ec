//! Ingress middleware: request logging and per-IP rate limiting for the
//! HTTP surface in `api::routes` (distinct from the outbound scrape Rate
//! Governor in `governor.rs`, which paces fetches to competitor sites).

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{RateLimitConfig, RateLimitLayer};
