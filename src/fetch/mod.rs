//! Two-tier Fetcher (spec §4.3): an `HttpFetcher` for the common case, a
//! `BrowserFetcher` escalation for JS-rendered pages.

mod browser;
mod http;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FailureKind;
use crate::extract::RawPage;
use crate::models::PriceSource;

/// A successful fetch: the rendered/raw page plus which tier produced it.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub page: RawPage,
    pub source: PriceSource,
}

/// A fetch tier. Both tiers enforce `deadline` themselves and report
/// `TIMEOUT` rather than letting the caller race a separate timer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<FetchResponse, FailureKind>;
}

/// Small rotating pool of realistic desktop user agents (spec §4.3).
pub(crate) const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
];

pub(crate) fn pick_user_agent(counter: usize) -> &'static str {
    USER_AGENTS[counter % USER_AGENTS.len()]
}
