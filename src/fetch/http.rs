use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};

use super::{pick_user_agent, FetchResponse, Fetcher};
use crate::error::FailureKind;
use crate::extract::RawPage;
use crate::models::PriceSource;

/// Tier-1 fetcher: a plain HTTP GET with bounded redirects, a rotating
/// user agent, and deadline enforcement via `tokio::time::timeout`.
pub struct HttpFetcher {
    client: Client,
    ua_counter: AtomicUsize,
}

impl HttpFetcher {
    pub fn new(max_redirects: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(max_redirects))
            .build()?;
        Ok(Self {
            client,
            ua_counter: AtomicUsize::new(0),
        })
    }

    fn next_user_agent(&self) -> &'static str {
        let n = self.ua_counter.fetch_add(1, Ordering::Relaxed);
        pick_user_agent(n)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<FetchResponse, FailureKind> {
        let request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, self.next_user_agent())
            .send();

        let response = match tokio::time::timeout(deadline, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(classify_request_error(&e)),
            Err(_) => return Err(FailureKind::Timeout),
        };

        let final_url = response.url().to_string();
        let status = response.status();

        if let Some(kind) = classify_status(status) {
            return Err(kind);
        }

        let body = match tokio::time::timeout(deadline, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(_)) => return Err(FailureKind::NetworkError),
            Err(_) => return Err(FailureKind::Timeout),
        };

        Ok(FetchResponse {
            page: RawPage { url: final_url, html: body },
            source: PriceSource::Http,
        })
    }
}

/// `None` for 2xx (deliver body); `Some(kind)` otherwise, per spec §4.3.
fn classify_status(status: StatusCode) -> Option<FailureKind> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => Some(FailureKind::RateLimited),
        StatusCode::FORBIDDEN | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
            Some(FailureKind::Blocked)
        }
        s if s.is_server_error() => Some(FailureKind::NetworkError),
        _ => Some(FailureKind::HttpStatus),
    }
}

fn classify_request_error(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_redirect() {
        // Exceeding the bounded redirect depth; see DESIGN.md Open Question 3.
        FailureKind::NetworkError
    } else {
        FailureKind::NetworkError
    }
}
