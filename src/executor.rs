//! Scrape Executor (spec §4.4): runs one job end-to-end within a deadline,
//! composing canonicalization, the two-tier fetcher, and the extractor
//! registry into a single [`ScrapeOutcome`].

use std::sync::Arc;
use std::time::Duration;

use crate::canonical::canonicalize;
use crate::error::FailureKind;
use crate::extract::ExtractorRegistry;
use crate::fetch::Fetcher;
use crate::models::{PriceSignal, PriceSource, ScrapeJob, ScrapeOutcome};

/// Minimum confidence an extracted signal must clear to count as a success.
const MIN_CONFIDENCE: f32 = 0.4;

pub struct ScrapeExecutor {
    http_fetcher: Arc<dyn Fetcher>,
    browser_fetcher: Arc<dyn Fetcher>,
    extractors: ExtractorRegistry,
    domain_allowlist: Option<Vec<String>>,
}

impl ScrapeExecutor {
    /// `domain_allowlist` gates every job this executor runs, regardless of
    /// whether it arrived via the Scheduler, a manual ingress route, or a
    /// retry/DLQ replay (spec §4.4 step 1, §6).
    pub fn new(
        http_fetcher: Arc<dyn Fetcher>,
        browser_fetcher: Arc<dyn Fetcher>,
        extractors: ExtractorRegistry,
        domain_allowlist: Option<Vec<String>>,
    ) -> Self {
        Self { http_fetcher, browser_fetcher, extractors, domain_allowlist }
    }

    /// Run the job to completion, never returning an `Err` — all failure
    /// modes are communicated through the returned `ScrapeOutcome`.
    pub async fn run(&self, job: &ScrapeJob, deadline: Duration) -> ScrapeOutcome {
        let canonical_url = match canonicalize(&job.url) {
            Ok(url) => url,
            Err(_) => {
                return ScrapeOutcome::HardFail {
                    kind: FailureKind::InvalidUrl,
                    detail: format!("could not canonicalize {}", job.url),
                }
            }
        };

        let host = match url::Url::parse(&canonical_url) {
            Ok(u) => u.host_str().unwrap_or_default().to_string(),
            Err(_) => {
                return ScrapeOutcome::HardFail {
                    kind: FailureKind::InvalidUrl,
                    detail: canonical_url,
                }
            }
        };

        if !self.is_allowed(&host) {
            return ScrapeOutcome::HardFail {
                kind: FailureKind::DomainBlocked,
                detail: format!("{host} is not in the domain allowlist"),
            };
        }

        match self.http_fetcher.fetch(&canonical_url, deadline).await {
            Ok(response) => {
                match self.extractors.extract(&host, &response.page) {
                    Ok(signal) if signal.confidence >= MIN_CONFIDENCE => {
                        ScrapeOutcome::Success(signal)
                    }
                    Ok(signal) => classify_failure(FailureKind::ParseMiss, signal_too_low(&signal)),
                    Err(FailureKind::ParseMiss) if job.allow_browser_fallback => {
                        self.escalate_to_browser(&canonical_url, &host, deadline).await
                    }
                    Err(kind) => classify_failure(kind, kind.to_string()),
                }
            }
            Err(kind) => classify_failure(kind, kind.to_string()),
        }
    }

    async fn escalate_to_browser(
        &self,
        canonical_url: &str,
        host: &str,
        deadline: Duration,
    ) -> ScrapeOutcome {
        match self.browser_fetcher.fetch(canonical_url, deadline).await {
            Ok(response) => match self.extractors.extract(host, &response.page) {
                Ok(signal) if signal.confidence >= MIN_CONFIDENCE => {
                    let signal = PriceSignal { extracted_from: PriceSource::Browser, ..signal };
                    ScrapeOutcome::Success(signal)
                }
                Ok(signal) => classify_failure(FailureKind::ParseMiss, signal_too_low(&signal)),
                Err(kind) => classify_failure(kind, kind.to_string()),
            },
            Err(kind) => classify_failure(kind, kind.to_string()),
        }
    }

    fn is_allowed(&self, host: &str) -> bool {
        match &self.domain_allowlist {
            None => true,
            Some(allowlist) => allowlist.iter().any(|h| h == host),
        }
    }
}

fn signal_too_low(signal: &PriceSignal) -> String {
    format!("extracted confidence {:.2} below minimum", signal.confidence)
}

/// Map a `FailureKind` into the `SoftFail`/`HardFail` tagged variant per
/// spec §4.4 step 5.
fn classify_failure(kind: FailureKind, detail: String) -> ScrapeOutcome {
    if kind.is_soft() {
        ScrapeOutcome::SoftFail { kind, detail }
    } else {
        ScrapeOutcome::HardFail { kind, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::extract::RawPage;
    use crate::models::JobOrigin;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FakeFetcher {
        result: Result<&'static str, FailureKind>,
        source: PriceSource,
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _deadline: Duration) -> Result<FetchResponse, FailureKind> {
            match self.result {
                Ok(html) => Ok(FetchResponse {
                    page: RawPage { url: url.to_string(), html: html.to_string() },
                    source: self.source,
                }),
                Err(kind) => Err(kind),
            }
        }
    }

    fn make_job(url: &str, allow_browser_fallback: bool) -> ScrapeJob {
        ScrapeJob {
            id: "job-1".into(),
            tracker_id: "tracker-1".into(),
            product_id: "product-1".into(),
            url: url.into(),
            allow_browser_fallback,
            attempt: 1,
            max_attempts: 3,
            enqueued_at: Utc::now(),
            not_before: None,
            origin: JobOrigin::Manual,
        }
    }

    #[tokio::test]
    async fn success_on_structured_data() {
        let http = Arc::new(FakeFetcher {
            result: Ok(r#"<script type="application/ld+json">{"@type":"Product","offers":{"price":"19.99","priceCurrency":"USD"}}</script>"#),
            source: PriceSource::Http,
        });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), None);
        let job = make_job("https://shop.test/p/1", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn escalates_to_browser_on_parse_miss() {
        let http = Arc::new(FakeFetcher { result: Ok("<div>no price</div>"), source: PriceSource::Http });
        let browser = Arc::new(FakeFetcher {
            result: Ok(r#"<meta property="og:price:amount" content="42.00" /><meta property="og:price:currency" content="USD" />"#),
            source: PriceSource::Browser,
        });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), None);
        let job = make_job("https://shop.test/p/1", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        match outcome {
            ScrapeOutcome::Success(signal) => assert_eq!(signal.extracted_from, PriceSource::Browser),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn does_not_escalate_when_fallback_disallowed() {
        let http = Arc::new(FakeFetcher { result: Ok("<div>no price</div>"), source: PriceSource::Http });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), None);
        let job = make_job("https://shop.test/p/1", false);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert_eq!(outcome.kind(), Some(FailureKind::ParseMiss));
    }

    #[tokio::test]
    async fn invalid_url_fails_before_fetch() {
        let http = Arc::new(FakeFetcher { result: Err(FailureKind::NetworkError), source: PriceSource::Http });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), None);
        let job = make_job("not a url", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert_eq!(outcome.kind(), Some(FailureKind::InvalidUrl));
    }

    #[tokio::test]
    async fn domain_blocked_when_host_not_allowlisted() {
        let http = Arc::new(FakeFetcher { result: Err(FailureKind::NetworkError), source: PriceSource::Http });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), Some(vec!["allowed.test".into()]));
        let job = make_job("https://shop.test/p/1", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert_eq!(outcome.kind(), Some(FailureKind::DomainBlocked));
    }

    #[tokio::test]
    async fn allowlisted_host_is_not_blocked() {
        let http = Arc::new(FakeFetcher {
            result: Ok(r#"<script type="application/ld+json">{"@type":"Product","offers":{"price":"19.99","priceCurrency":"USD"}}</script>"#),
            source: PriceSource::Http,
        });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), Some(vec!["shop.test".into()]));
        let job = make_job("https://shop.test/p/1", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn soft_fail_on_network_error() {
        let http = Arc::new(FakeFetcher { result: Err(FailureKind::NetworkError), source: PriceSource::Http });
        let browser = Arc::new(FakeFetcher { result: Err(FailureKind::BrowserError), source: PriceSource::Browser });
        let executor = ScrapeExecutor::new(http, browser, ExtractorRegistry::new(), None);
        let job = make_job("https://shop.test/p/1", true);

        let outcome = executor.run(&job, Duration::from_secs(5)).await;
        assert!(matches!(outcome, ScrapeOutcome::SoftFail { kind: FailureKind::NetworkError, .. }));
    }
}
