use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{FetchResponse, Fetcher};
use crate::error::FailureKind;
use crate::extract::RawPage;
use crate::models::PriceSource;

/// Tier-2 fetcher: a headless browser navigation for pages whose price is
/// rendered client-side and therefore invisible to a plain HTTP GET.
///
/// One browser process is launched at construction and reused across calls;
/// each `fetch` opens and closes its own tab so concurrent scrapes don't
/// interfere with each other's navigation state.
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    _handler: JoinHandle<()>,
}

impl BrowserFetcher {
    pub async fn launch() -> anyhow::Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser config: {e}"))?;
        let (browser, mut handler) = Browser::launch(config).await?;

        let _handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!(error = %e, "browser handler event error");
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            _handler,
        })
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, deadline: Duration) -> Result<FetchResponse, FailureKind> {
        let navigate = async {
            let page = self
                .browser
                .new_page(url)
                .await
                .map_err(|_| FailureKind::BrowserError)?;
            page.wait_for_navigation()
                .await
                .map_err(|_| FailureKind::BrowserError)?;
            let html = page.content().await.map_err(|_| FailureKind::BrowserError)?;
            let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());
            let _ = page.close().await;
            Ok::<_, FailureKind>((final_url, html))
        };

        let (final_url, html) = match tokio::time::timeout(deadline, navigate).await {
            Ok(result) => result?,
            Err(_) => return Err(FailureKind::Timeout),
        };

        Ok(FetchResponse {
            page: RawPage { url: final_url, html },
            source: PriceSource::Browser,
        })
    }
}
