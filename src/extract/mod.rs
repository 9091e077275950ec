//! Price Extractors (spec §4.2).
//!
//! An [`Adapter`] turns a fetched page into a [`PriceSignal`]. Adapters are
//! tried in registration order; the first one that both claims the host and
//! successfully extracts a price wins. A generic heuristic adapter is always
//! tried last as a fallback so unknown hosts still get a best-effort signal.

mod generic;
mod price_parse;
mod structured;

pub use generic::GenericAdapter;
pub use price_parse::{detect_currency, parse_price};
pub use structured::StructuredDataAdapter;

use crate::error::FailureKind;
use crate::models::PriceSignal;

/// A fetched page handed to adapters for extraction. Carries enough of the
/// response to avoid re-fetching: the final URL (after redirects) and the
/// full HTML body.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub html: String,
}

/// A strategy for turning a [`RawPage`] into a [`PriceSignal`].
///
/// Implementations must not perform I/O: extraction is pure parsing over
/// already-fetched content.
pub trait Adapter: Send + Sync {
    /// Stable identifier stored alongside extracted signals for audit.
    fn id(&self) -> &str;

    /// Whether this adapter is specialized for the given host. The generic
    /// fallback adapter claims every host.
    fn claims(&self, host: &str) -> bool;

    /// Attempt extraction. `None` means this adapter found nothing usable;
    /// the registry moves on to the next candidate.
    fn extract(&self, page: &RawPage) -> Option<PriceSignal>;
}

/// Dispatches a page to the first claiming, successful adapter.
pub struct ExtractorRegistry {
    adapters: Vec<Box<dyn Adapter>>,
    fallback: GenericAdapter,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            adapters: vec![Box::new(StructuredDataAdapter)],
            fallback: GenericAdapter,
        }
    }

    /// Register an additional specialized adapter ahead of the built-ins.
    pub fn with_adapter(mut self, adapter: Box<dyn Adapter>) -> Self {
        self.adapters.insert(0, adapter);
        self
    }

    /// Extract a price signal from `page` fetched for `host`. Tries every
    /// claiming adapter in order, then falls back to the generic heuristic.
    /// `PARSE_MISS` when nothing yields a usable signal.
    pub fn extract(&self, host: &str, page: &RawPage) -> Result<PriceSignal, FailureKind> {
        for adapter in &self.adapters {
            if adapter.claims(host) {
                if let Some(signal) = adapter.extract(page) {
                    return Ok(signal);
                }
            }
        }
        self.fallback
            .extract(page)
            .ok_or(FailureKind::ParseMiss)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_generic_on_unclaimed_host() {
        let registry = ExtractorRegistry::new();
        let page = RawPage {
            url: "https://unknown-shop.test/p/1".into(),
            html: r#"<div class="price">$19.99</div>"#.into(),
        };
        let signal = registry.extract("unknown-shop.test", &page).unwrap();
        assert_eq!(signal.confidence, 0.4);
    }

    #[test]
    fn reports_parse_miss_when_nothing_matches() {
        let registry = ExtractorRegistry::new();
        let page = RawPage {
            url: "https://unknown-shop.test/p/1".into(),
            html: "<div>no price here</div>".into(),
        };
        assert_eq!(
            registry.extract("unknown-shop.test", &page),
            Err(FailureKind::ParseMiss)
        );
    }
}
