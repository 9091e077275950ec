//! Generic heuristic adapter: last-resort extraction for hosts with no
//! structured data and no dedicated adapter. Confidence is capped low (0.4)
//! because it has no host-specific knowledge to lean on.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use super::{detect_currency, parse_price, Adapter, RawPage};
use crate::models::{PriceSignal, PriceSource};

pub struct GenericAdapter;

const CONFIDENCE: f32 = 0.4;

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:[$€£¥]|USD|EUR|GBP)\s?\d[\d.,]*\d|\d[\d.,]*\d\s?(?:USD|EUR|GBP|\$)")
            .expect("static pattern is valid")
    })
}

impl Adapter for GenericAdapter {
    fn id(&self) -> &str {
        "generic_heuristic"
    }

    fn claims(&self, _host: &str) -> bool {
        true
    }

    fn extract(&self, page: &RawPage) -> Option<PriceSignal> {
        let document = Html::parse_document(&page.html);

        if let Some(signal) = extract_from_price_labeled_elements(&document) {
            return Some(signal);
        }
        extract_from_full_text(&document)
    }
}

/// Prefer text inside elements whose `class`/`id` mentions "price" — far more
/// likely to be the listing price than an arbitrary number on the page.
fn extract_from_price_labeled_elements(document: &Html) -> Option<PriceSignal> {
    let selector = Selector::parse("*").ok()?;
    for el in document.select(&selector) {
        let is_price_labeled = ["class", "id"].iter().any(|attr| {
            el.value()
                .attr(attr)
                .map(|v| v.to_ascii_lowercase().contains("price"))
                .unwrap_or(false)
        });
        if !is_price_labeled {
            continue;
        }
        let text: String = el.text().collect();
        if let Some(signal) = parse_candidate(&text) {
            return Some(signal);
        }
    }
    None
}

fn extract_from_full_text(document: &Html) -> Option<PriceSignal> {
    let text: String = document.root_element().text().collect();
    parse_candidate(&text)
}

fn parse_candidate(text: &str) -> Option<PriceSignal> {
    let matched = price_pattern().find(text)?.as_str();
    let price = parse_price(matched)?;
    let currency = detect_currency(matched, "USD");

    Some(PriceSignal {
        price,
        currency,
        title: None,
        in_stock: None,
        extracted_from: PriceSource::Http,
        adapter_id: "generic_heuristic".to_string(),
        confidence: CONFIDENCE,
    })
}
