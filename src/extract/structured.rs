//! Structured-data adapter: schema.org `Product`/`Offer` JSON-LD blocks and,
//! failing that, common microdata/Open Graph price meta tags.

use scraper::{Html, Selector};
use serde_json::Value;

use super::{detect_currency, parse_price, Adapter, RawPage};
use crate::models::{PriceSignal, PriceSource};

pub struct StructuredDataAdapter;

const JSON_LD_CONFIDENCE: f32 = 1.0;
const MICRODATA_CONFIDENCE: f32 = 0.7;

impl Adapter for StructuredDataAdapter {
    fn id(&self) -> &str {
        "structured_data"
    }

    fn claims(&self, _host: &str) -> bool {
        // Structured data is a format, not a host-specific concern; every
        // page is eligible and the registry tries this adapter first.
        true
    }

    fn extract(&self, page: &RawPage) -> Option<PriceSignal> {
        let document = Html::parse_document(&page.html);

        if let Some(signal) = extract_json_ld(&document) {
            return Some(signal);
        }
        extract_microdata(&document)
    }
}

fn extract_json_ld(document: &Html) -> Option<PriceSignal> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if let Some(signal) = find_offer_in_json(&value) {
            return Some(signal);
        }
    }
    None
}

/// Walk a JSON-LD value looking for a `Product`/`Offer` node carrying a
/// price, handling both a bare object and a `@graph` array of nodes.
fn find_offer_in_json(value: &Value) -> Option<PriceSignal> {
    match value {
        Value::Array(items) => items.iter().find_map(find_offer_in_json),
        Value::Object(_) => {
            if let Some(graph) = value.get("@graph").and_then(Value::as_array) {
                if let Some(found) = graph.iter().find_map(find_offer_in_json) {
                    return Some(found);
                }
            }
            let offer = value.get("offers").unwrap_or(value);
            let offer = match offer {
                Value::Array(items) => items.first()?,
                other => other,
            };
            let raw_price = offer.get("price")?;
            let price_str = match raw_price {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let price = parse_price(&price_str)?;
            let currency = offer
                .get("priceCurrency")
                .and_then(Value::as_str)
                .unwrap_or("USD")
                .to_uppercase();
            let title = value
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            let in_stock = offer
                .get("availability")
                .and_then(Value::as_str)
                .map(|a| a.to_ascii_lowercase().contains("instock"));

            Some(PriceSignal {
                price,
                currency,
                title,
                in_stock,
                extracted_from: PriceSource::Http,
                adapter_id: "structured_data:json_ld".to_string(),
                confidence: JSON_LD_CONFIDENCE,
            })
        }
        _ => None,
    }
}

fn extract_microdata(document: &Html) -> Option<PriceSignal> {
    let price_selector =
        Selector::parse(r#"[itemprop="price"], meta[property="og:price:amount"]"#).ok()?;
    let currency_selector =
        Selector::parse(r#"[itemprop="priceCurrency"], meta[property="og:price:currency"]"#)
            .ok()?;
    let title_selector = Selector::parse(r#"[itemprop="name"], meta[property="og:title"]"#).ok()?;

    let price_el = document.select(&price_selector).next()?;
    let raw_price = price_el
        .value()
        .attr("content")
        .map(str::to_string)
        .unwrap_or_else(|| price_el.text().collect::<String>());
    let price = parse_price(&raw_price)?;

    let currency = document
        .select(&currency_selector)
        .next()
        .and_then(|el| {
            el.value()
                .attr("content")
                .map(str::to_string)
                .or_else(|| Some(el.text().collect::<String>()))
        })
        .unwrap_or_default();
    let currency = if currency.trim().is_empty() {
        detect_currency(&raw_price, "USD")
    } else {
        currency.to_uppercase()
    };

    let title = document.select(&title_selector).next().and_then(|el| {
        el.value()
            .attr("content")
            .map(str::to_string)
            .or_else(|| Some(el.text().collect::<String>().trim().to_string()))
    });

    Some(PriceSignal {
        price,
        currency,
        title,
        in_stock: None,
        extracted_from: PriceSource::Http,
        adapter_id: "structured_data:microdata".to_string(),
        confidence: MICRODATA_CONFIDENCE,
    })
}
