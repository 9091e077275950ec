//! Price-string normalization helpers shared by all adapters (spec §4.2).
//!
//! Extracted prices are scaled to two fractional digits; a value outside
//! `(0, 10_000_000]` is rejected as a parse miss.

use rust_decimal::Decimal;
use std::str::FromStr;

const MAX_PRICE: i64 = 10_000_000;

/// Parse a raw price string (with currency symbols, thousand separators, and
/// either a decimal point or decimal comma) into a two-decimal `Decimal`.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = normalize_separators(cleaned);
    let value = Decimal::from_str(&normalized).ok()?;
    let rounded = value.round_dp(2);

    if rounded <= Decimal::ZERO || rounded > Decimal::from(MAX_PRICE) {
        return None;
    }
    Some(rounded)
}

/// Normalize thousand-separator/decimal-comma locales to a plain
/// `ddd.dd`-style string digestible by `Decimal::from_str`.
fn normalize_separators(s: &str) -> String {
    let no_ws: String = s.chars().filter(|c| !c.is_whitespace()).collect();

    let last_comma = no_ws.rfind(',');
    let last_dot = no_ws.rfind('.');

    match (last_comma, last_dot) {
        (Some(c), Some(d)) => {
            // Whichever separator appears last is the decimal point; the
            // other is a thousands separator and is dropped.
            if c > d {
                no_ws.replace('.', "").replacen(',', ".", 1)
            } else {
                no_ws.replace(',', "")
            }
        }
        (Some(c), None) => {
            // A single comma: decimal separator only if exactly two digits
            // follow it (e.g. "19,90"); otherwise a thousands grouping
            // (e.g. "1,900").
            let tail = &no_ws[c + 1..];
            if tail.len() == 2 {
                no_ws.replacen(',', ".", 1)
            } else {
                no_ws.replace(',', "")
            }
        }
        (None, Some(_)) => no_ws,
        (None, None) => no_ws,
    }
}

/// Try to detect an ISO-4217 currency code from a symbol or explicit code in
/// the raw text. Falls back to `default_currency` when nothing is detected.
pub fn detect_currency(raw: &str, default_currency: &str) -> String {
    let upper = raw.to_ascii_uppercase();
    for code in ["USD", "EUR", "GBP", "CAD", "AUD", "JPY", "CHF"] {
        if upper.contains(code) {
            return code.to_string();
        }
    }
    if raw.contains('€') {
        return "EUR".to_string();
    }
    if raw.contains('£') {
        return "GBP".to_string();
    }
    if raw.contains('$') {
        return "USD".to_string();
    }
    if raw.contains('¥') {
        return "JPY".to_string();
    }
    default_currency.to_string()
}
