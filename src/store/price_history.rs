use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::{PricePoint, PriceSource};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL,
    tracker_id TEXT NOT NULL,
    competitor_name TEXT NOT NULL,
    price TEXT NOT NULL,
    currency TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    source TEXT NOT NULL,
    adapter_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_history_tracker_captured
    ON price_history(tracker_id, captured_at ASC);

CREATE INDEX IF NOT EXISTS idx_price_history_product_captured
    ON price_history(product_id, captured_at ASC);
"#;

/// Append-only observation log. No update/delete exists on the public
/// contract — the only way to shrink it is the explicit `compact` operation,
/// which lives outside the write path (spec §4.9 Integrity).
pub struct PriceHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl PriceHistoryStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open price history db at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize price history schema")?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Append a price point. Never fails on a duplicate `captured_at` —
    /// ties are acceptable, ordering among them is stable per call but
    /// otherwise unspecified.
    pub fn append(&self, point: &PricePoint) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO price_history (
                product_id, tracker_id, competitor_name, price, currency,
                captured_at, source, adapter_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                point.product_id,
                point.tracker_id,
                point.competitor_name,
                point.price.to_string(),
                point.currency,
                point.captured_at.to_rfc3339(),
                point.source.as_str(),
                point.adapter_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn range(&self, tracker_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PricePoint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, product_id, tracker_id, competitor_name, price, currency,
                    captured_at, source, adapter_id
             FROM price_history
             WHERE tracker_id = ?1 AND captured_at >= ?2 AND captured_at <= ?3
             ORDER BY captured_at ASC",
        )?;
        let rows = stmt
            .query_map(params![tracker_id, from.to_rfc3339(), to.to_rfc3339()], row_to_point)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    pub fn latest(&self, tracker_id: &str) -> Result<Option<PricePoint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, product_id, tracker_id, competitor_name, price, currency,
                    captured_at, source, adapter_id
             FROM price_history
             WHERE tracker_id = ?1
             ORDER BY captured_at DESC, id DESC
             LIMIT 1",
        )?;
        let point = stmt.query_row(params![tracker_id], row_to_point).ok();
        Ok(point)
    }

    pub fn history_for_product(&self, product_id: &str, days: i64) -> Result<Vec<PricePoint>> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() - chrono::Duration::days(days.max(0))).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id, product_id, tracker_id, competitor_name, price, currency,
                    captured_at, source, adapter_id
             FROM price_history
             WHERE product_id = ?1 AND captured_at >= ?2
             ORDER BY captured_at ASC",
        )?;
        let rows = stmt
            .query_map(params![product_id, cutoff], row_to_point)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    /// Delete observations captured before `before`. The only operation on
    /// this store that removes rows, and it is never called from the write
    /// path (spec §9 Open Question 1).
    pub fn compact(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM price_history WHERE captured_at < ?1",
            params![before.to_rfc3339()],
        )?;
        Ok(deleted)
    }
}

fn row_to_point(row: &rusqlite::Row) -> rusqlite::Result<PricePoint> {
    let price_str: String = row.get(4)?;
    let captured_at: String = row.get(6)?;
    let source: String = row.get(7)?;

    Ok(PricePoint {
        id: row.get(0)?,
        product_id: row.get(1)?,
        tracker_id: row.get(2)?,
        competitor_name: row.get(3)?,
        price: Decimal::from_str(&price_str).unwrap_or_default(),
        currency: row.get(5)?,
        captured_at: DateTime::parse_from_rfc3339(&captured_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        source: PriceSource::parse(&source),
        adapter_id: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_point(tracker_id: &str, product_id: &str, price: Decimal, captured_at: DateTime<Utc>) -> PricePoint {
        PricePoint {
            id: 0,
            product_id: product_id.into(),
            tracker_id: tracker_id.into(),
            competitor_name: "Acme".into(),
            price,
            currency: "USD".into(),
            captured_at,
            source: PriceSource::Http,
            adapter_id: "structured_data:json_ld".into(),
        }
    }

    #[test]
    fn append_then_latest_roundtrips() {
        let store = PriceHistoryStore::open(":memory:").unwrap();
        let now = Utc::now();
        store.append(&make_point("t1", "p1", dec!(19.99), now)).unwrap();
        let latest = store.latest("t1").unwrap().unwrap();
        assert_eq!(latest.price, dec!(19.99));
    }

    #[test]
    fn range_is_ordered_ascending() {
        let store = PriceHistoryStore::open(":memory:").unwrap();
        let t0 = Utc::now() - chrono::Duration::hours(2);
        let t1 = Utc::now() - chrono::Duration::hours(1);
        let t2 = Utc::now();
        store.append(&make_point("t1", "p1", dec!(30.00), t2)).unwrap();
        store.append(&make_point("t1", "p1", dec!(10.00), t0)).unwrap();
        store.append(&make_point("t1", "p1", dec!(20.00), t1)).unwrap();

        let history = store.range("t1", t0 - chrono::Duration::minutes(1), t2 + chrono::Duration::minutes(1)).unwrap();
        let prices: Vec<Decimal> = history.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![dec!(10.00), dec!(20.00), dec!(30.00)]);
    }

    #[test]
    fn duplicate_timestamps_both_append() {
        let store = PriceHistoryStore::open(":memory:").unwrap();
        let t = Utc::now();
        store.append(&make_point("t1", "p1", dec!(10.00), t)).unwrap();
        store.append(&make_point("t1", "p1", dec!(11.00), t)).unwrap();
        let history = store.range("t1", t - chrono::Duration::minutes(1), t + chrono::Duration::minutes(1)).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn compact_removes_only_old_rows() {
        let store = PriceHistoryStore::open(":memory:").unwrap();
        let old = Utc::now() - chrono::Duration::days(30);
        let recent = Utc::now();
        store.append(&make_point("t1", "p1", dec!(10.00), old)).unwrap();
        store.append(&make_point("t1", "p1", dec!(20.00), recent)).unwrap();

        let deleted = store.compact(Utc::now() - chrono::Duration::days(1)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.latest("t1").unwrap().unwrap().price, dec!(20.00));
    }

    #[test]
    fn history_for_product_filters_by_window() {
        let store = PriceHistoryStore::open(":memory:").unwrap();
        let old = Utc::now() - chrono::Duration::days(10);
        let recent = Utc::now();
        store.append(&make_point("t1", "p1", dec!(10.00), old)).unwrap();
        store.append(&make_point("t2", "p1", dec!(20.00), recent)).unwrap();

        let history = store.history_for_product("p1", 7).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, dec!(20.00));
    }
}
