use std::sync::Arc;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::models::{CompetitorTracker, TrackerStatus};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS trackers (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    competitor_name TEXT NOT NULL,
    raw_url TEXT NOT NULL,
    canonical_url TEXT NOT NULL,
    active INTEGER NOT NULL,
    last_price TEXT,
    last_currency TEXT,
    last_checked_at TEXT,
    last_status TEXT NOT NULL,
    failure_streak INTEGER NOT NULL,
    interval_override_secs INTEGER,
    in_flight_until TEXT,
    version INTEGER NOT NULL,
    UNIQUE(product_id, canonical_url)
);

CREATE INDEX IF NOT EXISTS idx_trackers_product
    ON trackers(product_id);
"#;

/// The outcome a Worker Pool wants reflected onto a tracker after running
/// the Scrape Executor (spec §4.8).
pub enum ScrapeUpdate {
    Success { price: Decimal, currency: String },
    Failure { status: TrackerStatus },
}

/// Mutable per-tracker state, CAS'd on `version` so concurrent worker
/// updates to the same tracker never silently overwrite each other
/// (spec §5).
pub struct CompetitorTrackerStore {
    conn: Arc<Mutex<Connection>>,
}

impl CompetitorTrackerStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open tracker store db at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize tracker store schema")?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Create a tracker for `(product_id, canonical_url)`, or return the
    /// existing one. Returns `(tracker, created)`.
    pub fn create_or_get(&self, tracker: CompetitorTracker) -> Result<(CompetitorTracker, bool)> {
        let conn = self.conn.lock();

        if let Some(existing) = query_by_natural_key(&conn, &tracker.product_id, &tracker.canonical_url)? {
            return Ok((existing, false));
        }

        conn.execute(
            "INSERT INTO trackers (
                id, product_id, competitor_name, raw_url, canonical_url, active,
                last_price, last_currency, last_checked_at, last_status,
                failure_streak, interval_override_secs, in_flight_until, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, 0)",
            params![
                tracker.id,
                tracker.product_id,
                tracker.competitor_name,
                tracker.raw_url,
                tracker.canonical_url,
                tracker.active,
                tracker.last_price.map(|d| d.to_string()),
                tracker.last_currency,
                tracker.last_checked_at.map(|t| t.to_rfc3339()),
                tracker.last_status.as_str(),
                tracker.failure_streak,
                tracker.interval_override_secs,
            ],
        )?;

        let created = query_by_natural_key(&conn, &tracker.product_id, &tracker.canonical_url)?
            .expect("row was just inserted");
        Ok((created, true))
    }

    pub fn get(&self, id: &str) -> Result<Option<CompetitorTracker>> {
        let conn = self.conn.lock();
        let tracker = conn
            .query_row(&select_sql("WHERE id = ?1"), params![id], row_to_tracker)
            .optional()?;
        Ok(tracker)
    }

    /// Apply a scrape outcome with compare-and-set on `version`. `Ok(false)`
    /// means `expected_version` was stale; the caller should reload and
    /// decide whether to retry.
    pub fn update_after_scrape(
        &self,
        tracker_id: &str,
        expected_version: i64,
        update: ScrapeUpdate,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        let changed = match update {
            ScrapeUpdate::Success { price, currency } => conn.execute(
                "UPDATE trackers SET
                    last_price = ?1, last_currency = ?2, last_checked_at = ?3,
                    last_status = 'OK', failure_streak = 0,
                    in_flight_until = NULL, version = version + 1
                 WHERE id = ?4 AND version = ?5",
                params![price.to_string(), currency, now, tracker_id, expected_version],
            )?,
            ScrapeUpdate::Failure { status } => conn.execute(
                "UPDATE trackers SET
                    last_checked_at = ?1, last_status = ?2, failure_streak = failure_streak + 1,
                    in_flight_until = NULL, version = version + 1
                 WHERE id = ?3 AND version = ?4",
                params![now, status.as_str(), tracker_id, expected_version],
            )?,
        };

        Ok(changed > 0)
    }

    /// Short-TTL marker preventing the scheduler from double-enqueuing a job
    /// for a tracker that already has one outstanding (spec §4.6).
    pub fn mark_in_flight(&self, tracker_id: &str, ttl: Duration) -> Result<()> {
        let conn = self.conn.lock();
        let until = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).to_rfc3339();
        conn.execute("UPDATE trackers SET in_flight_until = ?1 WHERE id = ?2", params![until, tracker_id])?;
        Ok(())
    }

    pub fn clear_in_flight(&self, tracker_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE trackers SET in_flight_until = NULL WHERE id = ?1", params![tracker_id])?;
        Ok(())
    }

    /// Trackers due for a scrape: active, not `DEAD`, past their effective
    /// interval (per-tracker override wins over `default_interval_secs`),
    /// and without a live in-flight marker.
    pub fn list_due(&self, default_interval_secs: i64) -> Result<Vec<CompetitorTracker>> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let mut stmt = conn.prepare(&format!(
            "{}
             WHERE active = 1 AND last_status != 'DEAD'
               AND (in_flight_until IS NULL OR in_flight_until < ?1)
               AND (
                 last_checked_at IS NULL
                 OR (julianday(?1) - julianday(last_checked_at)) * 86400.0
                    >= COALESCE(interval_override_secs, ?2)
               )",
            select_sql("")
        ))?;

        let rows = stmt
            .query_map(params![now_str, default_interval_secs], row_to_tracker)?
            .filter_map(Result::ok)
            .collect();
        Ok(rows)
    }

    /// Mark a tracker `DEAD`, stopping further scheduling (spec §4.6
    /// Terminal tracker rule).
    pub fn mark_dead(&self, tracker_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE trackers SET last_status = 'DEAD' WHERE id = ?1", params![tracker_id])?;
        Ok(())
    }

    /// Clear `DEAD` and reset the failure streak — a human action or a
    /// successful manual scrape.
    pub fn revive(&self, tracker_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE trackers SET last_status = 'NEW', failure_streak = 0 WHERE id = ?1",
            params![tracker_id],
        )?;
        Ok(())
    }

    pub fn list_for_product(&self, product_id: &str) -> Result<Vec<CompetitorTracker>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE product_id = ?1", select_sql("")))?;
        let rows = stmt.query_map(params![product_id], row_to_tracker)?.filter_map(Result::ok).collect();
        Ok(rows)
    }

    pub fn list_dead(&self) -> Result<Vec<CompetitorTracker>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{} WHERE last_status = 'DEAD'", select_sql("")))?;
        let rows = stmt.query_map([], row_to_tracker)?.filter_map(Result::ok).collect();
        Ok(rows)
    }
}

fn select_sql(suffix: &str) -> String {
    format!(
        "SELECT id, product_id, competitor_name, raw_url, canonical_url, active,
                last_price, last_currency, last_checked_at, last_status,
                failure_streak, interval_override_secs, version
         FROM trackers {suffix}"
    )
}

fn query_by_natural_key(conn: &Connection, product_id: &str, canonical_url: &str) -> Result<Option<CompetitorTracker>> {
    let tracker = conn
        .query_row(
            &select_sql("WHERE product_id = ?1 AND canonical_url = ?2"),
            params![product_id, canonical_url],
            row_to_tracker,
        )
        .optional()?;
    Ok(tracker)
}

fn row_to_tracker(row: &rusqlite::Row) -> rusqlite::Result<CompetitorTracker> {
    let last_price: Option<String> = row.get(6)?;
    let last_checked_at: Option<String> = row.get(8)?;
    let last_status: String = row.get(9)?;

    Ok(CompetitorTracker {
        id: row.get(0)?,
        product_id: row.get(1)?,
        competitor_name: row.get(2)?,
        raw_url: row.get(3)?,
        canonical_url: row.get(4)?,
        active: row.get(5)?,
        last_price: last_price.and_then(|s| Decimal::from_str(&s).ok()),
        last_currency: row.get(7)?,
        last_checked_at: last_checked_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|dt| dt.with_timezone(&Utc))
        }),
        last_status: TrackerStatus::parse(&last_status),
        failure_streak: row.get(10)?,
        interval_override_secs: row.get(11)?,
        version: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_tracker(product_id: &str, canonical_url: &str) -> CompetitorTracker {
        CompetitorTracker::new(
            uuid::Uuid::new_v4().to_string(),
            product_id.into(),
            "Acme".into(),
            canonical_url.into(),
            canonical_url.into(),
        )
    }

    #[test]
    fn create_or_get_is_idempotent_on_natural_key() {
        let store = CompetitorTrackerStore::open(":memory:").unwrap();
        let (a, created_a) = store.create_or_get(make_tracker("p1", "https://shop.test/p/1")).unwrap();
        let (b, created_b) = store.create_or_get(make_tracker("p1", "https://shop.test/p/1")).unwrap();
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn update_after_scrape_success_resets_failure_streak() {
        let store = CompetitorTrackerStore::open(":memory:").unwrap();
        let (tracker, _) = store.create_or_get(make_tracker("p1", "https://shop.test/p/1")).unwrap();

        let ok = store
            .update_after_scrape(&tracker.id, tracker.version, ScrapeUpdate::Failure { status: TrackerStatus::NetworkError })
            .unwrap();
        assert!(ok);
        let reloaded = store.get(&tracker.id).unwrap().unwrap();
        assert_eq!(reloaded.failure_streak, 1);
        assert_eq!(reloaded.version, tracker.version + 1);

        let ok = store
            .update_after_scrape(&reloaded.id, reloaded.version, ScrapeUpdate::Success { price: dec!(19.99), currency: "USD".into() })
            .unwrap();
        assert!(ok);
        let reloaded = store.get(&tracker.id).unwrap().unwrap();
        assert_eq!(reloaded.failure_streak, 0);
        assert_eq!(reloaded.last_status, TrackerStatus::Ok);
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = CompetitorTrackerStore::open(":memory:").unwrap();
        let (tracker, _) = store.create_or_get(make_tracker("p1", "https://shop.test/p/1")).unwrap();

        store
            .update_after_scrape(&tracker.id, tracker.version, ScrapeUpdate::Success { price: dec!(19.99), currency: "USD".into() })
            .unwrap();

        let stale = store
            .update_after_scrape(&tracker.id, tracker.version, ScrapeUpdate::Success { price: dec!(29.99), currency: "USD".into() })
            .unwrap();
        assert!(!stale);
    }

    #[test]
    fn list_due_respects_per_tracker_interval_override() {
        let store = CompetitorTrackerStore::open(":memory:").unwrap();
        let mut overridden = make_tracker("p1", "https://shop.test/p/1");
        overridden.interval_override_secs = Some(999_999);
        let (overridden, _) = store.create_or_get(overridden).unwrap();
        store
            .update_after_scrape(&overridden.id, overridden.version, ScrapeUpdate::Success { price: dec!(1.00), currency: "USD".into() })
            .unwrap();

        let (never_checked, _) = store.create_or_get(make_tracker("p2", "https://shop.test/p/2")).unwrap();

        let due = store.list_due(3600).unwrap();
        let due_ids: Vec<String> = due.iter().map(|t| t.id.clone()).collect();
        assert!(due_ids.contains(&never_checked.id));
        assert!(!due_ids.contains(&overridden.id));
    }

    #[test]
    fn in_flight_marker_excludes_tracker_from_due_list() {
        let store = CompetitorTrackerStore::open(":memory:").unwrap();
        let (tracker, _) = store.create_or_get(make_tracker("p1", "https://shop.test/p/1")).unwrap();
        store.mark_in_flight(&tracker.id, Duration::from_secs(300)).unwrap();

        let due = store.list_due(1).unwrap();
        assert!(due.is_empty());
    }
}
