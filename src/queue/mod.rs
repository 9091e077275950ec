//! Job Queue & DLQ (spec §4.5): a durable `READY -> RESERVED ->
//! (ACKED | REQUEUED | DLQ)` state machine backed by SQLite.
//!
//! A single connection guarded by `parking_lot::Mutex` is enough here: unlike
//! a multi-writer Postgres queue, SQLite plus the mutex already serializes
//! every reserve/ack/nack, so there is no `FOR UPDATE SKIP LOCKED` to adapt —
//! reserve just reads the next eligible row and updates it before releasing
//! the lock.

mod backoff;

pub use backoff::BackoffCalculator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::FailureKind;
use crate::models::{JobOrigin, ScrapeJob};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS scrape_jobs (
    id TEXT PRIMARY KEY,
    tracker_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    url TEXT NOT NULL,
    allow_browser_fallback INTEGER NOT NULL,
    attempt INTEGER NOT NULL,
    max_attempts INTEGER NOT NULL,
    enqueued_at TEXT NOT NULL,
    not_before TEXT,
    origin TEXT NOT NULL,
    state TEXT NOT NULL,
    reserved_by TEXT,
    reserved_until TEXT,
    dlq_reason TEXT,
    dlq_detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_scrape_jobs_ready
    ON scrape_jobs(state, not_before, enqueued_at);

CREATE INDEX IF NOT EXISTS idx_scrape_jobs_tracker
    ON scrape_jobs(tracker_id);
"#;

/// An entry sitting in the dead-letter queue, inspectable but never
/// automatically retried (spec §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct DlqEntry {
    pub job: ScrapeJob,
    pub reason: FailureKind,
    pub detail: String,
}

pub struct JobQueue {
    conn: Arc<Mutex<Connection>>,
    backoff: BackoffCalculator,
}

impl JobQueue {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open job queue db at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize job queue schema")?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), backoff: BackoffCalculator::new() })
    }

    pub fn enqueue(&self, job: &ScrapeJob) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scrape_jobs (
                id, tracker_id, product_id, url, allow_browser_fallback,
                attempt, max_attempts, enqueued_at, not_before, origin, state
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'READY')",
            params![
                job.id,
                job.tracker_id,
                job.product_id,
                job.url,
                job.allow_browser_fallback,
                job.attempt,
                job.max_attempts,
                job.enqueued_at.to_rfc3339(),
                job.not_before.map(|t| t.to_rfc3339()),
                job.origin.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Reserve the oldest eligible job: `READY` and past its `not_before`, or
    /// `RESERVED` with an expired visibility timeout (crash recovery).
    pub fn reserve(&self, worker_id: &str, visibility_timeout: Duration) -> Result<Option<ScrapeJob>> {
        let conn = self.conn.lock();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let mut stmt = conn.prepare(
            "SELECT id, tracker_id, product_id, url, allow_browser_fallback,
                    attempt, max_attempts, enqueued_at, not_before, origin
             FROM scrape_jobs
             WHERE (state = 'READY' OR (state = 'RESERVED' AND reserved_until < ?1))
               AND (not_before IS NULL OR not_before <= ?1)
             ORDER BY enqueued_at ASC
             LIMIT 1",
        )?;

        let job = stmt.query_row(params![now_str], row_to_job).optional()?;

        let Some(job) = job else { return Ok(None) };

        let reserved_until = (now + chrono::Duration::from_std(visibility_timeout).unwrap_or_default())
            .to_rfc3339();
        conn.execute(
            "UPDATE scrape_jobs SET state = 'RESERVED', reserved_by = ?1, reserved_until = ?2 WHERE id = ?3",
            params![worker_id, reserved_until, job.id],
        )?;

        Ok(Some(job))
    }

    pub fn ack(&self, job_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE scrape_jobs SET state = 'ACKED' WHERE id = ?1", params![job_id])?;
        Ok(())
    }

    /// Requeue after a failure with the retry delay computed by the caller
    /// (spec §4.5's SoftFail/HardFail-retryable policy lives in the Worker
    /// Pool, which picks the backoff cap; this just applies it).
    pub fn nack(&self, job_id: &str, next_delay: Duration) -> Result<()> {
        let conn = self.conn.lock();
        let not_before = (Utc::now() + chrono::Duration::from_std(next_delay).unwrap_or_default())
            .to_rfc3339();
        conn.execute(
            "UPDATE scrape_jobs SET state = 'READY', attempt = attempt + 1,
                not_before = ?1, reserved_by = NULL, reserved_until = NULL
             WHERE id = ?2",
            params![not_before, job_id],
        )?;
        Ok(())
    }

    pub fn move_to_dlq(&self, job_id: &str, reason: FailureKind, detail: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE scrape_jobs SET state = 'DLQ', dlq_reason = ?1, dlq_detail = ?2,
                reserved_by = NULL, reserved_until = NULL
             WHERE id = ?3",
            params![reason.as_str(), detail, job_id],
        )?;
        Ok(())
    }

    pub fn list_dlq(&self) -> Result<Vec<DlqEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tracker_id, product_id, url, allow_browser_fallback,
                    attempt, max_attempts, enqueued_at, not_before, origin,
                    dlq_reason, dlq_detail
             FROM scrape_jobs WHERE state = 'DLQ' ORDER BY enqueued_at DESC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                let job = row_to_job(row)?;
                let reason_str: String = row.get(10)?;
                let detail: String = row.get(11)?;
                Ok(DlqEntry { job, reason: parse_failure_kind(&reason_str), detail })
            })?
            .filter_map(Result::ok)
            .collect();
        Ok(entries)
    }

    /// Compute the next retry delay for `attempt` using a caller-selected cap
    /// (SoftFail uses `max_backoff`; retryable HardFail uses a smaller cap).
    pub fn compute_backoff(&self, attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
        self.backoff.next_delay(attempt, base_ms, max_ms, 0.2)
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ScrapeJob> {
    let enqueued_at: String = row.get(7)?;
    let not_before: Option<String> = row.get(8)?;
    let origin: String = row.get(9)?;

    Ok(ScrapeJob {
        id: row.get(0)?,
        tracker_id: row.get(1)?,
        product_id: row.get(2)?,
        url: row.get(3)?,
        allow_browser_fallback: row.get(4)?,
        attempt: row.get(5)?,
        max_attempts: row.get(6)?,
        enqueued_at: parse_rfc3339(&enqueued_at),
        not_before: not_before.map(|s| parse_rfc3339(&s)),
        origin: JobOrigin::parse(&origin),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn parse_failure_kind(s: &str) -> FailureKind {
    match s {
        "TIMEOUT" => FailureKind::Timeout,
        "NETWORK_ERROR" => FailureKind::NetworkError,
        "HTTP_STATUS" => FailureKind::HttpStatus,
        "PARSE_MISS" => FailureKind::ParseMiss,
        "ROBOTS_DENY" => FailureKind::RobotsDeny,
        "RATE_LIMITED" => FailureKind::RateLimited,
        "BLOCKED" => FailureKind::Blocked,
        "BROWSER_ERROR" => FailureKind::BrowserError,
        "DOMAIN_BLOCKED" => FailureKind::DomainBlocked,
        _ => FailureKind::InvalidUrl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobOrigin;

    fn make_job(id: &str) -> ScrapeJob {
        ScrapeJob {
            id: id.into(),
            tracker_id: "tracker-1".into(),
            product_id: "product-1".into(),
            url: "https://shop.test/p/1".into(),
            allow_browser_fallback: true,
            attempt: 1,
            max_attempts: 3,
            enqueued_at: Utc::now(),
            not_before: None,
            origin: JobOrigin::Manual,
        }
    }

    #[test]
    fn reserve_returns_oldest_ready_job() {
        let queue = JobQueue::open(":memory:").unwrap();
        queue.enqueue(&make_job("job-1")).unwrap();
        let job = queue.reserve("worker-1", Duration::from_secs(30)).unwrap().unwrap();
        assert_eq!(job.id, "job-1");
        assert!(queue.reserve("worker-2", Duration::from_secs(30)).unwrap().is_none());
    }

    #[test]
    fn expired_reservation_becomes_visible_again() {
        let queue = JobQueue::open(":memory:").unwrap();
        queue.enqueue(&make_job("job-1")).unwrap();
        queue.reserve("worker-1", Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let job = queue.reserve("worker-2", Duration::from_secs(30)).unwrap();
        assert!(job.is_some());
    }

    #[test]
    fn nack_requeues_with_incremented_attempt() {
        let queue = JobQueue::open(":memory:").unwrap();
        queue.enqueue(&make_job("job-1")).unwrap();
        let job = queue.reserve("worker-1", Duration::from_secs(30)).unwrap().unwrap();
        queue.nack(&job.id, Duration::from_millis(0)).unwrap();
        let requeued = queue.reserve("worker-2", Duration::from_secs(30)).unwrap().unwrap();
        assert_eq!(requeued.attempt, 2);
    }

    #[test]
    fn ack_removes_job_from_ready_pool() {
        let queue = JobQueue::open(":memory:").unwrap();
        queue.enqueue(&make_job("job-1")).unwrap();
        let job = queue.reserve("worker-1", Duration::from_secs(30)).unwrap().unwrap();
        queue.ack(&job.id).unwrap();
        assert!(queue.reserve("worker-2", Duration::from_secs(30)).unwrap().is_none());
    }

    #[test]
    fn dlq_entries_are_inspectable_and_not_requeued() {
        let queue = JobQueue::open(":memory:").unwrap();
        queue.enqueue(&make_job("job-1")).unwrap();
        let job = queue.reserve("worker-1", Duration::from_secs(30)).unwrap().unwrap();
        queue.move_to_dlq(&job.id, FailureKind::DomainBlocked, "blocked by allowlist").unwrap();

        assert!(queue.reserve("worker-2", Duration::from_secs(30)).unwrap().is_none());
        let dlq = queue.list_dlq().unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].reason, FailureKind::DomainBlocked);
    }
}
