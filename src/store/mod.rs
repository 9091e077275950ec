//! Price History Store (spec §4.9) and Competitor Tracker Store (spec
//! §4.10): both SQLite-backed, both guarded by a single `parking_lot::Mutex`
//! connection following the schema/index conventions used elsewhere in this
//! codebase's storage layer (WAL mode, `busy_timeout`, covering indexes).

mod price_history;
mod tracker_store;

pub use price_history::PriceHistoryStore;
pub use tracker_store::{CompetitorTrackerStore, ScrapeUpdate};
