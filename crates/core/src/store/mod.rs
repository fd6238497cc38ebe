//! SQLite-backed storage for the fingerprint ledger and change batches.
//!
//! Uses tokio-rusqlite for async access. It supports:
//!
//! - Whole-ledger replacement inside a single transaction
//! - Append-only change batches
//! - Automatic schema migrations

pub mod changes;
pub mod connection;
pub mod migrations;
pub mod records;

pub use crate::Error;

pub use connection::LedgerDb;

use chrono::{DateTime, Utc};

/// Timestamps are stored as whole unix seconds.
pub(crate) fn to_unix(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
