//! Fingerprint ledger: one record per known article URL.
//!
//! The ledger holds the fingerprint of each article's text together with the
//! time its age is measured from (the article's publication time). A run loads
//! it once, re-checks stale entries, inserts new feed items, evicts by age and
//! saves the result back through [`crate::LedgerDb`].

pub mod fingerprint;

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

pub use fingerprint::fingerprint;

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Feed item link, used verbatim as the identity key.
    pub url: String,
    /// Fingerprint of the article text when first observed.
    pub fingerprint: u32,
    /// Age basis: the article's publication time.
    pub observed_at: DateTime<Utc>,
}

impl ArticleRecord {
    pub fn new(url: impl Into<String>, fingerprint: u32, observed_at: DateTime<Utc>) -> Self {
        Self { url: url.into(), fingerprint, observed_at }
    }

    /// Age of the record at `now`. Negative for timestamps in the future.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.observed_at)
    }
}

/// An article whose text no longer matches its stored fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedArticle {
    pub url: String,
    /// Freshly extracted text at detection time.
    pub body_text: String,
    pub detected_at: DateTime<Utc>,
}

/// Result of [`FingerprintLedger::evict_older_than`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Records younger than the threshold, oldest first.
    pub retained: Vec<ArticleRecord>,
    /// Number of records dropped.
    pub evicted: usize,
}

/// In-memory ledger keyed by URL.
///
/// Keeps insertion order; at most one record per URL.
#[derive(Debug, Clone, Default)]
pub struct FingerprintLedger {
    records: Vec<ArticleRecord>,
    index: HashMap<String, usize>,
}

impl FingerprintLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from persisted records.
    ///
    /// When a URL appears more than once only its first record is kept.
    pub fn from_records(records: impl IntoIterator<Item = ArticleRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            if let Err(e) = ledger.insert(record) {
                tracing::warn!("dropping duplicate ledger entry: {e}");
            }
        }
        ledger
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&ArticleRecord> {
        self.index.get(url).map(|&i| &self.records[i])
    }

    /// Insert a record for a URL not yet in the ledger.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateRecord` if the URL is already present; the
    /// existing record is left untouched.
    pub fn insert(&mut self, record: ArticleRecord) -> Result<(), Error> {
        if self.index.contains_key(&record.url) {
            return Err(Error::DuplicateRecord(record.url));
        }
        self.index.insert(record.url.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Records whose age strictly exceeds `threshold`, in ledger order.
    pub fn stale_records(&self, threshold: TimeDelta, now: DateTime<Utc>) -> Vec<ArticleRecord> {
        self.records
            .iter()
            .filter(|r| r.age(now) > threshold)
            .cloned()
            .collect()
    }

    /// Drop every record whose age is at least `threshold`.
    ///
    /// Age alone decides: a record flagged as changed in this run is evicted
    /// like any other. The retained records come back sorted by
    /// `observed_at`, oldest first, keeping ledger order for equal times.
    pub fn evict_older_than(self, threshold: TimeDelta, now: DateTime<Utc>) -> EvictionOutcome {
        let total = self.records.len();
        let mut retained: Vec<ArticleRecord> = self
            .records
            .into_iter()
            .filter(|r| r.age(now) < threshold)
            .collect();
        retained.sort_by_key(|r| r.observed_at);

        EvictionOutcome { evicted: total - retained.len(), retained }
    }

    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
