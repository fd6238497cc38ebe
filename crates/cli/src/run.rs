//! One change detection run.
//!
//! Load ledger, re-check stale entries, ingest new feed items, evict by age,
//! save ledger, append the change batch. Every step after the load runs even
//! when an earlier one failed; failures end up in [`RunSummary`].

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use feedwatch_client::{Extractor, Fetcher, parse_feed};
use feedwatch_core::{AppConfig, ArticleRecord, ChangedArticle, Error, FingerprintLedger, LedgerDb, fingerprint};

/// Per-run settings taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Feed to ingest; `None` skips ingestion.
    pub feed_url: Option<String>,
    /// Staleness and retention threshold.
    pub threshold: TimeDelta,
}

impl From<&AppConfig> for RunOptions {
    fn from(config: &AppConfig) -> Self {
        Self { feed_url: config.feed_url.clone(), threshold: config.threshold() }
    }
}

/// A URL that could not be fetched during the run.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub url: String,
    pub error: String,
}

/// Outcome counters of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Ledger records old enough to be re-checked.
    pub stale_checked: usize,
    /// Article pages fetched successfully.
    pub fetched: usize,
    /// New records added from the feed.
    pub inserted: usize,
    /// Articles whose text no longer matches the stored fingerprint.
    pub changed: usize,
    pub evicted: usize,
    pub retained: usize,
    /// Article fetches that failed.
    pub failed: usize,
    /// Items read from the feed, including ones already in the ledger.
    pub feed_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RunFailure>,
}

impl RunSummary {
    fn record_failure(&mut self, url: &str, err: &Error) {
        tracing::warn!(url = %url, code = err.code(), "fetch failed, skipping: {err}");
        self.failed += 1;
        self.failures.push(RunFailure { url: url.to_string(), error: err.to_string() });
    }
}

/// Change detection over one feed and one ledger database.
pub struct ChangeDetectionRun<'a> {
    fetcher: &'a dyn Fetcher,
    extractor: &'a dyn Extractor,
    db: &'a LedgerDb,
    options: RunOptions,
}

impl<'a> ChangeDetectionRun<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, extractor: &'a dyn Extractor, db: &'a LedgerDb, options: RunOptions) -> Self {
        Self { fetcher, extractor, db, options }
    }

    /// Execute the run with `now` as the reference time for every age check.
    pub async fn execute(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::default();
        let threshold = self.options.threshold;

        let records = match self.db.load_ledger().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("failed to load ledger, starting empty: {e}");
                Vec::new()
            }
        };
        let mut ledger = FingerprintLedger::from_records(records);
        tracing::info!(records = ledger.len(), "ledger loaded");

        let changes = self.recheck_stale(&ledger, now, &mut summary).await;

        if let Some(feed_url) = self.options.feed_url.as_deref()
            && let Err(e) = self.ingest_feed(feed_url, &mut ledger, &mut summary).await
        {
            tracing::warn!(url = %feed_url, "feed ingestion aborted: {e}");
            summary.feed_error = Some(e.to_string());
        }

        let outcome = ledger.evict_older_than(threshold, now);
        summary.evicted = outcome.evicted;
        summary.retained = outcome.retained.len();
        tracing::info!(evicted = outcome.evicted, retained = summary.retained, "ledger evicted");

        if let Err(e) = self.db.save_ledger(&outcome.retained).await {
            tracing::error!("failed to save ledger: {e}");
            summary.save_error = Some(e.to_string());
        }

        if !changes.is_empty() {
            match self.db.append_changes(&changes).await {
                Ok(n) => tracing::info!(appended = n, "change batch stored"),
                Err(e) => {
                    tracing::error!("failed to append change batch: {e}");
                    summary.append_error = Some(e.to_string());
                }
            }
        }

        summary
    }

    /// Fetch every stale record and collect the ones whose text changed.
    ///
    /// Stored fingerprints are left as they are.
    async fn recheck_stale(
        &self, ledger: &FingerprintLedger, now: DateTime<Utc>, summary: &mut RunSummary,
    ) -> Vec<ChangedArticle> {
        let stale = ledger.stale_records(self.options.threshold, now);
        summary.stale_checked = stale.len();
        tracing::info!(stale = stale.len(), "re-checking stale records");

        let mut changes = Vec::new();
        for record in stale {
            let text = match self.fetch_article(&record.url).await {
                Ok(text) => text,
                Err(e) => {
                    summary.record_failure(&record.url, &e);
                    continue;
                }
            };
            summary.fetched += 1;

            if fingerprint(&text) != record.fingerprint {
                tracing::info!(url = %record.url, "article changed");
                changes.push(ChangedArticle { url: record.url, body_text: text, detected_at: now });
            }
        }

        summary.changed = changes.len();
        changes
    }

    /// Insert a record for every feed item not yet in the ledger.
    ///
    /// Only a feed fetch or parse failure is returned; article failures are
    /// counted and the item is retried on a later run.
    async fn ingest_feed(
        &self, feed_url: &str, ledger: &mut FingerprintLedger, summary: &mut RunSummary,
    ) -> Result<(), Error> {
        let bytes = self.fetcher.fetch_bytes(feed_url).await?;
        let items = parse_feed(&String::from_utf8_lossy(&bytes))?;
        summary.feed_items = items.len();
        tracing::info!(url = %feed_url, items = items.len(), "feed parsed");

        for item in items {
            if ledger.contains(&item.link) {
                continue;
            }

            let text = match self.fetch_article(&item.link).await {
                Ok(text) => text,
                Err(e) => {
                    summary.record_failure(&item.link, &e);
                    continue;
                }
            };
            summary.fetched += 1;

            let record = ArticleRecord::new(item.link, fingerprint(&text), item.published_at);
            match ledger.insert(record) {
                Ok(()) => summary.inserted += 1,
                Err(e) => tracing::warn!("{e}"),
            }
        }

        Ok(())
    }

    async fn fetch_article(&self, url: &str) -> Result<String, Error> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        Ok(self.extractor.extract(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;
    use feedwatch_client::ArticleExtractor;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const FEED_URL: &str = "https://example.com/export/rss2/index.xml";
    const THREE_DAYS: i64 = 3 * 24 * 3600;

    /// Serves canned pages; any other URL fails like a 404.
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch_bytes(&self, url: &str) -> Result<Bytes, Error> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .map(|body| Bytes::from(body.clone()))
                .ok_or_else(|| Error::HttpError(format!("status 404 for {url}")))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn options(feed_url: Option<&str>) -> RunOptions {
        RunOptions { feed_url: feed_url.map(str::to_string), threshold: TimeDelta::seconds(THREE_DAYS) }
    }

    fn article(title: &str, body: &str) -> String {
        format!(
            r#"<html><body><div class="article__title">{title}</div><div class="article__body"><div class="article__text">{body}</div></div></body></html>"#
        )
    }

    fn feed(items: &[(&str, &str)]) -> String {
        let items: String = items
            .iter()
            .map(|(link, date)| format!("<item><link>{link}</link><guid>{link}</guid><pubDate>{date}</pubDate></item>"))
            .collect();
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>t</title>{items}</channel></rss>"#)
    }

    async fn execute(fetcher: &StubFetcher, db: &LedgerDb, feed_url: Option<&str>) -> RunSummary {
        let extractor = ArticleExtractor::default();
        ChangeDetectionRun::new(fetcher, &extractor, db, options(feed_url)).execute(now()).await
    }

    #[tokio::test]
    async fn test_new_item_inserted_with_pub_date() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let fetcher = StubFetcher::default()
            .with_page(FEED_URL, &feed(&[("https://example.com/a.html", "Sun, 10 Mar 2024 12:00:00 +0000")]))
            .with_page("https://example.com/a.html", &article("A", "first text"));

        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.retained, 1);

        let ledger = db.load_ledger().await.unwrap();
        assert_eq!(ledger, vec![ArticleRecord::new("https://example.com/a.html", fingerprint("A\nfirst text"), now())]);
        assert!(db.list_changes(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_changed_article_reported_and_evicted() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/a.html";
        db.save_ledger(&[ArticleRecord::new(url, 111, now() - TimeDelta::days(4))]).await.unwrap();

        let fetcher = StubFetcher::default().with_page(url, &article("A", "edited text"));
        let summary = execute(&fetcher, &db, None).await;

        assert_eq!(summary.stale_checked, 1);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.evicted, 1);
        assert!(db.load_ledger().await.unwrap().is_empty());

        let changes = db.list_changes(None).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].url, url);
        assert_eq!(changes[0].body_text, "A\nedited text");
        assert_eq!(changes[0].detected_at, now());
    }

    #[tokio::test]
    async fn test_stale_unchanged_article_evicted_silently() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/a.html";
        let record = ArticleRecord::new(url, fingerprint("A\nsame"), now() - TimeDelta::days(4));
        db.save_ledger(&[record]).await.unwrap();

        let fetcher = StubFetcher::default().with_page(url, &article("A", "same"));
        let summary = execute(&fetcher, &db, None).await;

        assert_eq!(summary.stale_checked, 1);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.evicted, 1);
        assert!(db.list_changes(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_young_record_untouched() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let record = ArticleRecord::new("https://example.com/b.html", 333, now() - TimeDelta::hours(1));
        db.save_ledger(std::slice::from_ref(&record)).await.unwrap();

        let fetcher = StubFetcher::default();
        let summary = execute(&fetcher, &db, None).await;

        assert!(fetcher.calls().is_empty());
        assert_eq!(summary.stale_checked, 0);
        assert_eq!(summary.evicted, 0);
        assert_eq!(db.load_ledger().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_record_at_threshold_evicted_without_recheck() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let record = ArticleRecord::new("https://example.com/c.html", 1, now() - TimeDelta::seconds(THREE_DAYS));
        db.save_ledger(&[record]).await.unwrap();

        let fetcher = StubFetcher::default();
        let summary = execute(&fetcher, &db, None).await;

        assert!(fetcher.calls().is_empty());
        assert_eq!(summary.stale_checked, 0);
        assert_eq!(summary.evicted, 1);
        assert!(db.load_ledger().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_fetch_failure_counted_and_still_evicted() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/gone.html";
        db.save_ledger(&[ArticleRecord::new(url, 7, now() - TimeDelta::days(5))]).await.unwrap();

        let fetcher = StubFetcher::default();
        let summary = execute(&fetcher, &db, None).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].url, url);
        assert!(summary.failures[0].error.starts_with("HTTP_ERROR"));
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.evicted, 1);
        assert!(db.load_ledger().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_parse_failure_still_saves_and_appends() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let stale = "https://example.com/old.html";
        let young = ArticleRecord::new("https://example.com/young.html", 5, now() - TimeDelta::hours(2));
        db.save_ledger(&[ArticleRecord::new(stale, 111, now() - TimeDelta::days(4)), young.clone()])
            .await
            .unwrap();

        let fetcher = StubFetcher::default()
            .with_page(FEED_URL, "<html><body>maintenance</body></html>")
            .with_page(stale, &article("Old", "rewritten"));
        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert!(summary.feed_error.as_deref().is_some_and(|e| e.starts_with("FEED_PARSE")));
        assert_eq!(summary.changed, 1);
        assert_eq!(db.load_ledger().await.unwrap(), vec![young]);
        assert_eq!(db.list_changes(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feed_fetch_failure_recorded() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let fetcher = StubFetcher::default();

        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert!(summary.feed_error.as_deref().is_some_and(|e| e.starts_with("HTTP_ERROR")));
        assert_eq!(summary.failed, 0);
        assert!(summary.save_error.is_none());
    }

    #[tokio::test]
    async fn test_new_item_fetch_failure_not_inserted() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let ok = "https://example.com/ok.html";
        let broken = "https://example.com/broken.html";
        let fetcher = StubFetcher::default()
            .with_page(
                FEED_URL,
                &feed(&[(broken, "Sun, 10 Mar 2024 10:00:00 +0000"), (ok, "Sun, 10 Mar 2024 11:00:00 +0000")]),
            )
            .with_page(ok, &article("Ok", "text"));

        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert_eq!(summary.feed_items, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.failed, 1);
        let ledger = db.load_ledger().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].url, ok);
    }

    #[tokio::test]
    async fn test_known_item_not_refetched() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/known.html";
        let record = ArticleRecord::new(url, 42, now() - TimeDelta::hours(3));
        db.save_ledger(std::slice::from_ref(&record)).await.unwrap();

        let fetcher = StubFetcher::default()
            .with_page(FEED_URL, &feed(&[(url, "Sun, 10 Mar 2024 09:00:00 +0000")]))
            .with_page(url, &article("K", "would hash differently"));
        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert_eq!(fetcher.calls(), vec![FEED_URL.to_string()]);
        assert_eq!(summary.inserted, 0);
        assert_eq!(db.load_ledger().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_bad_pub_date_inserted_then_evicted() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/undated.html";
        let fetcher = StubFetcher::default()
            .with_page(FEED_URL, &feed(&[(url, "not a date")]))
            .with_page(url, &article("U", "text"));

        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.retained, 0);
        assert!(db.load_ledger().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_feed_links_inserted_once() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let url = "https://example.com/dup.html";
        let fetcher = StubFetcher::default()
            .with_page(
                FEED_URL,
                &feed(&[(url, "Sun, 10 Mar 2024 10:00:00 +0000"), (url, "Sun, 10 Mar 2024 11:00:00 +0000")]),
            )
            .with_page(url, &article("D", "text"));

        let summary = execute(&fetcher, &db, Some(FEED_URL)).await;

        assert_eq!(summary.inserted, 1);
        assert_eq!(fetcher.calls(), vec![FEED_URL.to_string(), url.to_string()]);
        let ledger = db.load_ledger().await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].observed_at, Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_retained_records_saved_oldest_first() {
        let db = LedgerDb::open_in_memory().await.unwrap();
        let fetcher = StubFetcher::default()
            .with_page(
                FEED_URL,
                &feed(&[
                    ("https://example.com/late.html", "Sun, 10 Mar 2024 11:00:00 +0000"),
                    ("https://example.com/early.html", "Sat, 09 Mar 2024 11:00:00 +0000"),
                ]),
            )
            .with_page("https://example.com/late.html", &article("L", "late"))
            .with_page("https://example.com/early.html", &article("E", "early"));

        execute(&fetcher, &db, Some(FEED_URL)).await;

        let urls: Vec<String> = db.load_ledger().await.unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://example.com/early.html", "https://example.com/late.html"]);
    }

    #[test]
    fn test_run_options_from_config() {
        let config = AppConfig { feed_url: Some(FEED_URL.into()), threshold_secs: 60, ..Default::default() };
        let options = RunOptions::from(&config);
        assert_eq!(options.feed_url.as_deref(), Some(FEED_URL));
        assert_eq!(options.threshold, TimeDelta::seconds(60));
    }

    #[test]
    fn test_summary_json_omits_empty_fields() {
        let json = serde_json::to_value(RunSummary { inserted: 2, ..Default::default() }).unwrap();
        assert_eq!(json["inserted"], 2);
        assert!(json.get("feed_error").is_none());
        assert!(json.get("failures").is_none());
    }
}
