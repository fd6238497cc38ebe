//! Change-batch storage.
//!
//! Append-only: runs add batches, nothing here deletes them. External
//! consumers read them back with [`LedgerDb::list_changes`].

use super::connection::LedgerDb;
use super::{from_unix, to_unix};
use crate::{ChangedArticle, Error};
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;

impl LedgerDb {
    /// Append a change batch.
    ///
    /// Returns the number of rows written.
    pub async fn append_changes(&self, changes: &[ChangedArticle]) -> Result<u64, Error> {
        let changes = changes.to_vec();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let mut written = 0u64;
                {
                    let mut stmt =
                        tx.prepare("INSERT INTO changed_articles (url, body_text, detected_at) VALUES (?1, ?2, ?3)")?;
                    for change in &changes {
                        written += stmt.execute(params![&change.url, &change.body_text, to_unix(&change.detected_at)])?
                            as u64;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await
            .map_err(Error::from)
    }

    /// List stored changes in the order they were appended.
    ///
    /// With `since`, only changes detected at or after that instant.
    pub async fn list_changes(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ChangedArticle>, Error> {
        let since = since.as_ref().map(to_unix).unwrap_or(i64::MIN);
        self.conn
            .call(move |conn| -> Result<Vec<ChangedArticle>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, body_text, detected_at FROM changed_articles
                     WHERE detected_at >= ?1 ORDER BY id ASC",
                )?;

                let rows = stmt.query_map(params![since], |row| {
                    Ok(ChangedArticle { url: row.get(0)?, body_text: row.get(1)?, detected_at: from_unix(row.get(2)?) })
                })?;
                let changes = rows.collect::<Result<Vec<_>, _>>()?;

                Ok(changes)
            })
            .await
            .map_err(Error::from)
    }
}
