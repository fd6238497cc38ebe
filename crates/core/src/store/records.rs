//! Ledger persistence.
//!
//! The persisted ledger is replaced as a whole on every save: the previous
//! rows are deleted and the new set inserted inside one transaction, so a
//! crash mid-save leaves the prior ledger intact.

use super::connection::LedgerDb;
use super::{from_unix, to_unix};
use crate::{ArticleRecord, Error};
use tokio_rusqlite::params;

impl LedgerDb {
    /// Read every persisted ledger record, oldest first.
    ///
    /// A fresh database yields an empty ledger.
    pub async fn load_ledger(&self) -> Result<Vec<ArticleRecord>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<ArticleRecord>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, fingerprint, observed_at FROM articles ORDER BY observed_at ASC, rowid ASC",
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok(ArticleRecord {
                        url: row.get(0)?,
                        fingerprint: row.get(1)?,
                        observed_at: from_unix(row.get(2)?),
                    })
                })?;
                let records = rows.collect::<Result<Vec<_>, _>>()?;

                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    /// Replace the persisted ledger with exactly `records`.
    ///
    /// Fails without touching the stored ledger if `records` repeats a URL.
    pub async fn save_ledger(&self, records: &[ArticleRecord]) -> Result<(), Error> {
        let records = records.to_vec();
        let count = records.len();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM articles", [])?;
                {
                    let mut stmt =
                        tx.prepare("INSERT INTO articles (url, fingerprint, observed_at) VALUES (?1, ?2, ?3)")?;
                    for record in &records {
                        stmt.execute(params![&record.url, record.fingerprint, to_unix(&record.observed_at)])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(records = count, "ledger saved");
        Ok(())
    }
}
