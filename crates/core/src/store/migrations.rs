//! Versioned schema migrations.
//!
//! `_migrations` records the highest applied version. Each pending migration
//! runs in its own transaction together with its version row, so a failed
//! migration leaves neither partial schema nor a version bump behind.

use chrono::Utc;
use tokio_rusqlite::{Connection, params, rusqlite};

use super::{Error, to_unix};

/// Ordered `(version, SQL)` pairs. Versions strictly increase.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_articles.sql")),
    (2, include_str!("../../migrations/002_changed_articles.sql")),
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
)";

/// Bring the schema up to the latest version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the version whose SQL failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| apply(conn, MIGRATIONS)).await.map_err(Error::from)
}

fn apply(conn: &mut rusqlite::Connection, migrations: &[(i64, &str)]) -> Result<(), Error> {
    conn.execute(VERSION_TABLE, [])?;
    let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

    for &(version, sql) in migrations {
        if version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, to_unix(&Utc::now())],
        )?;
        tx.commit()?;
        tracing::debug!(version, "migration applied");
    }

    Ok(())
}
