//! SQLite pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows a single writer at a time. `DatabasePool` keeps a
//! one-connection writer pool (all INSERT/UPDATE/DELETE serialize on it,
//! which is also what makes patch application atomic) and a small reader
//! pool for concurrent SELECTs. Both run WAL journal mode with a busy
//! timeout.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Split read/write pool for SQLite.
#[derive(Clone)]
pub struct DatabasePool {
    /// Multi-connection pool for SELECT queries.
    pub reader: SqlitePool,
    /// Single-connection pool for serialized writes.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) and migrate the database, then build the
    /// split pools.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        // Migrations run on the writer before the read-only pool opens.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(base_opts.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}
