// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use tracing::debug;
use zaprelay_core::RelayError;

/// Handle to the relay database.
///
/// Query modules take `&Database` and run their statements through
/// [`Database::connection`].
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database with WAL enabled and run migrations.
    pub async fn open(path: &str) -> Result<Self, RelayError> {
        Self::open_with(path, true).await
    }

    /// Open (or create) the database and run migrations.
    ///
    /// Schema setup runs on a blocking thread with a short-lived plain
    /// connection; the long-lived async connection is opened afterwards.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, RelayError> {
        let setup_path = path.to_string();
        tokio::task::spawn_blocking(move || prepare_schema(&setup_path, wal_mode))
            .await
            .map_err(|e| RelayError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| RelayError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            apply_connection_pragmas(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The async connection all queries go through.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), RelayError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(|e| RelayError::Storage {
            source: Box::new(e),
        })
    }
}

fn prepare_schema(path: &str, wal_mode: bool) -> Result<(), RelayError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| RelayError::Storage {
            source: Box::new(e),
        })?;
    }

    let mut conn = rusqlite::Connection::open(path).map_err(|e| RelayError::Storage {
        source: Box::new(e),
    })?;
    let journal = if wal_mode { "WAL" } else { "DELETE" };
    conn.execute_batch(&format!("PRAGMA journal_mode = {journal};"))
        .and_then(|_| apply_connection_pragmas(&conn))
        .map_err(|e| RelayError::Storage {
            source: Box::new(e),
        })?;
    crate::migrations::run_migrations(&mut conn)
}

fn apply_connection_pragmas(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
}

/// Convert a tokio-rusqlite error into RelayError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RelayError {
    RelayError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_parent_dirs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested/dir/relay.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn wal_mode_is_applied() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("wal.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let mode: String = db
            .connection()
            .call(|conn| -> Result<String, rusqlite::Error> {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let path = db_path.to_str().unwrap();

        let db = Database::open(path).await.unwrap();
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO sellers (id, name, whatsapp_number, created_at)
                     VALUES ('s1', 'Ana', '5511988887777', '2026-01-01T00:00:00.000Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        db.close().await.unwrap();

        let db = Database::open(path).await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM sellers", [], |row| row.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        db.close().await.unwrap();
    }
}
