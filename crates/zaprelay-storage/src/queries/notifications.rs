// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifications and per-user dismissals.

use rusqlite::params;
use zaprelay_core::types::{now_timestamp, Notification};
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::collect_rows;

pub(crate) fn insert_sync(conn: &rusqlite::Connection, n: &Notification) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, kind, title, body, conversation_id, seller_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            n.id,
            n.kind,
            n.title,
            n.body,
            n.conversation_id,
            n.seller_id,
            n.created_at,
        ],
    )?;
    Ok(())
}

/// Insert a notification.
pub async fn create(db: &Database, notification: &Notification) -> Result<(), RelayError> {
    let n = notification.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { insert_sync(conn, &n) })
        .await
        .map_err(map_tr_err)
}

/// Newest notifications first, skipping those `user_id` dismissed.
pub async fn list_for_user(
    db: &Database,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Notification>, RelayError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Notification>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.kind, n.title, n.body, n.conversation_id, n.seller_id, n.created_at
                 FROM notifications n
                 WHERE NOT EXISTS (
                     SELECT 1 FROM notification_dismissals d
                     WHERE d.notification_id = n.id AND d.user_id = ?1)
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit], |row| {
                Ok(Notification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    title: row.get(2)?,
                    body: row.get(3)?,
                    conversation_id: row.get(4)?,
                    seller_id: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Record that `user_id` dismissed a notification. Dismissing twice is a no-op.
pub async fn dismiss(db: &Database, notification_id: &str, user_id: &str) -> Result<(), RelayError> {
    let id = notification_id.to_string();
    let user = user_id.to_string();
    let exists = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM notifications WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if exists {
                conn.execute(
                    "INSERT OR IGNORE INTO notification_dismissals
                         (notification_id, user_id, dismissed_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, user, now_timestamp()],
                )?;
            }
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)?;
    if !exists {
        return Err(RelayError::not_found("notification", notification_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn dismissal_is_per_user() {
        let (db, _dir) = setup_db().await;
        let first = Notification::new("new_message", "Nova mensagem", "Maria: oi");
        let second = Notification::new("management_alert", "Alerta", "Vendedor inativo");
        create(&db, &first).await.unwrap();
        create(&db, &second).await.unwrap();

        dismiss(&db, &first.id, "ana").await.unwrap();
        dismiss(&db, &first.id, "ana").await.unwrap();

        let for_ana = list_for_user(&db, "ana", 10).await.unwrap();
        assert_eq!(for_ana.len(), 1);
        assert_eq!(for_ana[0].id, second.id);

        let for_bruno = list_for_user(&db, "bruno", 10).await.unwrap();
        assert_eq!(for_bruno.len(), 2);
        assert_eq!(for_bruno[0].id, second.id, "newest first");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dismissing_unknown_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = dismiss(&db, "missing", "ana").await.unwrap_err();
        assert!(err.is_not_found());
        db.close().await.unwrap();
    }
}
