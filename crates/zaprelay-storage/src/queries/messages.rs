// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use rusqlite::{params, OptionalExtension};
use zaprelay_core::types::{DeliveryStatus, Message};
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::{collect_rows, enum_column};

const COLUMNS: &str = "id, conversation_id, sender, sender_id, content, message_type, \
     external_id, delivery_status, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender: enum_column(row, 2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        message_type: row.get(5)?,
        external_id: row.get(6)?,
        delivery_status: enum_column(row, 7)?,
        created_at: row.get(8)?,
    })
}

pub(crate) fn insert_sync(conn: &rusqlite::Connection, msg: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender, sender_id, content, message_type,
             external_id, delivery_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            msg.id,
            msg.conversation_id,
            msg.sender.to_string(),
            msg.sender_id,
            msg.content,
            msg.message_type,
            msg.external_id,
            msg.delivery_status.to_string(),
            msg.created_at,
        ],
    )?;
    Ok(())
}

/// Insert a message and bump its conversation's activity timestamps.
pub async fn insert(db: &Database, msg: &Message) -> Result<(), RelayError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            insert_sync(&tx, &msg)?;
            tx.execute(
                "UPDATE conversations
                 SET last_message_at = MAX(IFNULL(last_message_at, ''), ?2),
                     updated_at = MAX(updated_at, ?2)
                 WHERE id = ?1",
                params![msg.conversation_id, msg.created_at],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a conversation in chronological order.
///
/// With a limit, returns the most recent `limit` messages, still oldest first.
pub async fn get_for_conversation(
    db: &Database,
    conversation_id: &str,
    limit: Option<i64>,
) -> Result<Vec<Message>, RelayError> {
    let conversation_id = conversation_id.to_string();
    let limit = limit.unwrap_or(-1);
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM (
                     SELECT {COLUMNS}, rowid AS seq FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2)
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id, limit], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

pub(crate) fn exists_by_external_id_sync(
    conn: &rusqlite::Connection,
    external_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM messages WHERE external_id = ?1)",
        params![external_id],
        |row| row.get(0),
    )
}

/// Whether a message with this provider id was already stored.
pub async fn exists_by_external_id(db: &Database, external_id: &str) -> Result<bool, RelayError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            exists_by_external_id_sync(conn, &external_id)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a provider delivery callback.
///
/// Statuses only move forward (`sending < sent < delivered < read`);
/// `failed` always applies. Returns true when a row changed.
pub async fn update_delivery_status(
    db: &Database,
    external_id: &str,
    status: DeliveryStatus,
) -> Result<bool, RelayError> {
    let external_id = external_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current: Option<(String, DeliveryStatus)> = tx
                .query_row(
                    "SELECT id, delivery_status FROM messages
                     WHERE external_id = ?1
                     ORDER BY created_at DESC LIMIT 1",
                    params![external_id],
                    |row| Ok((row.get(0)?, enum_column(row, 1)?)),
                )
                .optional()?;
            let Some((id, current)) = current else {
                return Ok(false);
            };
            if !current.can_advance_to(status) {
                return Ok(false);
            }
            tx.execute(
                "UPDATE messages SET delivery_status = ?2 WHERE id = ?1",
                params![id, status.to_string()],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Newest client message of a conversation.
pub async fn latest_client_message(
    db: &Database,
    conversation_id: &str,
) -> Result<Option<Message>, RelayError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND sender = 'client'
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![conversation_id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a delivered bot reply exists at or after `since`.
/// Fallback texts and failed sends do not count.
pub async fn has_bot_reply_since(
    db: &Database,
    conversation_id: &str,
    since: &str,
) -> Result<bool, RelayError> {
    let conversation_id = conversation_id.to_string();
    let since = since.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM messages
                     WHERE conversation_id = ?1
                       AND sender = 'bot'
                       AND message_type != 'fallback'
                       AND delivery_status != 'failed'
                       AND created_at >= ?2)",
                params![conversation_id, since],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::conversations;
    use tempfile::tempdir;
    use zaprelay_core::types::{
        new_id, ConversationScope, ConversationStatus, NewInbound, SenderKind,
    };

    async fn setup_db_with_conversation() -> (Database, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let rec = conversations::record_inbound(
            &db,
            NewInbound {
                scope: ConversationScope::AnyOwner,
                client_phone: "5511999990000".to_string(),
                client_name: None,
                content: "oi".to_string(),
                message_type: "text".to_string(),
                external_id: Some("wamid.in-1".to_string()),
                initial_status: ConversationStatus::Bot,
                temperature_hint: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
        (db, rec.conversation.id, dir)
    }

    fn make_msg(conv: &str, sender: SenderKind, content: &str, timestamp: &str) -> Message {
        Message {
            id: new_id(),
            conversation_id: conv.to_string(),
            sender,
            sender_id: None,
            content: content.to_string(),
            message_type: "text".to_string(),
            external_id: Some(format!("ext-{content}")),
            delivery_status: DeliveryStatus::Sent,
            created_at: timestamp.to_string(),
        }
    }

    #[tokio::test]
    async fn limit_returns_most_recent_in_order() {
        let (db, conv, _dir) = setup_db_with_conversation().await;
        for i in 0..5 {
            let msg = make_msg(
                &conv,
                SenderKind::Bot,
                &format!("m{i}"),
                &format!("2999-01-01T00:00:0{i}.000Z"),
            );
            insert(&db, &msg).await.unwrap();
        }

        let all = get_for_conversation(&db, &conv, None).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0].content, "oi");

        let last3 = get_for_conversation(&db, &conv, Some(3)).await.unwrap();
        let contents: Vec<&str> = last3.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_bumps_conversation_activity() {
        let (db, conv, _dir) = setup_db_with_conversation().await;
        let msg = make_msg(&conv, SenderKind::Seller, "ok", "2999-01-01T00:00:00.000Z");
        insert(&db, &msg).await.unwrap();
        let stored = conversations::get_conversation(&db, &conv).await.unwrap().unwrap();
        assert_eq!(stored.last_message_at.as_deref(), Some("2999-01-01T00:00:00.000Z"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn external_id_lookup() {
        let (db, _conv, _dir) = setup_db_with_conversation().await;
        assert!(exists_by_external_id(&db, "wamid.in-1").await.unwrap());
        assert!(!exists_by_external_id(&db, "wamid.other").await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delivery_status_never_regresses() {
        let (db, conv, _dir) = setup_db_with_conversation().await;
        let mut out = make_msg(&conv, SenderKind::Bot, "reply", "2999-01-01T00:00:00.000Z");
        out.external_id = Some("wamid.out-1".to_string());
        insert(&db, &out).await.unwrap();

        assert!(update_delivery_status(&db, "wamid.out-1", DeliveryStatus::Read).await.unwrap());
        assert!(
            !update_delivery_status(&db, "wamid.out-1", DeliveryStatus::Delivered)
                .await
                .unwrap()
        );
        assert!(!update_delivery_status(&db, "unknown", DeliveryStatus::Read).await.unwrap());

        let msgs = get_for_conversation(&db, &conv, None).await.unwrap();
        let stored = msgs.iter().find(|m| m.id == out.id).unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Read);

        assert!(update_delivery_status(&db, "wamid.out-1", DeliveryStatus::Failed).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bot_reply_detection_ignores_fallback_and_failed_sends() {
        let (db, conv, _dir) = setup_db_with_conversation().await;
        let client = latest_client_message(&db, &conv).await.unwrap().unwrap();
        assert_eq!(client.content, "oi");
        assert!(!has_bot_reply_since(&db, &conv, &client.created_at).await.unwrap());

        let mut fallback = make_msg(&conv, SenderKind::Bot, "fb", "2999-01-01T00:00:00.000Z");
        fallback.message_type = "fallback".to_string();
        insert(&db, &fallback).await.unwrap();
        assert!(!has_bot_reply_since(&db, &conv, &client.created_at).await.unwrap());

        let mut failed = make_msg(&conv, SenderKind::Bot, "lost", "2999-01-01T00:00:00.500Z");
        failed.delivery_status = DeliveryStatus::Failed;
        insert(&db, &failed).await.unwrap();
        assert!(!has_bot_reply_since(&db, &conv, &client.created_at).await.unwrap());

        let reply = make_msg(&conv, SenderKind::Bot, "real", "2999-01-01T00:00:01.000Z");
        insert(&db, &reply).await.unwrap();
        assert!(has_bot_reply_since(&db, &conv, &client.created_at).await.unwrap());
        db.close().await.unwrap();
    }
}
