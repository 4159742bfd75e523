// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lookups, the inbound write path, and ownership changes.

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use zaprelay_core::types::{
    new_id, now_timestamp, Conversation, ConversationScope, ConversationStatus, DeliveryStatus,
    InboundRecord, LeadTemperature, Message, NewInbound, Notification, SenderKind,
};
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::{audit, collect_rows, enum_column, messages, notifications};

pub(crate) const COLUMNS: &str = "id, client_phone, client_name, status, temperature, \
     assigned_seller_id, llm_session_id, potential_value, priority, created_at, updated_at, \
     last_message_at";

pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        client_phone: row.get(1)?,
        client_name: row.get(2)?,
        status: enum_column(row, 3)?,
        temperature: enum_column(row, 4)?,
        assigned_seller_id: row.get(5)?,
        llm_session_id: row.get(6)?,
        potential_value: row.get(7)?,
        priority: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        last_message_at: row.get(11)?,
    })
}

pub(crate) fn get_sync(
    conn: &rusqlite::Connection,
    id: &str,
) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
}

fn find_active(
    conn: &rusqlite::Connection,
    phone: &str,
    scope: &ConversationScope,
) -> rusqlite::Result<Option<Conversation>> {
    match scope {
        ConversationScope::AnyOwner => conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM conversations
                     WHERE client_phone = ?1 AND status != 'closed'
                     ORDER BY updated_at DESC, rowid DESC LIMIT 1"
                ),
                params![phone],
                from_row,
            )
            .optional(),
        ConversationScope::Seller(seller_id) => conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM conversations
                     WHERE client_phone = ?1 AND assigned_seller_id = ?2
                       AND status != 'closed'
                     LIMIT 1"
                ),
                params![phone, seller_id],
                from_row,
            )
            .optional(),
    }
}

fn insert_sync(conn: &rusqlite::Connection, c: &Conversation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO conversations (id, client_phone, client_name, status, temperature,
             assigned_seller_id, llm_session_id, potential_value, priority, created_at,
             updated_at, last_message_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            c.id,
            c.client_phone,
            c.client_name,
            c.status.to_string(),
            c.temperature.to_string(),
            c.assigned_seller_id,
            c.llm_session_id,
            c.potential_value,
            c.priority,
            c.created_at,
            c.updated_at,
            c.last_message_at,
        ],
    )?;
    Ok(())
}

/// Attach a client message to its active conversation in one transaction.
///
/// Finds or creates the conversation, appends the message, bumps the
/// activity timestamps, upgrades the temperature, and writes the
/// `new_conversation` / `new_message` notification. A redelivered
/// `external_id` is detected inside the same transaction and yields `None`.
pub async fn record_inbound(
    db: &Database,
    inbound: NewInbound,
) -> Result<Option<InboundRecord>, RelayError> {
    db.connection()
        .call(move |conn| -> Result<Option<InboundRecord>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(external_id) = inbound.external_id.as_deref()
                && messages::exists_by_external_id_sync(&tx, external_id)?
            {
                return Ok(None);
            }
            let now = now_timestamp();

            let (mut conversation, created) =
                match find_active(&tx, &inbound.client_phone, &inbound.scope)? {
                    Some(existing) => (existing, false),
                    None => {
                        let fresh = Conversation {
                            id: new_id(),
                            client_phone: inbound.client_phone.clone(),
                            client_name: inbound.client_name.clone(),
                            status: inbound.initial_status,
                            temperature: LeadTemperature::Cold,
                            assigned_seller_id: inbound.scope.seller_id().map(str::to_string),
                            llm_session_id: None,
                            potential_value: None,
                            priority: "normal".to_string(),
                            created_at: now.clone(),
                            updated_at: now.clone(),
                            last_message_at: None,
                        };
                        insert_sync(&tx, &fresh)?;
                        (fresh, true)
                    }
                };

            if let Some(hint) = inbound.temperature_hint {
                conversation.temperature = conversation.temperature.upgrade(hint);
            }
            if conversation.temperature == LeadTemperature::Hot {
                conversation.priority = "high".to_string();
            }
            if conversation.client_name.is_none() {
                conversation.client_name = inbound.client_name.clone();
            }
            conversation.last_message_at = Some(now.clone());
            conversation.updated_at = now.clone();

            tx.execute(
                "UPDATE conversations
                 SET client_name = ?2, temperature = ?3, priority = ?4,
                     last_message_at = ?5, updated_at = ?5
                 WHERE id = ?1",
                params![
                    conversation.id,
                    conversation.client_name,
                    conversation.temperature.to_string(),
                    conversation.priority,
                    now,
                ],
            )?;

            let message = Message {
                id: new_id(),
                conversation_id: conversation.id.clone(),
                sender: SenderKind::Client,
                sender_id: None,
                content: inbound.content,
                message_type: inbound.message_type,
                external_id: inbound.external_id,
                delivery_status: DeliveryStatus::Delivered,
                created_at: now,
            };
            messages::insert_sync(&tx, &message)?;

            let who = conversation
                .client_name
                .clone()
                .unwrap_or_else(|| conversation.client_phone.clone());
            let (kind, title) = if created {
                ("new_conversation", "Nova conversa")
            } else {
                ("new_message", "Nova mensagem")
            };
            let notification =
                Notification::new(kind, title, format!("{who}: {}", preview(&message.content)))
                    .for_conversation(&conversation.id)
                    .for_seller(conversation.assigned_seller_id.as_deref());
            notifications::insert_sync(&tx, &notification)?;

            tx.commit()?;
            Ok(Some(InboundRecord {
                conversation,
                message,
                created,
                notification,
            }))
        })
        .await
        .map_err(map_tr_err)
}

fn preview(content: &str) -> String {
    const MAX: usize = 120;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

/// Get a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &str,
) -> Result<Option<Conversation>, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            get_sync(conn, &id)
        })
        .await
        .map_err(map_tr_err)
}

/// List conversations by most recent activity, optionally filtered by status.
pub async fn list_conversations(
    db: &Database,
    status: Option<ConversationStatus>,
    limit: i64,
) -> Result<Vec<Conversation>, RelayError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY COALESCE(last_message_at, created_at) DESC, rowid DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Store the session id the LLM service issued for this conversation.
pub async fn set_llm_session(
    db: &Database,
    conversation_id: &str,
    session_id: &str,
) -> Result<(), RelayError> {
    let id = conversation_id.to_string();
    let session_id = session_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET llm_session_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, session_id, now_timestamp()],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(RelayError::not_found("conversation", conversation_id));
    }
    Ok(())
}

/// Set the lifecycle status of a conversation.
pub async fn set_status(
    db: &Database,
    conversation_id: &str,
    status: ConversationStatus,
) -> Result<(), RelayError> {
    let id = conversation_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.to_string(), now_timestamp()],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(RelayError::not_found("conversation", conversation_id));
    }
    Ok(())
}

/// Hand a conversation to a seller and record the change in the audit log.
///
/// Returns the conversation as it was before the transfer.
pub async fn transfer(
    db: &Database,
    conversation_id: &str,
    seller_id: &str,
    actor: Option<&str>,
) -> Result<Conversation, RelayError> {
    let id = conversation_id.to_string();
    let seller = seller_id.to_string();
    let actor = actor.map(str::to_string);
    db.connection()
        .call(
            move |conn| -> Result<Result<Conversation, RelayError>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let Some(before) = get_sync(&tx, &id)? else {
                    return Ok(Err(RelayError::not_found("conversation", id)));
                };
                let seller_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sellers WHERE id = ?1)",
                    params![seller],
                    |row| row.get(0),
                )?;
                if !seller_exists {
                    return Ok(Err(RelayError::not_found("seller", seller)));
                }
                // At most one open thread per (phone, seller).
                let clash: Option<String> = tx
                    .query_row(
                        "SELECT id FROM conversations
                         WHERE client_phone = ?1 AND assigned_seller_id = ?2
                           AND status != 'closed' AND id != ?3
                         LIMIT 1",
                        params![before.client_phone, seller, id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(other) = clash {
                    return Ok(Err(RelayError::InvalidInput(format!(
                        "client already has open conversation {other} with seller {seller}"
                    ))));
                }

                let now = now_timestamp();
                tx.execute(
                    "UPDATE conversations
                     SET assigned_seller_id = ?2, status = ?3, updated_at = ?4
                     WHERE id = ?1",
                    params![id, seller, ConversationStatus::Manual.to_string(), now],
                )?;

                let old_value = serde_json::json!({
                    "assigned_seller_id": before.assigned_seller_id,
                    "status": before.status,
                });
                let new_value = serde_json::json!({
                    "assigned_seller_id": seller,
                    "status": ConversationStatus::Manual,
                });
                audit::insert_sync(
                    &tx,
                    "conversation",
                    &id,
                    "transfer",
                    Some(old_value.to_string()),
                    Some(new_value.to_string()),
                    actor.as_deref(),
                )?;
                tx.commit()?;
                Ok(Ok(before))
            },
        )
        .await
        .map_err(map_tr_err)?
}

/// Bot-owned conversations whose latest client message has no bot reply at
/// or after it. Fallback texts and failed sends do not count as replies.
pub async fn missing_bot_reply(db: &Database, limit: i64) -> Result<Vec<Conversation>, RelayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations c
                 WHERE c.status = 'bot'
                   AND EXISTS (
                       SELECT 1 FROM messages m
                       WHERE m.conversation_id = c.id AND m.sender = 'client')
                   AND NOT EXISTS (
                       SELECT 1 FROM messages b
                       WHERE b.conversation_id = c.id
                         AND b.sender = 'bot'
                         AND b.message_type != 'fallback'
                         AND b.delivery_status != 'failed'
                         AND b.created_at >= (
                             SELECT MAX(l.created_at) FROM messages l
                             WHERE l.conversation_id = c.id AND l.sender = 'client'))
                 ORDER BY c.last_message_at ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Bot-owned conversations with client messages but no LLM session id.
pub async fn missing_llm_session(
    db: &Database,
    limit: i64,
) -> Result<Vec<Conversation>, RelayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations c
                 WHERE c.status = 'bot'
                   AND c.llm_session_id IS NULL
                   AND EXISTS (
                       SELECT 1 FROM messages m
                       WHERE m.conversation_id = c.id AND m.sender = 'client')
                 ORDER BY c.created_at ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Realign `last_message_at` with each conversation's newest message.
/// Returns the number of conversations changed.
pub async fn sync_timestamps(db: &Database) -> Result<usize, RelayError> {
    db.connection()
        .call(|conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE conversations
                 SET last_message_at = (
                         SELECT MAX(m.created_at) FROM messages m
                         WHERE m.conversation_id = conversations.id),
                     updated_at = ?1
                 WHERE EXISTS (
                         SELECT 1 FROM messages m
                         WHERE m.conversation_id = conversations.id)
                   AND IFNULL(last_message_at, '') != (
                         SELECT MAX(m.created_at) FROM messages m
                         WHERE m.conversation_id = conversations.id)",
                params![now_timestamp()],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Open conversations with no message since `cutoff`.
pub async fn stalled_since(db: &Database, cutoff: &str) -> Result<Vec<Conversation>, RelayError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations
                 WHERE status != 'closed'
                   AND COALESCE(last_message_at, created_at) < ?1
                 ORDER BY COALESCE(last_message_at, created_at) ASC"
            ))?;
            let rows = stmt.query_map(params![cutoff], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Human-owned conversations whose newest message is from the client and
/// older than `cutoff`.
pub async fn awaiting_response(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<Conversation>, RelayError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM conversations c
                 WHERE c.status IN ('manual', 'seller')
                   AND c.assigned_seller_id IS NOT NULL
                   AND EXISTS (
                       SELECT 1 FROM messages m
                       WHERE m.id = (
                               SELECT l.id FROM messages l
                               WHERE l.conversation_id = c.id
                               ORDER BY l.created_at DESC, l.rowid DESC LIMIT 1)
                         AND m.sender = 'client'
                         AND m.created_at < ?1)"
            ))?;
            let rows = stmt.query_map(params![cutoff], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}
