// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit log rows.

use rusqlite::params;
use zaprelay_core::types::{new_id, now_timestamp, AuditEntry};
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::collect_rows;

pub(crate) fn insert_sync(
    conn: &rusqlite::Connection,
    entity: &str,
    entity_id: &str,
    action: &str,
    old_value: Option<String>,
    new_value: Option<String>,
    actor: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_log (id, entity, entity_id, action, old_value, new_value, actor, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_id(),
            entity,
            entity_id,
            action,
            old_value,
            new_value,
            actor,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

/// Audit rows for one entity, oldest first.
pub async fn list_for_entity(db: &Database, entity_id: &str) -> Result<Vec<AuditEntry>, RelayError> {
    let entity_id = entity_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<AuditEntry>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, entity, entity_id, action, old_value, new_value, actor, created_at
                 FROM audit_log WHERE entity_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![entity_id], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    entity: row.get(1)?,
                    entity_id: row.get(2)?,
                    action: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    actor: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}
