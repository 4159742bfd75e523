// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert rule storage.

use rusqlite::params;
use zaprelay_core::types::AlertRule;
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::{collect_rows, enum_column};

/// Insert an alert rule.
pub async fn create_rule(db: &Database, rule: &AlertRule) -> Result<(), RelayError> {
    let r = rule.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO alert_rules (id, name, kind, threshold, cooldown_minutes, action,
                     active, last_triggered_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    r.id,
                    r.name,
                    r.kind.to_string(),
                    r.threshold,
                    r.cooldown_minutes,
                    r.action.to_string(),
                    r.active,
                    r.last_triggered_at,
                    r.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Active rules in creation order.
pub async fn list_active(db: &Database) -> Result<Vec<AlertRule>, RelayError> {
    db.connection()
        .call(|conn| -> Result<Vec<AlertRule>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, name, kind, threshold, cooldown_minutes, action, active,
                        last_triggered_at, created_at
                 FROM alert_rules WHERE active = 1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(AlertRule {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: enum_column(row, 2)?,
                    threshold: row.get(3)?,
                    cooldown_minutes: row.get(4)?,
                    action: enum_column(row, 5)?,
                    active: row.get(6)?,
                    last_triggered_at: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp `last_triggered_at` after a rule fired.
pub async fn mark_triggered(db: &Database, rule_id: &str, at: &str) -> Result<(), RelayError> {
    let id = rule_id.to_string();
    let at = at.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE alert_rules SET last_triggered_at = ?2 WHERE id = ?1",
                params![id, at],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(RelayError::not_found("alert rule", rule_id));
    }
    Ok(())
}
