// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seller lookups used by routing, transfer, and the alert monitor.

use rusqlite::{params, OptionalExtension};
use zaprelay_core::types::{now_timestamp, Seller};
use zaprelay_core::RelayError;

use crate::database::{map_tr_err, Database};
use crate::queries::collect_rows;

const COLUMNS: &str = "id, name, whatsapp_number, whapi_token, whapi_status, \
     performance_score, last_activity, active, created_at";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Seller> {
    Ok(Seller {
        id: row.get(0)?,
        name: row.get(1)?,
        whatsapp_number: row.get(2)?,
        whapi_token: row.get(3)?,
        whapi_status: row.get(4)?,
        performance_score: row.get(5)?,
        last_activity: row.get(6)?,
        active: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Insert a seller, or update every column except `created_at`.
pub async fn upsert(db: &Database, seller: &Seller) -> Result<(), RelayError> {
    let s = seller.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO sellers (id, name, whatsapp_number, whapi_token, whapi_status,
                     performance_score, last_activity, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     whatsapp_number = excluded.whatsapp_number,
                     whapi_token = excluded.whapi_token,
                     whapi_status = excluded.whapi_status,
                     performance_score = excluded.performance_score,
                     last_activity = excluded.last_activity,
                     active = excluded.active",
                params![
                    s.id,
                    s.name,
                    s.whatsapp_number,
                    s.whapi_token,
                    s.whapi_status,
                    s.performance_score,
                    s.last_activity,
                    s.active,
                    s.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a seller by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Seller>, RelayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Seller>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM sellers WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp the seller's `last_activity` with the current time.
pub async fn touch_activity(db: &Database, seller_id: &str) -> Result<(), RelayError> {
    let id = seller_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE sellers SET last_activity = ?2 WHERE id = ?1",
                params![id, now_timestamp()],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(RelayError::not_found("seller", seller_id));
    }
    Ok(())
}

/// Active sellers with a recorded `last_activity` older than `cutoff`.
pub async fn inactive_since(db: &Database, cutoff: &str) -> Result<Vec<Seller>, RelayError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Seller>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sellers
                 WHERE active = 1
                   AND last_activity IS NOT NULL
                   AND last_activity < ?1
                 ORDER BY last_activity ASC"
            ))?;
            let rows = stmt.query_map(params![cutoff], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Active sellers whose performance score is below `threshold`.
pub async fn below_score(db: &Database, threshold: f64) -> Result<Vec<Seller>, RelayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Seller>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sellers
                 WHERE active = 1 AND performance_score < ?1
                 ORDER BY performance_score ASC"
            ))?;
            let rows = stmt.query_map(params![threshold], from_row)?;
            collect_rows(rows)
        })
        .await
        .map_err(map_tr_err)
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

    fn seller(id: &str, score: f64, last_activity: Option<&str>) -> Seller {
        Seller {
            id: id.to_string(),
            name: format!("Seller {id}"),
            whatsapp_number: "5511988887777".to_string(),
            whapi_token: None,
            whapi_status: None,
            performance_score: score,
            last_activity: last_activity.map(str::to_string),
            active: true,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_update() {
        let (db, _dir) = setup_db().await;
        let mut s = seller("s1", 8.0, None);
        upsert(&db, &s).await.unwrap();

        s.name = "Ana Paula".to_string();
        s.whapi_token = Some("tok".to_string());
        upsert(&db, &s).await.unwrap();

        let stored = get(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Ana Paula");
        assert_eq!(stored.whapi_token.as_deref(), Some("tok"));
        assert!(get(&db, "s2").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn inactivity_excludes_unknown_and_inactive() {
        let (db, _dir) = setup_db().await;
        upsert(&db, &seller("idle", 8.0, Some("2026-01-01T08:00:00.000Z")))
            .await
            .unwrap();
        upsert(&db, &seller("busy", 8.0, Some("2026-01-01T11:59:00.000Z")))
            .await
            .unwrap();
        upsert(&db, &seller("never", 8.0, None)).await.unwrap();
        let mut off = seller("off", 8.0, Some("2026-01-01T08:00:00.000Z"));
        off.active = false;
        upsert(&db, &off).await.unwrap();

        let idle = inactive_since(&db, "2026-01-01T11:30:00.000Z").await.unwrap();
        let ids: Vec<&str> = idle.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["idle"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn touch_activity_updates_timestamp() {
        let (db, _dir) = setup_db().await;
        upsert(&db, &seller("s1", 8.0, None)).await.unwrap();
        touch_activity(&db, "s1").await.unwrap();
        assert!(get(&db, "s1").await.unwrap().unwrap().last_activity.is_some());
        assert!(touch_activity(&db, "ghost").await.unwrap_err().is_not_found());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn score_threshold() {
        let (db, _dir) = setup_db().await;
        upsert(&db, &seller("low", 3.5, None)).await.unwrap();
        upsert(&db, &seller("high", 9.0, None)).await.unwrap();
        let low = below_score(&db, 5.0).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "low");
        db.close().await.unwrap();
    }
}
