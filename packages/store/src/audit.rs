//! Saksflyt Store: Audit Trail
//!
//! Append-only. Rows carry an AUTOINCREMENT `seq`, so append order is
//! total per case and ids can never reorder; there is no update or delete
//! path in this module by construction.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use saksflyt_core::types::{AuditAction, AuditEvent};
use saksflyt_core::{Error, Result};

use crate::store::{audit_from_row, fmt_ts, storage_err, Store};

/// Insert an audit event inside an open transaction.
pub(crate) async fn insert_audit(
    tx: &mut Transaction<'_, Sqlite>,
    case_id: Uuid,
    action: AuditAction,
    actor_id: Option<Uuid>,
    reason: Option<String>,
    metadata: serde_json::Value,
) -> Result<AuditEvent> {
    let event = AuditEvent {
        id: Uuid::new_v4(),
        case_id,
        actor_id,
        action,
        reason,
        metadata,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO audit_events (id, case_id, actor_id, action, reason, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.id.to_string())
    .bind(event.case_id.to_string())
    .bind(event.actor_id.map(|id| id.to_string()))
    .bind(event.action.as_str())
    .bind(&event.reason)
    .bind(event.metadata.to_string())
    .bind(fmt_ts(event.created_at))
    .execute(&mut **tx)
    .await
    .map_err(storage_err)?;

    Ok(event)
}

impl Store {
    /// Append an audit event outside any caller transaction.
    pub async fn append_audit(
        &self,
        case_id: Uuid,
        action: AuditAction,
        actor_id: Option<Uuid>,
        reason: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<AuditEvent> {
        let mut tx = self.pool().begin().await.map_err(storage_err)?;
        // FK enforcement turns a dangling case id into a storage error; map
        // it to NotFound for callers.
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cases WHERE id = ?")
            .bind(case_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?;
        if exists == 0 {
            return Err(Error::NotFound("case"));
        }
        let event = insert_audit(&mut tx, case_id, action, actor_id, reason, metadata).await?;
        tx.commit().await.map_err(storage_err)?;
        Ok(event)
    }

    /// Most recent event of one action kind for a case.
    pub async fn latest_audit(
        &self,
        case_id: Uuid,
        action: AuditAction,
    ) -> Result<Option<AuditEvent>> {
        let row = sqlx::query(
            "SELECT * FROM audit_events WHERE case_id = ? AND action = ?
             ORDER BY seq DESC LIMIT 1",
        )
        .bind(case_id.to_string())
        .bind(action.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(storage_err)?;
        row.as_ref().map(audit_from_row).transpose()
    }

    /// Chronological (append-ordered) trail for a case.
    pub async fn read_audit_trail(&self, case_id: Uuid) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT * FROM audit_events WHERE case_id = ? ORDER BY seq ASC")
            .bind(case_id.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(storage_err)?;
        rows.iter().map(audit_from_row).collect()
    }
}
