//! Saksflyt Store: Connection & Row Mapping
//!
//! One pool per process. In-memory URLs pin a single connection that never
//! recycles (each fresh SQLite connection would otherwise be an empty
//! database); file URLs get a small pool with a busy timeout.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use saksflyt_core::evidence::ExtractedFields;
use saksflyt_core::types::{
    AuditAction, AuditEvent, Case, CaseStatus, ContentType, Document, DocumentStatus,
    FinalDecision, RiskLevel, RuleResult, User,
};
use saksflyt_core::{Error, Result};

use crate::schema::SCHEMA;

/// Transactional store over SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and prepare the pool. Does not run migrations.
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(storage_err)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = db_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        } else {
            pool_options = pool_options.max_connections(5);
        }

        let pool = pool_options.connect_with(options).await.map_err(storage_err)?;
        info!(db_url, in_memory, "store connected");
        Ok(Self { pool })
    }

    /// Create tables and indexes.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Convenience for tests: fresh in-memory store with schema applied.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::connect("sqlite::memory:").await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map any sqlx failure onto the storage error kind.
pub(crate) fn storage_err(err: impl std::fmt::Display) -> Error {
    Error::Storage(err.to_string())
}

/// Fixed-width RFC 3339 (microseconds, Z) so TEXT ordering is time ordering.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Storage(format!("bad uuid {raw:?}: {e}")))
}

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(storage_err)?)?,
        email: row.try_get("email").map_err(storage_err)?,
        password_hash: row.try_get("password_hash").map_err(storage_err)?,
        full_name: row.try_get("full_name").map_err(storage_err)?,
        is_active: row.try_get::<i64, _>("is_active").map_err(storage_err)? != 0,
        is_reviewer: row.try_get::<i64, _>("is_reviewer").map_err(storage_err)? != 0,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(storage_err)?)?,
    })
}

pub(crate) fn case_from_row(row: &SqliteRow) -> Result<Case> {
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let status = CaseStatus::parse(&status_raw)
        .ok_or_else(|| Error::Storage(format!("unknown case status {status_raw:?}")))?;
    let risk_level = row
        .try_get::<Option<String>, _>("risk_level")
        .map_err(storage_err)?
        .as_deref()
        .and_then(RiskLevel::parse);
    let final_decision = row
        .try_get::<Option<String>, _>("final_decision")
        .map_err(storage_err)?
        .as_deref()
        .and_then(FinalDecision::parse);

    Ok(Case {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(storage_err)?)?,
        owner_id: parse_uuid(&row.try_get::<String, _>("owner_id").map_err(storage_err)?)?,
        applicant_full_name: row.try_get("applicant_full_name").map_err(storage_err)?,
        applicant_nationality: row.try_get("applicant_nationality").map_err(storage_err)?,
        notes: row.try_get("notes").map_err(storage_err)?,
        status,
        confidence_score: row.try_get("confidence_score").map_err(storage_err)?,
        risk_level,
        recommendation_summary: row
            .try_get("recommendation_summary")
            .map_err(storage_err)?,
        priority_score: row.try_get::<i64, _>("priority_score").map_err(storage_err)?
            .clamp(0, 100) as u8,
        sla_due_at: parse_opt_ts(row.try_get("sla_due_at").map_err(storage_err)?)?,
        queued_at: parse_opt_ts(row.try_get("queued_at").map_err(storage_err)?)?,
        final_decision,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(storage_err)?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at").map_err(storage_err)?)?,
    })
}

pub(crate) fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let content_raw: String = row.try_get("content_type").map_err(storage_err)?;
    let content_type = ContentType::from_mime(&content_raw)
        .ok_or_else(|| Error::Storage(format!("unknown content type {content_raw:?}")))?;
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let status = DocumentStatus::parse(&status_raw)
        .ok_or_else(|| Error::Storage(format!("unknown document status {status_raw:?}")))?;
    let fields_raw: String = row.try_get("extracted_fields").map_err(storage_err)?;
    let extracted_fields: ExtractedFields = serde_json::from_str(&fields_raw)
        .map_err(|e| Error::Storage(format!("bad extracted_fields json: {e}")))?;

    Ok(Document {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(storage_err)?)?,
        case_id: parse_uuid(&row.try_get::<String, _>("case_id").map_err(storage_err)?)?,
        document_type: row.try_get("document_type").map_err(storage_err)?,
        original_filename: row.try_get("original_filename").map_err(storage_err)?,
        content_type,
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(storage_err)?.max(0) as u64,
        storage_key: row.try_get("storage_key").map_err(storage_err)?,
        status,
        extracted_text: row.try_get("extracted_text").map_err(storage_err)?,
        extracted_fields,
        failure_reason: row.try_get("failure_reason").map_err(storage_err)?,
        uploaded_at: parse_ts(&row.try_get::<String, _>("uploaded_at").map_err(storage_err)?)?,
    })
}

pub(crate) fn rule_result_from_row(row: &SqliteRow) -> Result<RuleResult> {
    let evidence_raw: String = row.try_get("evidence").map_err(storage_err)?;
    Ok(RuleResult {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(storage_err)?)?,
        case_id: parse_uuid(&row.try_get::<String, _>("case_id").map_err(storage_err)?)?,
        rule_code: row.try_get("rule_code").map_err(storage_err)?,
        rule_name: row.try_get("rule_name").map_err(storage_err)?,
        passed: row.try_get::<i64, _>("passed").map_err(storage_err)? != 0,
        score: row.try_get("score").map_err(storage_err)?,
        weight: row.try_get("weight").map_err(storage_err)?,
        rationale: row.try_get("rationale").map_err(storage_err)?,
        evidence: serde_json::from_str(&evidence_raw)
            .map_err(|e| Error::Storage(format!("bad evidence json: {e}")))?,
        evaluated_at: parse_ts(&row.try_get::<String, _>("evaluated_at").map_err(storage_err)?)?,
    })
}

pub(crate) fn audit_from_row(row: &SqliteRow) -> Result<AuditEvent> {
    let action_raw: String = row.try_get("action").map_err(storage_err)?;
    let action = AuditAction::parse(&action_raw)
        .ok_or_else(|| Error::Storage(format!("unknown audit action {action_raw:?}")))?;
    let metadata_raw: String = row.try_get("metadata").map_err(storage_err)?;
    let actor_id = row
        .try_get::<Option<String>, _>("actor_id")
        .map_err(storage_err)?
        .map(|s| parse_uuid(&s))
        .transpose()?;

    Ok(AuditEvent {
        id: parse_uuid(&row.try_get::<String, _>("id").map_err(storage_err)?)?,
        case_id: parse_uuid(&row.try_get::<String, _>("case_id").map_err(storage_err)?)?,
        actor_id,
        action,
        reason: row.try_get("reason").map_err(storage_err)?,
        metadata: serde_json::from_str(&metadata_raw)
            .map_err(|e| Error::Storage(format!("bad metadata json: {e}")))?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(storage_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_migrate_in_memory() {
        let store = Store::in_memory().await.unwrap();
        // Idempotent
        store.migrate().await.unwrap();
        let row: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row, 0);
    }

    #[test]
    fn test_timestamp_round_trip_sortable() {
        let now = Utc::now();
        let s = fmt_ts(now);
        let back = parse_ts(&s).unwrap();
        // Micros precision
        assert!((back - now).num_microseconds().unwrap().abs() <= 1);

        let earlier = fmt_ts(now - chrono::Duration::milliseconds(5));
        assert!(earlier < s, "fixed-width timestamps sort lexicographically");
    }
}
