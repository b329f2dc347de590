//! Saksflyt Store: Processing Locks
//!
//! The `case_locks` table is the sole mutual-exclusion point for derived
//! state. Acquisition is non-blocking: a live lock means
//! `AlreadyProcessing`. Locks older than the configured TTL are treated as
//! crashed holders and may be reclaimed by the recovery sweeper.

use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use saksflyt_core::{Error, Result};

use crate::store::{fmt_ts, parse_ts, parse_uuid, storage_err, Store};

/// A row of the lock table.
#[derive(Debug, Clone)]
pub struct CaseLock {
    pub case_id: Uuid,
    pub holder_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl CaseLock {
    pub fn is_stale(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        now - self.acquired_at > Duration::seconds(ttl_seconds)
    }
}

impl Store {
    /// Try to take the per-case processing lock. Non-blocking.
    ///
    /// An unexpired lock held by anyone (including the caller) yields
    /// `AlreadyProcessing`; an expired lock is replaced.
    pub async fn acquire_case_lock(
        &self,
        case_id: Uuid,
        holder_id: Uuid,
        ttl_seconds: i64,
    ) -> Result<CaseLock> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(storage_err)?;

        let existing = sqlx::query("SELECT * FROM case_locks WHERE case_id = ?")
            .bind(case_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        if let Some(row) = existing {
            let lock = lock_from_row(&row)?;
            if !lock.is_stale(ttl_seconds, now) {
                return Err(Error::AlreadyProcessing);
            }
            sqlx::query("DELETE FROM case_locks WHERE case_id = ?")
                .bind(case_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            tracing::warn!(
                case_id = %case_id,
                stale_holder = %lock.holder_id,
                "replacing stale case lock"
            );
        }

        sqlx::query("INSERT INTO case_locks (case_id, holder_id, acquired_at) VALUES (?, ?, ?)")
            .bind(case_id.to_string())
            .bind(holder_id.to_string())
            .bind(fmt_ts(now))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        Ok(CaseLock {
            case_id,
            holder_id,
            acquired_at: now,
        })
    }

    /// Release a lock; only the holder may release it.
    pub async fn release_case_lock(&self, case_id: Uuid, holder_id: Uuid) -> Result<()> {
        let done = sqlx::query("DELETE FROM case_locks WHERE case_id = ? AND holder_id = ?")
            .bind(case_id.to_string())
            .bind(holder_id.to_string())
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            tracing::warn!(case_id = %case_id, holder_id = %holder_id, "released lock was not held");
        }
        Ok(())
    }

    /// Current lock row for a case, expired or not.
    pub async fn get_case_lock(&self, case_id: Uuid) -> Result<Option<CaseLock>> {
        let row = sqlx::query("SELECT * FROM case_locks WHERE case_id = ?")
            .bind(case_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        row.as_ref().map(lock_from_row).transpose()
    }

    /// Whether a live (unexpired) lock exists for a case.
    pub async fn case_lock_is_live(&self, case_id: Uuid, ttl_seconds: i64) -> Result<bool> {
        Ok(self
            .get_case_lock(case_id)
            .await?
            .is_some_and(|lock| !lock.is_stale(ttl_seconds, Utc::now())))
    }

    /// Locks older than the TTL, for crash recovery.
    pub async fn stale_case_locks(&self, ttl_seconds: i64) -> Result<Vec<CaseLock>> {
        let cutoff = Utc::now() - Duration::seconds(ttl_seconds);
        let rows = sqlx::query("SELECT * FROM case_locks WHERE acquired_at < ?")
            .bind(fmt_ts(cutoff))
            .fetch_all(self.pool())
            .await
            .map_err(storage_err)?;
        rows.iter().map(lock_from_row).collect()
    }
}

fn lock_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CaseLock> {
    Ok(CaseLock {
        case_id: parse_uuid(&row.try_get::<String, _>("case_id").map_err(storage_err)?)?,
        holder_id: parse_uuid(&row.try_get::<String, _>("holder_id").map_err(storage_err)?)?,
        acquired_at: parse_ts(&row.try_get::<String, _>("acquired_at").map_err(storage_err)?)?,
    })
}
