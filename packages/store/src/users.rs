//! Saksflyt Store: Users

use chrono::Utc;
use uuid::Uuid;

use saksflyt_core::types::User;
use saksflyt_core::{Error, Result};

use crate::store::{fmt_ts, storage_err, user_from_row, Store};

impl Store {
    /// Create an account. Emails are lowercased and unique.
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
        is_reviewer: bool,
    ) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            full_name: full_name.trim().to_string(),
            is_active: true,
            is_reviewer,
            created_at: Utc::now(),
        };

        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, full_name, is_active, is_reviewer, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.is_active as i64)
        .bind(user.is_reviewer as i64)
        .bind(fmt_ts(user.created_at))
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::invalid("email", "already registered"))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => user_from_row(&row),
            None => Err(Error::NotFound("user")),
        }
    }

    /// Soft deactivation; tokens for inactive users stop resolving.
    pub async fn set_user_active(&self, id: Uuid, active: bool) -> Result<()> {
        let done = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("user"));
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
