//! Registered bot users and their stored preferences (system prompt).

use chrono::Utc;
use common::api::UserInfo;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User {0} not found.")]
    NotFound(String),

    #[error("User with {0} already exists in the system.")]
    AlreadyExists(String),

    #[error("{field} {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(sqlx::FromRow)]
struct UserRow {
    username: String,
    chat_id: String,
    system_prompt: String,
    creation_date: f64,
}

impl From<UserRow> for UserInfo {
    fn from(row: UserRow) -> Self {
        UserInfo {
            username: row.username,
            chat_id: row.chat_id,
            system_prompt: row.system_prompt,
            creation_date: row.creation_date,
        }
    }
}

fn require_username(username: &str) -> StoreResult<()> {
    if username.trim().is_empty() {
        return Err(StoreError::Validation {
            field: "username",
            reason: "must not be empty",
        });
    }
    Ok(())
}

fn require_prompt(field: &'static str, prompt: &str) -> StoreResult<()> {
    if prompt.trim().is_empty() {
        return Err(StoreError::Validation {
            field,
            reason: "must not be empty",
        });
    }
    Ok(())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("2067") || db.message().contains("UNIQUE constraint")
        }
        _ => false,
    }
}

pub async fn has_user(pool: &SqlitePool, username: &str) -> StoreResult<bool> {
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Register a new user. Usernames are unique.
pub async fn add_user(
    pool: &SqlitePool,
    username: &str,
    system_prompt: &str,
    chat_id: &str,
) -> StoreResult<()> {
    require_username(username)?;
    require_prompt("system_prompt", system_prompt)?;

    if has_user(pool, username).await? {
        return Err(StoreError::AlreadyExists(username.to_string()));
    }

    let now = Utc::now().timestamp_millis() as f64 / 1000.0;
    sqlx::query(
        "INSERT INTO users (username, chat_id, system_prompt, creation_date) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(chat_id)
    .bind(system_prompt.trim())
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        // lost a race against a concurrent registration
        if is_unique_violation(&e) {
            StoreError::AlreadyExists(username.to_string())
        } else {
            StoreError::Database(e)
        }
    })?;

    info!(username, "user registered");
    Ok(())
}

/// Delete a user. Removing an unknown user is a no-op.
pub async fn remove_user(pool: &SqlitePool, username: &str) -> StoreResult<()> {
    require_username(username)?;
    let res = sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(username)
        .execute(pool)
        .await?;
    if res.rows_affected() > 0 {
        info!(username, "user removed");
    }
    Ok(())
}

pub async fn set_user_prompt(pool: &SqlitePool, username: &str, new_prompt: &str) -> StoreResult<()> {
    require_username(username)?;
    require_prompt("new_prompt", new_prompt)?;

    let res = sqlx::query("UPDATE users SET system_prompt = ? WHERE username = ?")
        .bind(new_prompt.trim())
        .bind(username)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound(username.to_string()));
    }
    info!(username, "system prompt updated");
    Ok(())
}

pub async fn get_user_info(pool: &SqlitePool, username: &str) -> StoreResult<UserInfo> {
    require_username(username)?;
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT username, chat_id, system_prompt, creation_date FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    row.map(UserInfo::from)
        .ok_or_else(|| StoreError::NotFound(username.to_string()))
}

/// All users, oldest registration first
pub async fn get_all_users(pool: &SqlitePool) -> StoreResult<Vec<UserInfo>> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT username, chat_id, system_prompt, creation_date FROM users ORDER BY creation_date ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(UserInfo::from).collect())
}
