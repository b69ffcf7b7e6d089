use anyhow::{Context, Result};
use common::api::HistoryEntry;
use sqlx::SqlitePool;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// Store a chat message
pub async fn store_message(
    pool: &SqlitePool,
    username: &str,
    role: &str,
    content: &str,
) -> Result<HistoryEntry> {
    let result = sqlx::query(
        r#"
        INSERT INTO chat_messages (username, role, content)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(role)
    .bind(content)
    .execute(pool)
    .await
    .context("Failed to insert message")?;

    let message_id = result.last_insert_rowid();

    let row = sqlx::query_as::<_, ChatMessageRow>(
        r#"
        SELECT id, role, content, created_at
        FROM chat_messages
        WHERE id = ?
        "#,
    )
    .bind(message_id)
    .fetch_one(pool)
    .await
    .context("Failed to fetch inserted message")?;

    Ok(row.into())
}

/// Get the last `limit` messages of a user, oldest first
pub async fn get_messages(pool: &SqlitePool, username: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
    let mut rows = sqlx::query_as::<_, ChatMessageRow>(
        r#"
        SELECT id, role, content, created_at
        FROM chat_messages
        WHERE username = ?
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(username)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("Failed to fetch messages")?;

    rows.reverse();
    Ok(rows.into_iter().map(HistoryEntry::from).collect())
}

/// Keep only the newest `keep` messages of a user
pub async fn trim(pool: &SqlitePool, username: &str, keep: usize) -> Result<u64> {
    let res = sqlx::query(
        r#"
        DELETE FROM chat_messages
        WHERE username = ?
        AND id NOT IN (
            SELECT id FROM chat_messages WHERE username = ? ORDER BY id DESC LIMIT ?
        )
        "#,
    )
    .bind(username)
    .bind(username)
    .bind(keep as i64)
    .execute(pool)
    .await
    .context("Failed to trim history")?;
    Ok(res.rows_affected())
}

pub async fn clear(pool: &SqlitePool, username: &str) -> Result<()> {
    sqlx::query("DELETE FROM chat_messages WHERE username = ?")
        .bind(username)
        .execute(pool)
        .await
        .context("Failed to clear history")?;
    Ok(())
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct ChatMessageRow {
    #[allow(dead_code)]
    id: i64,
    role: String,
    content: String,
    created_at: String,
}

impl From<ChatMessageRow> for HistoryEntry {
    fn from(row: ChatMessageRow) -> Self {
        HistoryEntry {
            role: row.role,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ensure_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");
        ensure_schema(&pool).await.expect("schema");
        pool
    }

    #[tokio::test]
    async fn messages_come_back_oldest_first() {
        let pool = setup_test_db().await;
        store_message(&pool, "alice", ROLE_USER, "What moved BTC?").await.unwrap();
        store_message(&pool, "alice", ROLE_ASSISTANT, "ETF inflows.").await.unwrap();
        store_message(&pool, "bob", ROLE_USER, "unrelated").await.unwrap();

        let msgs = get_messages(&pool, "alice", 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "user");
        assert_eq!(msgs[1].content, "ETF inflows.");
        assert!(!msgs[0].created_at.is_empty());
    }

    #[tokio::test]
    async fn limit_returns_newest_window() {
        let pool = setup_test_db().await;
        for i in 0..5 {
            store_message(&pool, "alice", ROLE_USER, &format!("m{i}")).await.unwrap();
        }
        let msgs = get_messages(&pool, "alice", 2).await.unwrap();
        let contents: Vec<_> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn trim_and_clear() {
        let pool = setup_test_db().await;
        for i in 0..6 {
            store_message(&pool, "alice", ROLE_USER, &format!("m{i}")).await.unwrap();
        }
        store_message(&pool, "bob", ROLE_USER, "keep me").await.unwrap();

        let removed = trim(&pool, "alice", 4).await.unwrap();
        assert_eq!(removed, 2);
        let msgs = get_messages(&pool, "alice", 100).await.unwrap();
        assert_eq!(msgs.first().map(|m| m.content.as_str()), Some("m2"));

        clear(&pool, "alice").await.unwrap();
        assert!(get_messages(&pool, "alice", 100).await.unwrap().is_empty());
        assert_eq!(get_messages(&pool, "bob", 100).await.unwrap().len(), 1);
    }
}
