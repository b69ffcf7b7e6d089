use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Ensure the required schema exists. This runs CREATE TABLE IF NOT EXISTS statements for core tables.
/// This function is idempotent and safe to call at startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    tracing::info!("storage: ensuring DB schema (CREATE TABLE IF NOT EXISTS ...)");

    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            chat_id TEXT NOT NULL DEFAULT '',
            system_prompt TEXT NOT NULL,
            creation_date REAL NOT NULL
        );
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );
        "#,
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_username ON chat_messages (username, id);",
    ];

    for s in &stmts {
        sqlx::query(s)
            .execute(pool)
            .await
            .with_context(|| "failed to ensure schema")?;
    }

    tracing::info!("storage: DB schema ensured");
    Ok(())
}
