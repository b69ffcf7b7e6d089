/*!
common/src/lib.rs

Shared configuration types and DB helper functions for CryptoPulse.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader that merges a default file with an optional override
- A helper to initialize an SQLite pool for the service database
- The JSON wire models exchanged between the API service and the bot (`api`)
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

pub mod api;

/// HTTP server bind settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/cryptopulse.db")
    pub path: String,
}

/// Answer generation endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: Option<u64>,
    /// "plain" or "rag_assistant"
    pub prompt_style: Option<String>,
}

/// Embedding backend used for indexing and queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (in-process sentence transformer) or "remote" (OpenAI-compatible)
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Vector index location and chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub path: String,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
}

/// A relational table holding news records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_text_column")]
    pub text_column: String,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_text_column() -> String {
    "text".to_string()
}

/// Simple feed descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub title: Option<String>,
}

/// Where the documents of the index come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Name of the env var holding the PostgreSQL URL for `tables`
    pub postgres_url_env: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
    pub fetch_timeout_seconds: Option<u64>,
}

/// Answer cache sizing; capacity 0 disables caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: Option<usize>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub max_messages: Option<usize>,
}

/// Telegram bot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub api_base_url: Option<String>,
    pub token_env: Option<String>,
    pub report_interval_hours: Option<u64>,
    pub request_timeout_seconds: Option<u64>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Option<ServerConfig>,
    pub database: DatabaseConfig,
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub index: Option<IndexConfig>,
    #[serde(default)]
    pub sources: SourcesConfig,
    pub cache: Option<CacheConfig>,
    pub history: Option<HistoryConfig>,
    pub bot: Option<BotConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Socket address pieces for the HTTP server (defaults: 0.0.0.0:8000)
    pub fn server_address(&self) -> (String, u16) {
        let server = self.server.as_ref();
        (
            server
                .and_then(|s| s.bind.clone())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            server.and_then(|s| s.port).unwrap_or(8000),
        )
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory and the DB file if necessary and returns a
/// `SqlitePool` in WAL mode with a modest pool size (5 connections).
///
/// Example:
///   let pool = init_db_pool("data/cryptopulse.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Surface permission or path problems before sqlx does.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}
