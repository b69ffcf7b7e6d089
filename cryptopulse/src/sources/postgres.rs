use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use common::TableConfig;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use super::{is_identifier, DocumentSource, SourceRecord};

/// News records stored in PostgreSQL tables
pub struct PostgresTables {
    url_env: String,
    tables: Vec<TableConfig>,
}

impl PostgresTables {
    pub fn new(url_env: impl Into<String>, tables: Vec<TableConfig>) -> Self {
        Self {
            url_env: url_env.into(),
            tables,
        }
    }

    fn database_url(&self) -> Result<String> {
        std::env::var(&self.url_env)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow!("Database URL is not defined."))
    }
}

/// `SELECT` reading the id and text columns of a table as strings
pub fn select_query(table: &TableConfig) -> Result<String> {
    for name in [&table.name, &table.id_column, &table.text_column] {
        if !is_identifier(name) {
            bail!("invalid SQL identifier: {name:?}");
        }
    }
    Ok(format!(
        "SELECT CAST({} AS TEXT) AS id, CAST({} AS TEXT) AS text FROM {}",
        table.id_column, table.text_column, table.name
    ))
}

#[async_trait]
impl DocumentSource for PostgresTables {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn load(&self) -> Result<Vec<SourceRecord>> {
        let url = self.database_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .context("failed to connect to PostgreSQL")?;

        let mut records = Vec::new();
        for table in &self.tables {
            let query = match select_query(table) {
                Ok(q) => q,
                Err(e) => {
                    error!(table = %table.name, "skipping table: {:#}", e);
                    continue;
                }
            };
            match sqlx::query_as::<_, (Option<String>, Option<String>)>(&query)
                .fetch_all(&pool)
                .await
            {
                Ok(rows) => {
                    info!(table = %table.name, rows = rows.len(), "table loaded");
                    records.extend(rows.into_iter().enumerate().map(|(n, (id, text))| {
                        SourceRecord {
                            id: id.unwrap_or_else(|| format!("{}:{}", table.name, n)),
                            origin: table.name.clone(),
                            text,
                        }
                    }));
                }
                Err(e) => error!(table = %table.name, "failed to read table: {}", e),
            }
        }

        pool.close().await;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, id: &str, text: &str) -> TableConfig {
        TableConfig {
            name: name.into(),
            id_column: id.into(),
            text_column: text.into(),
        }
    }

    #[test]
    fn query_casts_both_columns() {
        let q = select_query(&table("public.crypto_news", "id", "body")).unwrap();
        assert_eq!(
            q,
            "SELECT CAST(id AS TEXT) AS id, CAST(body AS TEXT) AS text FROM public.crypto_news"
        );
    }

    #[test]
    fn injected_names_are_rejected() {
        assert!(select_query(&table("news", "id", "text FROM users --")).is_err());
        assert!(select_query(&table("news;", "id", "text")).is_err());
    }

    #[tokio::test]
    async fn missing_url_is_reported() {
        let source = PostgresTables::new(
            "CRYPTOPULSE_TEST_UNSET_DB_URL",
            vec![table("news", "id", "text")],
        );
        let err = source.load().await.unwrap_err();
        assert_eq!(err.to_string(), "Database URL is not defined.");
    }
}
