//! Where the documents of the vector index come from.

use anyhow::Result;
use async_trait::async_trait;
use common::SourcesConfig;
use tracing::{error, info, warn};

use crate::rag::Document;

pub mod feeds;
pub mod postgres;

pub use feeds::RssFeeds;
pub use postgres::PostgresTables;

/// A raw record before it becomes an indexed document
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: String,
    /// Table or feed the record was read from
    pub origin: String,
    pub text: Option<String>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self) -> Result<Vec<SourceRecord>>;
}

/// Instantiate the sources declared in the configuration
pub fn from_config(config: &SourcesConfig) -> Vec<Box<dyn DocumentSource>> {
    let mut sources: Vec<Box<dyn DocumentSource>> = Vec::new();
    if !config.tables.is_empty() {
        let url_env = config
            .postgres_url_env
            .clone()
            .unwrap_or_else(|| "DB_URL".to_string());
        sources.push(Box::new(PostgresTables::new(url_env, config.tables.clone())));
    }
    if !config.feeds.is_empty() {
        sources.push(Box::new(RssFeeds::new(
            config.feeds.clone(),
            config.fetch_timeout_seconds.unwrap_or(10),
        )));
    }
    sources
}

/// Load every source; a failing source is logged and skipped.
/// Records without text are dropped.
pub async fn collect_documents(sources: &[Box<dyn DocumentSource>]) -> Vec<Document> {
    let mut documents = Vec::new();
    for source in sources {
        match source.load().await {
            Ok(records) => {
                let before = documents.len();
                documents.extend(records.into_iter().filter_map(|r| {
                    let text = r.text?.trim().to_string();
                    if text.is_empty() {
                        return None;
                    }
                    Some(Document {
                        id: r.id,
                        source: r.origin,
                        text,
                    })
                }));
                info!(
                    source = source.name(),
                    documents = documents.len() - before,
                    "source loaded"
                );
            }
            Err(e) => error!(source = source.name(), "failed to load source: {:#}", e),
        }
    }
    if documents.is_empty() {
        warn!("no documents collected from {} source(s)", sources.len());
    }
    documents
}

/// Plain SQL identifier, optionally schema-qualified
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct Fixed(Vec<SourceRecord>);

    #[async_trait]
    impl DocumentSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn load(&self) -> Result<Vec<SourceRecord>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl DocumentSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn load(&self) -> Result<Vec<SourceRecord>> {
            bail!("Database URL is not defined.")
        }
    }

    fn record(id: &str, text: Option<&str>) -> SourceRecord {
        SourceRecord {
            id: id.into(),
            origin: "crypto_news".into(),
            text: text.map(String::from),
        }
    }

    #[tokio::test]
    async fn empty_records_are_dropped_and_failures_skipped() {
        let sources: Vec<Box<dyn DocumentSource>> = vec![
            Box::new(Broken),
            Box::new(Fixed(vec![
                record("1", Some(" BTC up ")),
                record("2", None),
                record("3", Some("  ")),
            ])),
        ];
        let docs = collect_documents(&sources).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "1");
        assert_eq!(docs[0].text, "BTC up");
        assert_eq!(docs[0].source, "crypto_news");
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("crypto_news"));
        assert!(is_identifier("public.crypto_news"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier("1table"));
        assert!(!is_identifier("news; DROP TABLE users"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn sources_follow_config() {
        let config = SourcesConfig::default();
        assert!(from_config(&config).is_empty());

        let config = SourcesConfig {
            postgres_url_env: None,
            tables: vec![common::TableConfig {
                name: "news".into(),
                id_column: "id".into(),
                text_column: "text".into(),
            }],
            feeds: vec![common::FeedConfig {
                url: "https://example.com/rss".into(),
                title: None,
            }],
            fetch_timeout_seconds: None,
        };
        let names: Vec<String> = from_config(&config)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["postgres", "feeds"]);
    }
}
