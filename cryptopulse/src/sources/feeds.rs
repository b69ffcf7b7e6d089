use anyhow::{Context, Result};
use async_trait::async_trait;
use common::FeedConfig;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};

use super::{DocumentSource, SourceRecord};

/// Fetches a feed from the given URL and parses it.
/// Server errors, rate limiting and network failures are retried with backoff.
pub async fn fetch_and_parse_feed(url: &str, timeout_secs: u64) -> Result<Feed> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("CryptoPulse/0.1.0")
        .build()
        .context("failed to build reqwest client")?;

    let max_retries = 3;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        if attempt > 1 {
            let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s
            tracing::info!(
                "Retrying feed fetch for {} (attempt {}/{}) after {:?}...",
                url,
                attempt,
                max_retries,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                    return Ok(feed);
                } else if status.is_server_error() {
                    last_error = Some(anyhow::anyhow!("server error: {}", status));
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("rate limited: {}", status));
                } else {
                    // 4xx is permanent
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| html.trim().to_string())
}

/// Turn a feed entry into a record: `title\n\nbody`, keyed by its first link.
pub fn entry_to_record(entry: &Entry, origin: &str) -> SourceRecord {
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .unwrap_or_default();
    let body = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .map(|b| html_to_text(&b))
        .unwrap_or_default();

    let text = match (title.is_empty(), body.is_empty()) {
        (true, true) => None,
        (false, true) => Some(title),
        (true, false) => Some(body),
        (false, false) => Some(format!("{title}\n\n{body}")),
    };

    let id = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_else(|| entry.id.clone());

    SourceRecord {
        id,
        origin: origin.to_string(),
        text,
    }
}

/// RSS/Atom feeds
pub struct RssFeeds {
    feeds: Vec<FeedConfig>,
    timeout_secs: u64,
}

impl RssFeeds {
    pub fn new(feeds: Vec<FeedConfig>, timeout_secs: u64) -> Self {
        Self {
            feeds,
            timeout_secs,
        }
    }
}

#[async_trait]
impl DocumentSource for RssFeeds {
    fn name(&self) -> &str {
        "feeds"
    }

    async fn load(&self) -> Result<Vec<SourceRecord>> {
        let mut records = Vec::new();
        for feed_cfg in &self.feeds {
            let label = feed_cfg.title.as_deref().unwrap_or(&feed_cfg.url);
            match fetch_and_parse_feed(&feed_cfg.url, self.timeout_secs).await {
                Ok(feed) => {
                    info!(feed = label, entries = feed.entries.len(), "feed fetched");
                    records.extend(
                        feed.entries
                            .iter()
                            .map(|entry| entry_to_record(entry, &feed_cfg.url)),
                    );
                }
                Err(e) => error!(feed = label, "failed to fetch feed: {:#}", e),
            }
        }
        Ok(records)
    }
}
