//! Sentence embedding backends.
//!
//! `LocalEmbedder` runs a sentence-transformer in process through fastembed,
//! `RemoteEmbedder` calls an OpenAI-compatible `/embeddings` endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use tracing::info;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))
    }
}

/// Normalize a vector to unit length.
///
/// Returns the original vector when the norm is zero.
pub fn normalize_embedding(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec.to_vec()
    } else {
        vec.iter().map(|x| x / norm).collect()
    }
}

fn local_model(name: &str) -> Result<EmbeddingModel> {
    let short = name.trim_start_matches("sentence-transformers/");
    match short {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "intfloat/multilingual-e5-large" | "multilingual-e5-large" => {
            Ok(EmbeddingModel::MultilingualE5Large)
        }
        other => bail!("unsupported local embedding model: {other}"),
    }
}

/// In-process sentence transformer
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    /// Loads (and on first use downloads) the model. Blocking.
    pub fn new(model_name: &str) -> Result<Self> {
        let model = local_model(model_name)?;
        let embedding = TextEmbedding::try_new(InitOptions::new(model))
            .map_err(|error| anyhow!("failed to load embedding model {model_name}: {error:?}"))?;
        info!(model = model_name, "local embedding model loaded");
        Ok(Self {
            model: Arc::new(Mutex::new(embedding)),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;
            guard
                .embed(texts, None)
                .map_err(|error| anyhow!("failed to generate embeddings: {error:?}"))
        })
        .await
        .context("embedding task panicked")?
    }
}

/// OpenAI-compatible embeddings endpoint
pub struct RemoteEmbedder {
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

/// Derive the embeddings endpoint from a chat or completions url.
///
/// `http://localhost:11434/v1/chat/completions` becomes `http://localhost:11434/v1/embeddings`.
pub fn embeddings_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/embeddings") {
        base.to_string()
    } else if let Some(root) = base.strip_suffix("/chat/completions") {
        format!("{root}/embeddings")
    } else if let Some(root) = base.strip_suffix("/completions") {
        format!("{root}/embeddings")
    } else {
        format!("{base}/embeddings")
    }
}

impl RemoteEmbedder {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            url: embeddings_url(base_url),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(timeout_secs),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct SingleEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send(),
        )
        .await
        .context("Embedding request timed out")?
        .context("Embedding HTTP request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Embedding API error {}: {} (URL: {})", status, body, self.url);
        }

        let body_text = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        match serde_json::from_str::<EmbeddingResponse>(&body_text) {
            Ok(mut parsed) => {
                if parsed.data.len() != texts.len() {
                    bail!(
                        "Embedding API returned {} vectors for {} inputs",
                        parsed.data.len(),
                        texts.len()
                    );
                }
                parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
                Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
            }
            Err(e) => {
                // some servers answer a single input with a bare object
                if texts.len() == 1 {
                    if let Ok(single) = serde_json::from_str::<SingleEmbedding>(&body_text) {
                        return Ok(vec![single.embedding]);
                    }
                }
                bail!("Failed to parse Embedding response: {} (Body: {})", e, body_text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_yields_unit_vectors() {
        let v = normalize_embedding(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize_embedding(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn embeddings_url_is_inferred() {
        assert_eq!(
            embeddings_url("http://localhost:11434/v1/chat/completions"),
            "http://localhost:11434/v1/embeddings"
        );
        assert_eq!(
            embeddings_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            embeddings_url("http://host/v1/embeddings"),
            "http://host/v1/embeddings"
        );
        assert_eq!(
            embeddings_url("http://host/v1/completions"),
            "http://host/v1/embeddings"
        );
    }

    #[test]
    fn unknown_local_model_is_rejected() {
        assert!(local_model("sentence-transformers/all-MiniLM-L6-v2").is_ok());
        assert!(local_model("word2vec").is_err());
    }
}
