//! Persistent vector index over document chunks.
//!
//! Vectors live in a usearch HNSW index (cosine metric); the chunk texts are
//! kept alongside in a docstore keyed by insertion position. On disk the
//! index is written to `<path>` and the docstore to `<path>.meta.json`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::embedding::{normalize_embedding, Embedder};

const EMBED_BATCH_SIZE: usize = 64;

/// One retrievable piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Id of the source record the text was taken from
    pub id: String,
    /// Table name or feed url
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Document,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

#[derive(Serialize, Deserialize)]
struct IndexMeta {
    dimensions: usize,
    documents: Vec<Document>,
}

pub struct VectorIndex {
    inner: Option<Index>,
    documents: Vec<Document>,
    dimensions: usize,
}

fn new_usearch_index(dimensions: usize) -> Result<Index> {
    Index::new(&IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        ..Default::default()
    })
    .map_err(|e| anyhow!("failed to create vector index: {e}"))
}

pub fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".meta.json");
    PathBuf::from(name)
}

impl VectorIndex {
    /// An index with no documents; every search returns nothing
    pub fn empty() -> Self {
        Self {
            inner: None,
            documents: Vec::new(),
            dimensions: 0,
        }
    }

    /// Embed `documents` in batches and index them.
    pub async fn build(embedder: &dyn Embedder, documents: Vec<Document>) -> Result<Self> {
        if documents.is_empty() {
            return Ok(Self::empty());
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        for (n, batch) in documents.chunks(EMBED_BATCH_SIZE).enumerate() {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let embedded = embedder
                .embed_documents(&texts)
                .await
                .with_context(|| format!("failed to embed batch {n}"))?;
            if embedded.len() != texts.len() {
                bail!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                );
            }
            vectors.extend(embedded);
            debug!(batch = n, total = vectors.len(), "embedded batch");
        }

        let dimensions = vectors[0].len();
        if dimensions == 0 {
            bail!("embedder returned empty vectors");
        }

        let index = new_usearch_index(dimensions)?;
        index
            .reserve(vectors.len())
            .map_err(|e| anyhow!("failed to reserve index capacity: {e}"))?;
        for (key, vector) in vectors.iter().enumerate() {
            if vector.len() != dimensions {
                bail!(
                    "vector {key} has {} dimensions, expected {dimensions}",
                    vector.len()
                );
            }
            index
                .add(key as u64, &normalize_embedding(vector))
                .map_err(|e| anyhow!("failed to add vector {key}: {e}"))?;
        }

        info!(documents = documents.len(), dimensions, "vector index built");
        Ok(Self {
            inner: Some(index),
            documents,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Distinct sources present in the docstore, in first-seen order
    pub fn sources(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for doc in &self.documents {
            if !seen.contains(&doc.source) {
                seen.push(doc.source.clone());
            }
        }
        seen
    }

    /// The `k` nearest chunks to `query`, closest first. `k` is clamped to the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(index) = &self.inner else {
            return Ok(Vec::new());
        };
        let k = k.min(self.documents.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            bail!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            );
        }

        let matches = index
            .search(&normalize_embedding(query), k)
            .map_err(|e| anyhow!("vector search failed: {e}"))?;

        let hits = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(&key, &distance)| {
                self.documents.get(key as usize).map(|doc| SearchHit {
                    document: doc.clone(),
                    score: 1.0 - distance,
                })
            })
            .collect();
        Ok(hits)
    }

    /// Write the index and its docstore next to each other.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let index = self
            .inner
            .as_ref()
            .ok_or_else(|| anyhow!("refusing to save an empty index"))?;
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("index path is not valid UTF-8: {}", path.display()))?;
        index
            .save(path_str)
            .map_err(|e| anyhow!("failed to save vector index to {path_str}: {e}"))?;

        let meta = IndexMeta {
            dimensions: self.dimensions,
            documents: self.documents.clone(),
        };
        let meta_file = meta_path(path);
        let json = serde_json::to_vec(&meta).context("failed to serialize docstore")?;
        std::fs::write(&meta_file, json)
            .with_context(|| format!("failed to write {}", meta_file.display()))?;

        info!(path = %path.display(), documents = self.documents.len(), "vector index saved");
        Ok(())
    }

    /// True when both the index file and its docstore exist
    pub fn exists(path: &Path) -> bool {
        path.is_file() && meta_path(path).is_file()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let meta_file = meta_path(path);
        let raw = std::fs::read(&meta_file)
            .with_context(|| format!("failed to read {}", meta_file.display()))?;
        let meta: IndexMeta =
            serde_json::from_slice(&raw).context("failed to parse index docstore")?;
        if meta.dimensions == 0 {
            bail!("index docstore declares zero dimensions");
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("index path is not valid UTF-8: {}", path.display()))?;
        let index = new_usearch_index(meta.dimensions)?;
        index
            .load(path_str)
            .map_err(|e| anyhow!("failed to load vector index from {path_str}: {e}"))?;

        if index.dimensions() != meta.dimensions {
            bail!(
                "index has {} dimensions but docstore says {}",
                index.dimensions(),
                meta.dimensions
            );
        }
        if index.size() != meta.documents.len() {
            bail!(
                "index holds {} vectors but docstore has {} documents",
                index.size(),
                meta.documents.len()
            );
        }

        info!(path = %path.display(), documents = meta.documents.len(), "vector index loaded");
        Ok(Self {
            inner: Some(index),
            documents: meta.documents,
            dimensions: meta.dimensions,
        })
    }
}
