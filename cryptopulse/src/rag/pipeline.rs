//! Retrieval-augmented answering: retrieve the closest chunks for a question,
//! wrap them in a prompt and let the decoder answer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::cache::AnswerCache;
use super::embedding::Embedder;
use super::index::{SearchHit, VectorIndex};
use super::prompt::{render_prompt, PromptStyle};
use super::splitter::RecursiveSplitter;
use super::RagError;
use crate::llm::{LlmProvider, LlmRequest};
use crate::sources::{collect_documents, DocumentSource};

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub index_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub prompt_style: PromptStyle,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/index/news.usearch"),
            chunk_size: 512,
            chunk_overlap: 64,
            top_k: 5,
            prompt_style: PromptStyle::Plain,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Ids of the records the context was drawn from, without duplicates
    pub sources: Vec<String>,
    pub cached: bool,
}

pub struct RagPipeline {
    settings: RagSettings,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmProvider>,
    index: VectorIndex,
    cache: Option<AnswerCache>,
}

impl RagPipeline {
    pub fn new(
        settings: RagSettings,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmProvider>,
        index: VectorIndex,
        cache: Option<AnswerCache>,
    ) -> Self {
        Self {
            settings,
            embedder,
            llm,
            index,
            cache,
        }
    }

    /// Load the persisted index, or build it from `sources` and persist it.
    pub async fn initialize(
        settings: RagSettings,
        sources: &[Box<dyn DocumentSource>],
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmProvider>,
        cache: Option<AnswerCache>,
    ) -> Result<Self> {
        let index = if VectorIndex::exists(&settings.index_path) {
            VectorIndex::load(&settings.index_path).with_context(|| {
                format!("failed to load index from {}", settings.index_path.display())
            })?
        } else {
            info!(path = %settings.index_path.display(), "no index on disk, building it");
            let index = Self::build_index(&settings, embedder.as_ref(), sources).await?;
            if index.is_empty() {
                warn!("index is empty and was not saved; /predict will be unavailable");
            } else {
                index.save(&settings.index_path)?;
            }
            index
        };
        Ok(Self::new(settings, embedder, llm, index, cache))
    }

    /// Collect, split and embed the documents of every source.
    pub async fn build_index(
        settings: &RagSettings,
        embedder: &dyn Embedder,
        sources: &[Box<dyn DocumentSource>],
    ) -> Result<VectorIndex> {
        let documents = collect_documents(sources).await;
        let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap);
        let chunks = splitter.split_documents(&documents);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "documents split into chunks"
        );
        VectorIndex::build(embedder, chunks).await
    }

    /// (chunks, dimensions) of the loaded index
    pub fn stats(&self) -> (usize, usize) {
        (self.index.len(), self.index.dimensions())
    }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        let index = &self.index;
        if index.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;
        let hits = index
            .search(&query, self.settings.top_k)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;
        if hits.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        Ok(hits)
    }

    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|h| h.document.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cache_key(&self, question: &str, preferences: Option<&str>) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.llm.model().hash(&mut hasher);
        preferences.map(str::trim).unwrap_or("").hash(&mut hasher);
        question.hash(&mut hasher);
        hasher.finish()
    }

    /// Answer `question`, steering the decoder with the user's stored preferences.
    pub async fn run(&self, question: &str, preferences: Option<&str>) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let key = self.cache_key(question, preferences);
        if let Some(mut answer) = self.cache.as_ref().and_then(|c| c.get(key)) {
            debug!("answer served from cache");
            answer.cached = true;
            return Ok(answer);
        }

        let hits = self.retrieve(question).await?;
        let context = Self::build_context(&hits);
        let prompt = render_prompt(self.settings.prompt_style, question, &context, preferences);

        let mut request = LlmRequest::new(prompt);
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;

        let response = self
            .llm
            .generate(request)
            .await
            .map_err(|e| RagError::Generation(format!("{e:#}")))?;

        let mut sources: Vec<String> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.document.id) {
                sources.push(hit.document.id.clone());
            }
        }

        info!(
            model = %response.model,
            chunks = hits.len(),
            tokens = response.usage.total_tokens,
            "answer generated"
        );

        let answer = Answer {
            text: response.content,
            sources,
            cached: false,
        };
        if let Some(cache) = &self.cache {
            cache.put(key, answer.clone());
        }
        Ok(answer)
    }
}
