//! Retrieval-augmented generation over the crypto news corpus.

use thiserror::Error;

pub mod cache;
pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod prompt;
pub mod splitter;

pub use cache::AnswerCache;
pub use embedding::{Embedder, LocalEmbedder, RemoteEmbedder};
pub use index::{Document, SearchHit, VectorIndex};
pub use pipeline::{Answer, RagPipeline, RagSettings};
pub use prompt::PromptStyle;
pub use splitter::RecursiveSplitter;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("prompt must not be empty")]
    EmptyQuestion,

    #[error("No matching documents found in the index.")]
    EmptyIndex,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("answer generation failed: {0}")]
    Generation(String),
}
