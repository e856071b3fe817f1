//! Retrieval-and-reranking pipeline for grounded document QA
//!
//! Features:
//! - Hybrid retrieval: semantic (vector index) + BM25 (tantivy) + fuzzy
//!   word-window matching, merged with id-level dedup
//! - Context-window expansion of chunk hits into their neighbors
//! - Cross-encoder reranking (ONNX behind the `onnx` feature, keyword
//!   fallback otherwise), diversity and periphery reordering
//! - LLM query expansion (standalone rewrite, hypothetical answer, rephrases)
//! - Concurrent verbatim extraction and cited answer synthesis
//! - `DocChatAgent` composition root with ingest, dialog history and
//!   summarization

pub mod agent;
pub mod answer;
pub mod corpus;
pub mod extractor;
pub mod fuzzy;
pub mod lexical;
pub mod memory_index;
pub mod qdrant_index;
pub mod query_expansion;
pub mod reranker;
pub mod retriever;

pub use agent::DocChatAgent;
pub use answer::AnswerSynthesizer;
pub use corpus::{preprocess_text, CorpusSnapshot};
pub use extractor::VerbatimExtractor;
pub use lexical::LexicalIndex;
pub use memory_index::{HashEmbedder, MemoryVectorIndex};
pub use qdrant_index::QdrantIndex;
pub use query_expansion::QueryExpander;
pub use reranker::{rerank_to_periphery, rerank_with_diversity, CrossEncoderReranker, KeywordScorer};
pub use retriever::Retriever;

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for docchat_core::Error {
    fn from(err: RagError) -> Self {
        docchat_core::Error::Rag(err.to_string())
    }
}

impl From<docchat_llm::LlmError> for RagError {
    fn from(err: docchat_llm::LlmError) -> Self {
        RagError::Llm(err.to_string())
    }
}

impl From<docchat_core::Error> for RagError {
    fn from(err: docchat_core::Error) -> Self {
        match err {
            docchat_core::Error::VectorIndex(msg) => RagError::VectorStore(msg),
            docchat_core::Error::Llm(msg) => RagError::Llm(msg),
            docchat_core::Error::Config(msg) => RagError::Configuration(msg),
            other => RagError::Search(other.to_string()),
        }
    }
}
