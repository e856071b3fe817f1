//! Core types and traits for the docchat RAG pipeline
//!
//! This crate provides the foundational pieces shared by all other crates:
//! - `Document` and `DocMetadata`, the unit of retrieval
//! - Collaborator traits for pluggable backends (vector index, embedder,
//!   cross-encoder)
//! - Token-count heuristics for context budgeting
//! - Error types

pub mod document;
pub mod error;
pub mod tokens;
pub mod traits;

pub use document::{DocMetadata, Document, ScoredDoc};
pub use error::{Error, Result};
pub use tokens::{count_tokens, truncate_to_tokens};
pub use traits::{CrossEncoderModel, Embedder, VectorIndex};
