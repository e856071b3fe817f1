//! Workspace-wide error type
//!
//! Each crate defines its own `thiserror` enum and converts into this one
//! at crate boundaries.

use thiserror::Error;

/// Top-level error for the docchat workspace
#[derive(Error, Debug)]
pub enum Error {
    /// A required collaborator is missing or misconfigured.
    /// Raised immediately at the call site that needs it, never defaulted.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Retrieval error: {0}")]
    Rag(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("{0}")]
    Other(String),
}

/// Workspace result alias
pub type Result<T> = std::result::Result<T, Error>;
