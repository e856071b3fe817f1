//! LLM integration
//!
//! Features:
//! - `LlmBackend` trait with per-call streaming
//! - Ollama chat-API backend with retry and exponential backoff
//! - Prompt templates for retrieval-augmented answering

pub mod backend;
pub mod prompt;

pub use backend::{FinishReason, GenerationResult, LlmBackend, OllamaBackend};
pub use prompt::{Message, Role, NO_ANSWER};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for docchat_core::Error {
    fn from(err: LlmError) -> Self {
        docchat_core::Error::Llm(err.to_string())
    }
}
