//! LLM backend implementations
//!
//! The pipeline talks to the model through `LlmBackend`; the only concrete
//! backend is Ollama's chat API. Transient failures are retried here with
//! exponential backoff, so callers never implement their own retry.

use std::time::Duration;

use async_trait::async_trait;
use docchat_config::LlmSettings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::{self, Message};
use crate::LlmError;

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    /// Finish reason
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    /// Result carrying only text, for synthetic responses
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            total_time_ms: 0,
            finish_reason: FinishReason::Stop,
        }
    }
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
}

/// LLM backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Generate with streaming; tokens go to `tx`, the full text is also
    /// returned. A closed receiver cancels generation without error.
    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    /// Check if the model is reachable
    async fn is_available(&self) -> bool;

    /// Get model name
    fn model_name(&self) -> &str;

    /// Rewrite a follow-up question as a standalone question, given the
    /// dialog so far as (user, assistant) turns. Non-streaming.
    async fn rewrite_to_standalone(
        &self,
        dialog: &[(String, String)],
        query: &str,
    ) -> Result<String, LlmError> {
        let history = dialog
            .iter()
            .map(|(user, assistant)| format!("user: {}\nassistant: {}", user, assistant))
            .collect::<Vec<_>>()
            .join("\n");
        let result = self
            .generate(&[Message::user(prompt::standalone_query(&history, query))])
            .await?;
        Ok(result.text.trim().to_string())
    }
}

/// Ollama chat-API backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    settings: LlmSettings,
}

impl OllamaBackend {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| {
                LlmError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, settings })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.settings.endpoint, path)
    }

    fn build_request(&self, messages: &[Message], stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.settings.model.clone(),
            messages: messages.iter().map(|m| m.into()).collect(),
            stream,
            options: Some(OllamaOptions {
                temperature: Some(self.settings.temperature),
                num_predict: Some(self.settings.max_tokens as i32),
            }),
        }
    }

    async fn execute_request(
        &self,
        request: &OllamaChatRequest,
    ) -> Result<OllamaChatResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            // 5xx errors are retryable, 4xx are not
            if status.is_server_error() {
                return Err(LlmError::Network(format!(
                    "Server error {}: {}",
                    status, error
                )));
            }
            return Err(LlmError::Api(error));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    /// Generate with exponential-backoff retry for transient failures
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = self.build_request(messages, false);

        let mut last_error = None;
        let mut backoff = Duration::from_millis(self.settings.initial_backoff_ms);

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    "LLM request failed, retrying in {:?} (attempt {}/{})",
                    backoff,
                    attempt,
                    self.settings.max_retries
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&request).await {
                Ok(result) => {
                    return Ok(GenerationResult {
                        text: result.message.content,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: if result.done {
                            FinishReason::Stop
                        } else {
                            FinishReason::Length
                        },
                    });
                }
                Err(e) if Self::is_retryable(&e) => {
                    last_error = Some(e);
                }
                Err(e) => {
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        use futures::StreamExt;

        let start = std::time::Instant::now();
        let request = self.build_request(messages, true);

        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(error));
        }

        let mut full_response = String::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            let text = String::from_utf8_lossy(&chunk);

            // NDJSON: one chunk object per line
            for line in text.lines() {
                if line.is_empty() {
                    continue;
                }

                if let Ok(chunk_response) = serde_json::from_str::<OllamaStreamChunk>(line) {
                    let token = &chunk_response.message.content;
                    full_response.push_str(token);

                    if tx.send(token.clone()).await.is_err() {
                        // Channel closed, generation cancelled
                        return Ok(GenerationResult {
                            text: full_response,
                            total_time_ms: start.elapsed().as_millis() as u64,
                            finish_reason: FinishReason::Cancelled,
                        });
                    }

                    if chunk_response.done {
                        break;
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_response,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.settings.endpoint))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    done: bool,
}
