//! Verbatim extraction
//!
//! One LLM call per retrieved passage, run concurrently, pulling out the
//! sentences that actually bear on the question. Passages the model marks
//! as irrelevant are dropped; the rest keep their original metadata so
//! sources survive into the final answer.

use std::sync::Arc;

use docchat_core::Document;
use docchat_llm::{prompt, LlmBackend, NO_ANSWER};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::RagError;

pub struct VerbatimExtractor {
    llm: Arc<dyn LlmBackend>,
}

impl VerbatimExtractor {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Extract relevant verbatim text from each passage.
    ///
    /// Output order follows input order regardless of which call finishes
    /// first. A failed call drops only its own passage.
    pub async fn extract(
        &self,
        query: &str,
        passages: &[Document],
    ) -> Result<Vec<Document>, RagError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let futures = passages.iter().map(|passage| {
            let messages = vec![prompt::Message::user(prompt::verbatim_extract(
                query,
                &passage.content,
            ))];
            async move { self.llm.generate(&messages).await }
        });

        let results = join_all(futures).await;

        let mut extracts = Vec::new();
        for (passage, result) in passages.iter().zip(results) {
            let text = match result {
                Ok(r) => r.text.trim().to_string(),
                Err(e) => {
                    warn!(source = %passage.metadata.source, error = %e, "extraction call failed");
                    continue;
                }
            };
            if text.is_empty() || text == NO_ANSWER {
                continue;
            }

            let mut extract = passage.clone();
            extract.content = text;
            extracts.push(extract);
        }

        debug!(
            passages = passages.len(),
            extracts = extracts.len(),
            "verbatim extraction done"
        );
        Ok(extracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_llm::{GenerationResult, LlmError, Message};
    use tokio::sync::mpsc;

    /// Echoes back a canned extract keyed on a marker inside the passage.
    struct ScriptedLlm;

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
            let prompt_text = &messages[0].content;
            if prompt_text.contains("IRRELEVANT") {
                Ok(GenerationResult::from_text(NO_ANSWER.to_string()))
            } else if prompt_text.contains("BROKEN") {
                Err(LlmError::Network("connection reset".to_string()))
            } else if prompt_text.contains("gold loan") {
                Ok(GenerationResult::from_text(
                    "rates start at nine percent".to_string(),
                ))
            } else {
                Ok(GenerationResult::from_text(String::new()))
            }
        }

        async fn generate_stream(
            &self,
            messages: &[Message],
            _tx: mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            self.generate(messages).await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_irrelevant_failed_and_empty_passages_are_dropped() {
        let extractor = VerbatimExtractor::new(Arc::new(ScriptedLlm));
        let passages = vec![
            Document::new("gold loan rates start at nine percent annually", "rates.md"),
            Document::new("IRRELEVANT office seating chart", "seating.md"),
            Document::new("BROKEN passage", "broken.md"),
            Document::new("nothing to say", "empty.md"),
        ];

        let extracts = extractor
            .extract("what are the rates", &passages)
            .await
            .unwrap();

        assert_eq!(extracts.len(), 1);
        assert_eq!(extracts[0].content, "rates start at nine percent");
        assert_eq!(extracts[0].metadata.source, "rates.md");
    }

    #[tokio::test]
    async fn test_extracts_keep_full_passage_metadata() {
        let extractor = VerbatimExtractor::new(Arc::new(ScriptedLlm));
        let mut passage = Document::new("gold loan rates start at nine percent annually", "rates.md")
            .with_id("c7")
            .with_extra("section", "pricing");
        passage.metadata.is_chunk = true;
        passage.metadata.window_ids = vec!["c6".to_string(), "c7".to_string(), "c8".to_string()];

        let extracts = extractor
            .extract("what are the rates", &[passage.clone()])
            .await
            .unwrap();

        assert_eq!(extracts.len(), 1);
        assert_ne!(extracts[0].content, passage.content);
        assert_eq!(extracts[0].metadata, passage.metadata);
    }

    #[tokio::test]
    async fn test_no_passages_yields_no_extracts() {
        let extractor = VerbatimExtractor::new(Arc::new(ScriptedLlm));
        let extracts = extractor.extract("any question", &[]).await.unwrap();
        assert!(extracts.is_empty());
    }
}
