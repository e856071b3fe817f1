//! Query expansion
//!
//! Generates proxy queries that each get their own semantic search pass:
//! a hypothetical answer (HyDE) and/or a batch of rephrasings. Proxies
//! only influence retrieval; the original query is still the one answered.

use std::sync::Arc;

use docchat_llm::{prompt, LlmBackend};
use tracing::debug;

use crate::RagError;

const HYPOTHETICAL_PREFIX: &str = "HYPOTHETICAL ANSWER: ";

pub struct QueryExpander {
    llm: Arc<dyn LlmBackend>,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Answer the query from the model's own knowledge, prefixed so the
    /// text is recognizable as synthetic. The prefix keeps the embedding
    /// away from real passages that merely share phrasing with the query.
    pub async fn hypothetical_answer(&self, query: &str) -> Result<String, RagError> {
        let messages = vec![prompt::Message::user(prompt::hypothetical_answer(query))];
        let result = self.llm.generate(&messages).await?;
        let text = result.text.trim().to_string();
        debug!(len = text.len(), "hypothetical answer generated");

        if text.starts_with(HYPOTHETICAL_PREFIX) {
            Ok(text)
        } else {
            Ok(format!("{HYPOTHETICAL_PREFIX}{text}"))
        }
    }

    /// Ask the model for `n` alternate formulations of the query,
    /// one per blank-line-separated block.
    pub async fn rephrases(&self, query: &str, n: usize) -> Result<Vec<String>, RagError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let messages = vec![prompt::Message::user(prompt::rephrase_query(query, n))];
        let result = self.llm.generate(&messages).await?;

        let rephrases: Vec<String> = result
            .text
            .split("\n\n")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        debug!(requested = n, got = rephrases.len(), "query rephrases generated");
        Ok(rephrases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_llm::{GenerationResult, LlmError, Message};
    use tokio::sync::mpsc;

    struct FixedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmBackend for FixedLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
            Ok(GenerationResult::from_text(self.reply.clone()))
        }

        async fn generate_stream(
            &self,
            _messages: &[Message],
            _tx: mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            Ok(GenerationResult::from_text(self.reply.clone()))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_hypothetical_answer_keeps_model_prefix() {
        let expander = QueryExpander::new(Arc::new(FixedLlm {
            reply: "HYPOTHETICAL ANSWER: rates are around nine percent".to_string(),
        }));
        let answer = expander.hypothetical_answer("what is the rate").await.unwrap();
        assert_eq!(answer, "HYPOTHETICAL ANSWER: rates are around nine percent");
    }

    #[tokio::test]
    async fn test_hypothetical_answer_adds_missing_prefix() {
        let expander = QueryExpander::new(Arc::new(FixedLlm {
            reply: "rates are around nine percent".to_string(),
        }));
        let answer = expander.hypothetical_answer("what is the rate").await.unwrap();
        assert!(answer.starts_with("HYPOTHETICAL ANSWER: "));
    }

    #[tokio::test]
    async fn test_rephrases_split_on_blank_lines() {
        let expander = QueryExpander::new(Arc::new(FixedLlm {
            reply: "current gold loan rate?\n\n\n\nhow much interest on gold loans?".to_string(),
        }));
        let rephrases = expander.rephrases("gold loan rate", 2).await.unwrap();
        assert_eq!(
            rephrases,
            vec![
                "current gold loan rate?".to_string(),
                "how much interest on gold loans?".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_rephrases_skips_the_model() {
        let expander = QueryExpander::new(Arc::new(FixedLlm {
            reply: "should never be used".to_string(),
        }));
        let rephrases = expander.rephrases("query", 0).await.unwrap();
        assert!(rephrases.is_empty());
    }
}
