//! Answer synthesis
//!
//! Final LLM call of the pipeline: compose the verbatim extracts into a
//! single prompt, ask for an answer with cited sources, and split the
//! response into content and source on the `SOURCE:` marker.

use std::sync::Arc;

use docchat_core::Document;
use docchat_llm::{prompt, LlmBackend, NO_ANSWER};
use tokio::sync::mpsc;
use tracing::debug;

use crate::RagError;

const SOURCE_MARKER: &str = "SOURCE:";

pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmBackend>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Render extracts as "Extract / Source" pairs for the synthesis
    /// prompt.
    pub fn doc_string(extracts: &[Document]) -> String {
        extracts
            .iter()
            .map(|d| format!("Extract: {}\nSource: {}", d.content, d.metadata.source))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Answer `question` from `extracts`. With no extracts the answer is
    /// the refusal sentinel, produced without calling the model.
    pub async fn synthesize(
        &self,
        question: &str,
        extracts: &[Document],
    ) -> Result<Document, RagError> {
        if extracts.is_empty() {
            return Ok(Document::new(NO_ANSWER, "None"));
        }

        let messages = vec![prompt::Message::user(prompt::summary_answer(
            question,
            &Self::doc_string(extracts),
        ))];
        let result = self.llm.generate(&messages).await?;
        Ok(Self::parse_answer(&result.text))
    }

    /// Streaming variant: tokens are forwarded to `tx` as they arrive,
    /// then the complete text is parsed the same way as [`synthesize`].
    ///
    /// [`synthesize`]: AnswerSynthesizer::synthesize
    pub async fn synthesize_stream(
        &self,
        question: &str,
        extracts: &[Document],
        tx: mpsc::Sender<String>,
    ) -> Result<Document, RagError> {
        if extracts.is_empty() {
            return Ok(Document::new(NO_ANSWER, "None"));
        }

        let messages = vec![prompt::Message::user(prompt::summary_answer(
            question,
            &Self::doc_string(extracts),
        ))];
        let result = self.llm.generate_stream(&messages, tx).await?;
        Ok(Self::parse_answer(&result.text))
    }

    /// Split a model response into answer content and cited source.
    ///
    /// A response that opens with `SOURCE` has no separable answer, so the
    /// whole text doubles as both. A response without the marker gets an
    /// empty source rather than an error.
    fn parse_answer(text: &str) -> Document {
        let final_answer = text.trim();

        let (content, sources) = if final_answer.starts_with("SOURCE") {
            (final_answer, final_answer)
        } else {
            match final_answer.split_once(SOURCE_MARKER) {
                Some((answer, source)) => (answer.trim(), source.trim()),
                None => (final_answer, ""),
            }
        };

        debug!(
            content_len = content.len(),
            has_source = !sources.is_empty(),
            "answer parsed"
        );
        Document::new(content, sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docchat_llm::{GenerationResult, LlmError, Message};

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
            tx: mpsc::Sender<String>,
        ) -> Result<GenerationResult, LlmError> {
            for word in self.reply.split_inclusive(' ') {
                let _ = tx.send(word.to_string()).await;
            }
            Ok(GenerationResult::from_text(self.reply.clone()))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn extracts() -> Vec<Document> {
        vec![
            Document::new("rates start at nine percent", "rates.md"),
            Document::new("tenure is up to one year", "tenure.md"),
        ]
    }

    #[test]
    fn test_doc_string_pairs_extract_and_source() {
        let s = AnswerSynthesizer::doc_string(&extracts());
        assert_eq!(
            s,
            "Extract: rates start at nine percent\nSource: rates.md\n\n\
             Extract: tenure is up to one year\nSource: tenure.md"
        );
    }

    #[tokio::test]
    async fn test_answer_splits_on_source_marker() {
        let synth = AnswerSynthesizer::new(Arc::new(FixedLlm {
            reply: "Rates start at nine percent.\nSOURCE: rates.md".to_string(),
        }));
        let answer = synth.synthesize("what are the rates", &extracts()).await.unwrap();
        assert_eq!(answer.content, "Rates start at nine percent.");
        assert_eq!(answer.metadata.source, "rates.md");
    }

    #[tokio::test]
    async fn test_answer_opening_with_source_is_kept_whole() {
        let synth = AnswerSynthesizer::new(Arc::new(FixedLlm {
            reply: "SOURCE: rates.md says nine percent".to_string(),
        }));
        let answer = synth.synthesize("q", &extracts()).await.unwrap();
        assert_eq!(answer.content, "SOURCE: rates.md says nine percent");
        assert_eq!(answer.metadata.source, "SOURCE: rates.md says nine percent");
    }

    #[tokio::test]
    async fn test_answer_without_marker_gets_empty_source() {
        let synth = AnswerSynthesizer::new(Arc::new(FixedLlm {
            reply: "nine percent".to_string(),
        }));
        let answer = synth.synthesize("q", &extracts()).await.unwrap();
        assert_eq!(answer.content, "nine percent");
        assert_eq!(answer.metadata.source, "");
    }

    #[tokio::test]
    async fn test_no_extracts_short_circuits_to_sentinel() {
        let synth = AnswerSynthesizer::new(Arc::new(FixedLlm {
            reply: "must not be called".to_string(),
        }));
        let answer = synth.synthesize("q", &[]).await.unwrap();
        assert_eq!(answer.content, NO_ANSWER);
        assert_eq!(answer.metadata.source, "None");
    }

    #[tokio::test]
    async fn test_streaming_forwards_tokens_and_parses() {
        let synth = AnswerSynthesizer::new(Arc::new(FixedLlm {
            reply: "Nine percent.\nSOURCE: rates.md".to_string(),
        }));
        let (tx, mut rx) = mpsc::channel(16);
        let answer = synth
            .synthesize_stream("q", &extracts(), tx)
            .await
            .unwrap();

        let mut streamed = String::new();
        while let Ok(tok) = rx.try_recv() {
            streamed.push_str(&tok);
        }
        assert_eq!(streamed, "Nine percent.\nSOURCE: rates.md");
        assert_eq!(answer.content, "Nine percent.");
        assert_eq!(answer.metadata.source, "rates.md");
    }
}
