//! Document chat agent
//!
//! Top-level orchestrator: owns the vector index, the corpus snapshot the
//! lexical passes search over, and the dialog state, and drives the full
//! query pipeline (expansion, retrieval, extraction, synthesis).
//!
//! The snapshot is rebuilt wholesale after every ingestion or filter
//! change and swapped in atomically, so concurrent queries always see a
//! consistent corpus with a matching BM25 index.

use std::collections::HashMap;
use std::sync::Arc;

use docchat_config::RagConfig;
use docchat_core::{
    truncate_to_tokens, CrossEncoderModel, Document, Embedder, VectorIndex,
};
use docchat_llm::{prompt, LlmBackend, NO_ANSWER};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::answer::AnswerSynthesizer;
use crate::corpus::CorpusSnapshot;
use crate::extractor::VerbatimExtractor;
use crate::query_expansion::QueryExpander;
use crate::reranker::KeywordScorer;
use crate::retriever::Retriever;
use crate::RagError;

pub struct DocChatAgent {
    config: RagConfig,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmBackend>,
    embedder: Option<Arc<dyn Embedder>>,
    cross_encoder: Option<Arc<dyn CrossEncoderModel>>,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    dialog: Mutex<Vec<(String, String)>>,
    filter: Mutex<Option<String>>,
}

impl DocChatAgent {
    /// A non-empty `cross_encoder_model` in the config turns relevance
    /// reranking on: the built-in keyword scorer is wired here, and
    /// [`with_cross_encoder`](Self::with_cross_encoder) swaps in a learned
    /// model. An empty model name disables both reranking and the wider
    /// retrieval pass that feeds it.
    pub fn new(
        config: RagConfig,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmBackend>,
    ) -> Self {
        let cross_encoder: Option<Arc<dyn CrossEncoderModel>> = if config.cross_encoder_enabled() {
            Some(Arc::new(KeywordScorer))
        } else {
            None
        };
        Self {
            config,
            index,
            llm,
            embedder: None,
            cross_encoder,
            snapshot: RwLock::new(Arc::new(CorpusSnapshot::empty())),
            dialog: Mutex::new(Vec::new()),
            filter: Mutex::new(None),
        }
    }

    /// Embedder for diversity reranking.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Replace the configured scorer with another cross-encoder, e.g. an
    /// ONNX model loaded from disk.
    pub fn with_cross_encoder(mut self, model: Arc<dyn CrossEncoderModel>) -> Self {
        self.cross_encoder = Some(model);
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Ingest pre-chunked documents.
    ///
    /// Chunks without an id get their content hash assigned, and every
    /// chunk learns the ordered ids of its same-source batch neighbors so
    /// context windows can be expanded later.
    pub async fn ingest_chunks(&self, chunks: Vec<Document>) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut chunks: Vec<Document> = chunks
            .into_iter()
            .map(|mut doc| {
                if doc.metadata.id.is_empty() {
                    doc.metadata.id = doc.content_hash();
                }
                doc.metadata.is_chunk = true;
                doc
            })
            .collect();

        let mut by_source: HashMap<String, Vec<String>> = HashMap::new();
        for doc in &chunks {
            by_source
                .entry(doc.metadata.source.clone())
                .or_default()
                .push(doc.metadata.id.clone());
        }
        for doc in &mut chunks {
            doc.metadata.window_ids = by_source[&doc.metadata.source].clone();
        }

        self.index.add_documents(&chunks).await?;
        let count = chunks.len();
        self.rebuild_snapshot().await?;
        info!(chunks = count, "ingestion complete");
        Ok(count)
    }

    /// Restrict retrieval to documents matching `filter` (backend-specific;
    /// for the built-in indexes an exact source match). The snapshot is
    /// rebuilt so the lexical passes honor the filter too.
    pub async fn set_filter(&self, filter: Option<String>) -> Result<(), RagError> {
        *self.filter.lock() = filter;
        self.rebuild_snapshot().await
    }

    /// Drop all ingested documents and dialog state.
    pub async fn clear(&self) -> Result<(), RagError> {
        self.index.delete_collection().await?;
        *self.snapshot.write() = Arc::new(CorpusSnapshot::empty());
        self.dialog.lock().clear();
        Ok(())
    }

    async fn rebuild_snapshot(&self) -> Result<(), RagError> {
        let filter = self.filter.lock().clone();
        let docs = self.index.get_all_documents(filter.as_deref()).await?;
        let snapshot = CorpusSnapshot::build(docs, self.config.use_bm25_search)?;
        debug!(docs = snapshot.len(), "corpus snapshot rebuilt");
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Run expansion, retrieval and extraction for `query`.
    ///
    /// Returns the query actually searched (a follow-up question gets
    /// rewritten as standalone first) alongside the verbatim extracts.
    pub async fn get_relevant_extracts(
        &self,
        query: &str,
    ) -> Result<(String, Vec<Document>), RagError> {
        let dialog = self.dialog.lock().clone();
        let query = if !dialog.is_empty() && !self.config.assistant_mode {
            let rewritten = self.llm.rewrite_to_standalone(&dialog, query).await?;
            debug!(original = query, rewritten, "standalone rewrite");
            rewritten
        } else {
            query.to_string()
        };

        let mut proxies = Vec::new();
        let expander = QueryExpander::new(self.llm.clone());
        if self.config.hypothetical_answer {
            proxies.push(expander.hypothetical_answer(&query).await?);
        }
        if self.config.n_query_rephrases > 0 {
            proxies.extend(
                expander
                    .rephrases(&query, self.config.n_query_rephrases)
                    .await?,
            );
        }

        let mut retriever = Retriever::new(self.index.clone(), self.config.clone());
        if let Some(model) = &self.cross_encoder {
            retriever = retriever.with_cross_encoder(model.clone());
        }
        if let Some(embedder) = &self.embedder {
            retriever = retriever.with_embedder(embedder.clone());
        }

        let snapshot = self.snapshot.read().clone();
        let filter = self.filter.lock().clone();
        let chunks = retriever
            .get_relevant_chunks(&query, &proxies, &snapshot, filter.as_deref())
            .await?;

        let extractor = VerbatimExtractor::new(self.llm.clone());
        let extracts = extractor.extract(&query, &chunks).await?;
        Ok((query, extracts))
    }

    /// Answer a question from the ingested documents.
    ///
    /// With nothing relevant found, the answer is the refusal sentinel
    /// with source "None". In retrieve-only mode the extracts themselves
    /// are the answer, joined by blank lines, with no synthesis call.
    pub async fn answer_from_docs(&self, query: &str) -> Result<Document, RagError> {
        let (searched, extracts) = self.get_relevant_extracts(query).await?;
        let answer = if self.config.retrieve_only {
            Self::joined_extracts(&extracts)
        } else {
            AnswerSynthesizer::new(self.llm.clone())
                .synthesize(&searched, &extracts)
                .await?
        };
        self.record_turn(query, &answer);
        Ok(answer)
    }

    /// Streaming variant of [`answer_from_docs`]. Honors the configured
    /// stream flag: when streaming is off, the finished answer is sent to
    /// `tx` in one piece instead of token by token.
    ///
    /// [`answer_from_docs`]: DocChatAgent::answer_from_docs
    pub async fn answer_from_docs_stream(
        &self,
        query: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<Document, RagError> {
        let (searched, extracts) = self.get_relevant_extracts(query).await?;
        let answer = if self.config.retrieve_only {
            let answer = Self::joined_extracts(&extracts);
            let _ = tx.send(answer.content.clone()).await;
            answer
        } else if self.config.stream {
            AnswerSynthesizer::new(self.llm.clone())
                .synthesize_stream(&searched, &extracts, tx)
                .await?
        } else {
            let answer = AnswerSynthesizer::new(self.llm.clone())
                .synthesize(&searched, &extracts)
                .await?;
            let _ = tx.send(answer.content.clone()).await;
            answer
        };
        self.record_turn(query, &answer);
        Ok(answer)
    }

    /// Summarize the whole (filtered) corpus in one model call,
    /// truncated to the context budget.
    pub async fn summarize_docs(&self, instruction: &str) -> Result<String, RagError> {
        let snapshot = self.snapshot.read().clone();
        if snapshot.is_empty() {
            return Ok(NO_ANSWER.to_string());
        }

        let full_text = snapshot
            .docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = truncate_to_tokens(&full_text, self.config.max_context_tokens);

        let messages = vec![prompt::Message::user(format!(
            "{instruction}\n\nFULL TEXT:\n{text}"
        ))];
        let result = self.llm.generate(&messages).await?;
        Ok(result.text.trim().to_string())
    }

    fn joined_extracts(extracts: &[Document]) -> Document {
        if extracts.is_empty() {
            return Document::new(NO_ANSWER, "None");
        }
        let content = extracts
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = extracts
            .iter()
            .map(|d| d.metadata.source.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Document::new(content, sources)
    }

    fn record_turn(&self, query: &str, answer: &Document) {
        if self.config.conversation_mode {
            self.dialog
                .lock()
                .push((query.to_string(), answer.content.clone()));
        }
    }

    #[cfg(test)]
    fn dialog_len(&self) -> usize {
        self.dialog.lock().len()
    }
}
