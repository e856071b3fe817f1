//! Retrieval orchestration
//!
//! Combines semantic search, BM25 and fuzzy matching into a single
//! deduplicated candidate list, then optionally expands context windows
//! and reranks. Semantic search runs once per query variant (the original
//! plus any proxies from query expansion); lexical passes run on the
//! original query only.

use std::collections::HashMap;
use std::sync::Arc;

use docchat_core::{CrossEncoderModel, Document, Embedder, ScoredDoc, VectorIndex};
use docchat_config::RagConfig;
use tracing::{debug, info, warn};

use crate::corpus::CorpusSnapshot;
use crate::fuzzy::fuzzy_search;
use crate::lexical::bm25_search;
use crate::reranker::{rerank_to_periphery, rerank_with_diversity, CrossEncoderReranker};
use crate::RagError;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    config: RagConfig,
    cross_encoder: Option<Arc<dyn CrossEncoderModel>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, config: RagConfig) -> Self {
        Self {
            index,
            config,
            cross_encoder: None,
            embedder: None,
        }
    }

    /// Cross-encoder used for relevance reranking. When set, each search
    /// pass over-fetches so the reranker has candidates to discard.
    pub fn with_cross_encoder(mut self, model: Arc<dyn CrossEncoderModel>) -> Self {
        self.cross_encoder = Some(model);
        self
    }

    /// Embedder used for diversity reranking.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Retrieve the chunks most relevant to `query`.
    ///
    /// `proxies` are alternate formulations (hypothetical answers, query
    /// rephrases) that each get their own semantic pass. Results are merged
    /// in first-seen order with later duplicates overwriting earlier ones
    /// in place, so a chunk retrieved by several variants keeps its
    /// earliest position but its latest score.
    pub async fn get_relevant_chunks(
        &self,
        query: &str,
        proxies: &[String],
        snapshot: &CorpusSnapshot,
        filter: Option<&str>,
    ) -> Result<Vec<Document>, RagError> {
        let retrieval_multiple = if self.cross_encoder.is_some() { 3 } else { 1 };
        let k = self.config.n_similar_docs * retrieval_multiple;

        let mut merged: Vec<ScoredDoc> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        let mut variants: Vec<&str> = vec![query];
        variants.extend(proxies.iter().map(|p| p.as_str()));

        for variant in variants {
            let hits = self
                .index
                .similar_texts_with_scores(variant, k, filter)
                .await?;
            // Semantic scores are not comparable across variants or with
            // the lexical passes, so they are zeroed out here.
            merge_hits(
                &mut merged,
                &mut positions,
                hits.into_iter().map(|(doc, _)| (doc, 0.0)),
            );
        }

        if self.config.use_bm25_search {
            let hits = bm25_search(snapshot, query, k);
            debug!(hits = hits.len(), "bm25 pass");
            merge_hits(&mut merged, &mut positions, hits.into_iter());
        }

        if self.config.use_fuzzy_match {
            let hits = fuzzy_search(snapshot, query, k, self.config.n_fuzzy_neighbor_words);
            debug!(hits = hits.len(), "fuzzy pass");
            merge_hits(&mut merged, &mut positions, hits.into_iter());
        }

        if merged.is_empty() {
            info!(query, "no chunks retrieved");
            return Ok(Vec::new());
        }

        // Window expansion only makes sense when every candidate is a plain
        // chunk; documents carrying extra payload fields are passed through
        // untouched.
        let expandable = merged.iter().all(|(doc, _)| doc.has_only_canonical_fields());
        if self.config.n_neighbor_chunks > 0 && expandable {
            merged = self
                .index
                .add_context_window(merged, self.config.n_neighbor_chunks)
                .await?;
        }

        let mut docs: Vec<Document> = merged.into_iter().map(|(doc, _)| doc).collect();

        if let Some(model) = &self.cross_encoder {
            let reranker = CrossEncoderReranker::new(model.clone(), self.config.n_similar_docs);
            docs = reranker.rerank(query, docs)?;
        }

        if self.config.rerank_diversity {
            match &self.embedder {
                Some(embedder) => docs = rerank_with_diversity(docs, embedder.as_ref())?,
                None => warn!("no embedder wired; skipping diversity reranking"),
            }
        }

        if self.config.rerank_periphery {
            docs = rerank_to_periphery(docs);
        }

        info!(query, chunks = docs.len(), "retrieval complete");
        Ok(docs)
    }
}

fn merge_hits(
    merged: &mut Vec<ScoredDoc>,
    positions: &mut HashMap<String, usize>,
    hits: impl Iterator<Item = ScoredDoc>,
) {
    for (doc, score) in hits {
        let id = doc.id();
        match positions.get(&id) {
            Some(&idx) => merged[idx] = (doc, score),
            None => {
                positions.insert(id, merged.len());
                merged.push((doc, score));
            }
        }
    }
}
