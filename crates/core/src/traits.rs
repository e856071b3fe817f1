//! Collaborator traits
//!
//! The pipeline consumes its external services through these narrow
//! interfaces. Implementations live elsewhere (qdrant adapter, in-memory
//! index, ONNX cross-encoder); the pipeline itself never talks to a
//! backend directly.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::document::{Document, ScoredDoc};
use crate::error::Result;

/// Embedding model interface
///
/// Synchronous: embedding a handful of passages is CPU-bound and callers
/// that need to keep an async runtime responsive wrap calls in
/// `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding dimension
    fn dim(&self) -> usize;
}

/// Cross-encoder relevance model
///
/// Scores (query, passage) pairs jointly and returns one raw logit per
/// passage, in input order.
pub trait CrossEncoderModel: Send + Sync {
    fn predict(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Vector index interface
///
/// Persistence and similarity search are owned by the index; the pipeline
/// treats calls as synchronous round-trips with no client-side retry.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k documents most similar to `query`, with similarity scores,
    /// optionally restricted by a backend-specific filter expression.
    async fn similar_texts_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredDoc>>;

    /// All stored documents, optionally filtered
    async fn get_all_documents(&self, filter: Option<&str>) -> Result<Vec<Document>>;

    /// Fetch documents by chunk id, in the order given. Unknown ids are
    /// silently skipped.
    async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>>;

    /// Store documents (embedding them on the way in)
    async fn add_documents(&self, docs: &[Document]) -> Result<()>;

    /// Drop the backing collection
    async fn delete_collection(&self) -> Result<()>;

    /// Expand each hit with up to `n_neighbors` chunks on either side,
    /// using the ordered `window_ids` stored in chunk metadata.
    ///
    /// Content becomes the concatenation of the selected neighbors plus
    /// the chunk itself, in document order; scores and metadata are
    /// unchanged. A chunk id consumed by one hit's window is not reused
    /// by a later hit, so overlapping windows never duplicate text.
    async fn add_context_window(
        &self,
        hits: Vec<ScoredDoc>,
        n_neighbors: usize,
    ) -> Result<Vec<ScoredDoc>> {
        if n_neighbors == 0 || hits.is_empty() {
            return Ok(hits);
        }

        let mut used: HashSet<String> = HashSet::new();
        let mut expanded = Vec::with_capacity(hits.len());

        for (doc, score) in hits {
            let window_ids = &doc.metadata.window_ids;
            let doc_id = doc.id();

            let Some(pos) = window_ids.iter().position(|id| *id == doc_id) else {
                // No usable window; keep the chunk as-is.
                used.insert(doc_id);
                expanded.push((doc, score));
                continue;
            };

            let lo = pos.saturating_sub(n_neighbors);
            let hi = (pos + n_neighbors).min(window_ids.len() - 1);
            let wanted: Vec<String> = window_ids[lo..=hi]
                .iter()
                .filter(|id| !used.contains(*id))
                .cloned()
                .collect();
            used.extend(wanted.iter().cloned());

            let neighbors = self.documents_by_ids(&wanted).await?;
            if neighbors.is_empty() {
                expanded.push((doc, score));
                continue;
            }

            let content = neighbors
                .iter()
                .map(|d| d.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            let merged = Document {
                content,
                metadata: doc.metadata.clone(),
            };
            expanded.push((merged, score));
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocMetadata;
    use std::collections::HashMap;

    /// Index over a fixed set of chunks, no embeddings
    struct FixedIndex {
        by_id: HashMap<String, Document>,
    }

    impl FixedIndex {
        fn new(docs: Vec<Document>) -> Self {
            Self {
                by_id: docs.into_iter().map(|d| (d.id(), d)).collect(),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn similar_texts_with_scores(
            &self,
            _query: &str,
            _k: usize,
            _filter: Option<&str>,
        ) -> Result<Vec<ScoredDoc>> {
            Ok(Vec::new())
        }

        async fn get_all_documents(&self, _filter: Option<&str>) -> Result<Vec<Document>> {
            Ok(self.by_id.values().cloned().collect())
        }

        async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>> {
            Ok(ids.iter().filter_map(|id| self.by_id.get(id).cloned()).collect())
        }

        async fn add_documents(&self, _docs: &[Document]) -> Result<()> {
            Ok(())
        }

        async fn delete_collection(&self) -> Result<()> {
            Ok(())
        }
    }

    fn chunk(id: &str, content: &str, window: &[&str]) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocMetadata {
                id: id.to_string(),
                source: "test.md".to_string(),
                window_ids: window.iter().map(|s| s.to_string()).collect(),
                is_chunk: true,
                extra: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_window_expansion_merges_neighbors() {
        let window = ["c1", "c2", "c3", "c4", "c5"];
        let docs: Vec<Document> = (1..=5)
            .map(|i| chunk(&format!("c{}", i), &format!("part{}", i), &window))
            .collect();
        let index = FixedIndex::new(docs.clone());

        let hits = vec![(docs[2].clone(), 0.9)];
        let out = index.add_context_window(hits, 1).await.unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.content, "part2 part3 part4");
        assert_eq!(out[0].1, 0.9);
        assert_eq!(out[0].0.metadata.id, "c3");
    }

    #[tokio::test]
    async fn test_window_expansion_zero_neighbors_is_identity() {
        let docs = vec![chunk("c1", "part1", &["c1"])];
        let index = FixedIndex::new(docs.clone());
        let hits = vec![(docs[0].clone(), 0.5)];
        let out = index.add_context_window(hits.clone(), 0).await.unwrap();
        assert_eq!(out, hits);
    }

    #[tokio::test]
    async fn test_window_expansion_dedups_overlap() {
        let window = ["c1", "c2", "c3"];
        let docs: Vec<Document> = (1..=3)
            .map(|i| chunk(&format!("c{}", i), &format!("part{}", i), &window))
            .collect();
        let index = FixedIndex::new(docs.clone());

        // adjacent hits share c2; the second hit must not repeat it
        let hits = vec![(docs[0].clone(), 0.9), (docs[2].clone(), 0.8)];
        let out = index.add_context_window(hits, 1).await.unwrap();

        assert_eq!(out[0].0.content, "part1 part2");
        assert_eq!(out[1].0.content, "part3");
    }
}
