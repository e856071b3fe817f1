//! In-memory vector index
//!
//! Cosine scan over an in-process store, used in tests and demos where a
//! Qdrant deployment would be overkill. The filter expression is matched
//! against `metadata.source` exactly.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_core::{Document, Embedder, Result, ScoredDoc, VectorIndex};
use parking_lot::RwLock;

/// Hash-based embedder: deterministic, no model required.
///
/// Characters are scattered over the vector by position, then normalized.
/// Similar strings land close together, which is all the in-memory index
/// and the diversity reranker need in tests.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dim];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % self.dim;
            embedding[idx] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        Ok(embedding)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// In-process vector index over (document, embedding) pairs
pub struct MemoryVectorIndex {
    embedder: Arc<dyn Embedder>,
    store: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl MemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            store: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    fn matches_filter(doc: &Document, filter: Option<&str>) -> bool {
        match filter {
            Some(f) => doc.metadata.source == f,
            None => true,
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn similar_texts_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredDoc>> {
        let query_emb = self.embedder.embed(query)?;

        let mut hits: Vec<ScoredDoc> = self
            .store
            .read()
            .iter()
            .filter(|(doc, _)| Self::matches_filter(doc, filter))
            .map(|(doc, emb)| (doc.clone(), cosine(&query_emb, emb)))
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_all_documents(&self, filter: Option<&str>) -> Result<Vec<Document>> {
        Ok(self
            .store
            .read()
            .iter()
            .filter(|(doc, _)| Self::matches_filter(doc, filter))
            .map(|(doc, _)| doc.clone())
            .collect())
    }

    async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>> {
        let store = self.store.read();
        Ok(ids
            .iter()
            .filter_map(|id| {
                store
                    .iter()
                    .find(|(doc, _)| doc.id() == *id)
                    .map(|(doc, _)| doc.clone())
            })
            .collect())
    }

    async fn add_documents(&self, docs: &[Document]) -> Result<()> {
        let mut store = self.store.write();
        for doc in docs {
            let emb = self.embedder.embed(&doc.content)?;
            let id = doc.id();
            if let Some(existing) = store.iter_mut().find(|(d, _)| d.id() == id) {
                *existing = (doc.clone(), emb);
            } else {
                store.push((doc.clone(), emb));
            }
        }
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.store.write().clear();
        Ok(())
    }
}
