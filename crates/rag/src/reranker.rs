//! Reranking stages
//!
//! Three independent reorderings applied after the hybrid merge:
//! - cross-encoder relevance reranking (truncates to the configured top-k)
//! - diversity reordering (greedy farthest-point over embeddings)
//! - periphery reordering (strongest passages pushed to both ends, against
//!   the lost-in-the-middle effect)

use std::sync::Arc;

use docchat_core::{CrossEncoderModel, Document, Embedder};

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::RagError;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cross-encoder reranker: scores (query, passage) pairs jointly, squashes
/// logits to [0, 1], sorts descending and keeps the top `n_similar_docs`.
pub struct CrossEncoderReranker {
    model: Arc<dyn CrossEncoderModel>,
    n_similar_docs: usize,
}

impl CrossEncoderReranker {
    pub fn new(model: Arc<dyn CrossEncoderModel>, n_similar_docs: usize) -> Self {
        Self {
            model,
            n_similar_docs,
        }
    }

    /// Rerank and truncate. Ties keep their pre-rerank order (stable sort).
    pub fn rerank(&self, query: &str, passages: Vec<Document>) -> Result<Vec<Document>, RagError> {
        if passages.is_empty() {
            return Ok(passages);
        }

        let texts: Vec<&str> = passages.iter().map(|d| d.content.as_str()).collect();
        let logits = self.model.predict(query, &texts)?;
        if logits.len() != passages.len() {
            return Err(RagError::Reranker(format!(
                "model returned {} scores for {} passages",
                logits.len(),
                passages.len()
            )));
        }

        let mut indexed: Vec<(usize, f32)> = logits
            .into_iter()
            .map(sigmoid)
            .enumerate()
            .collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(self.n_similar_docs);

        tracing::debug!(
            model = self.model.model_name(),
            kept = indexed.len(),
            "cross-encoder rerank"
        );

        let mut passages: Vec<Option<Document>> = passages.into_iter().map(Some).collect();
        Ok(indexed
            .into_iter()
            .filter_map(|(i, _)| passages[i].take())
            .collect())
    }
}

/// Keyword-overlap fallback scorer, used when no ONNX model is available.
///
/// Produces a logit whose sigmoid is the fraction of (non-trivial) query
/// terms found in the passage, so the reranker's squash step recovers the
/// overlap fraction.
pub struct KeywordScorer;

impl KeywordScorer {
    fn overlap(query: &str, passage: &str) -> f32 {
        let passage_lower = passage.to_lowercase();
        let passage_words: Vec<&str> = passage_lower.split_whitespace().collect();
        let terms = crate::corpus::query_terms(query);
        if terms.is_empty() {
            return 0.0;
        }
        let matched = terms
            .iter()
            .filter(|t| passage_words.iter().any(|w| *w == t.as_str()))
            .count();
        matched as f32 / terms.len() as f32
    }
}

impl CrossEncoderModel for KeywordScorer {
    fn predict(&self, query: &str, passages: &[&str]) -> docchat_core::Result<Vec<f32>> {
        Ok(passages
            .iter()
            .map(|p| {
                let s = Self::overlap(query, p).clamp(1e-3, 1.0 - 1e-3);
                (s / (1.0 - s)).ln()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-overlap"
    }
}

/// ONNX cross-encoder, one forward pass per (query, passage) pair
#[cfg(feature = "onnx")]
pub struct OnnxCrossEncoder {
    session: Session,
    tokenizer: Tokenizer,
    name: String,
    max_seq_len: usize,
}

#[cfg(feature = "onnx")]
impl OnnxCrossEncoder {
    pub fn new(
        model_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
        name: impl Into<String>,
    ) -> Result<Self, RagError> {
        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Model(e.to_string()))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;

        Ok(Self {
            session,
            tokenizer,
            name: name.into(),
            max_seq_len: 256,
        })
    }

    fn score_pair(&self, query: &str, passage: &str) -> Result<f32, RagError> {
        let encoding = self
            .tokenizer
            .encode((query, passage), true)
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(self.max_seq_len)
            .map(|&id| id as i64)
            .collect();

        let mut padded_ids = vec![0i64; self.max_seq_len];
        let mut padded_mask = vec![0i64; self.max_seq_len];
        padded_ids[..ids.len()].copy_from_slice(&ids);
        for slot in padded_mask.iter_mut().take(ids.len()) {
            *slot = 1;
        }

        let input_ids = Array2::from_shape_vec((1, self.max_seq_len), padded_ids)
            .map_err(|e| RagError::Reranker(e.to_string()))?;
        let attention = Array2::from_shape_vec((1, self.max_seq_len), padded_mask)
            .map_err(|e| RagError::Reranker(e.to_string()))?;

        let input_ids_tensor =
            Tensor::from_array(input_ids).map_err(|e| RagError::Model(e.to_string()))?;
        let attention_tensor =
            Tensor::from_array(attention).map_err(|e| RagError::Model(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_tensor,
            ])
            .map_err(|e| RagError::Model(e.to_string()))?;

        let (_, logits) = outputs
            .get("logits")
            .ok_or_else(|| RagError::Model("Missing logits output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        // Single-logit heads give the relevance logit directly; two-class
        // heads give [irrelevant, relevant].
        match logits.len() {
            0 => Err(RagError::Model("Empty logits output".to_string())),
            1 => Ok(logits[0]),
            _ => Ok(logits[1] - logits[0]),
        }
    }
}

#[cfg(feature = "onnx")]
impl CrossEncoderModel for OnnxCrossEncoder {
    fn predict(&self, query: &str, passages: &[&str]) -> docchat_core::Result<Vec<f32>> {
        passages
            .iter()
            .map(|p| {
                self.score_pair(query, p)
                    .map_err(docchat_core::Error::from)
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Greedy farthest-point reordering over embeddings: start from the most
/// relevant passage, then repeatedly pick the passage with the lowest
/// average cosine similarity to those already chosen. Always a permutation
/// of the input.
pub fn rerank_with_diversity(
    docs: Vec<Document>,
    embedder: &dyn Embedder,
) -> Result<Vec<Document>, RagError> {
    if docs.len() <= 2 {
        return Ok(docs);
    }

    let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .map_err(|e| RagError::Embedding(e.to_string()))?;

    let cosine = |a: &[f32], b: &[f32]| -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    };

    let n = docs.len();
    let mut selected: Vec<usize> = vec![0];
    let mut remaining: Vec<usize> = (1..n).collect();

    while !remaining.is_empty() {
        let (pos, _) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let avg: f32 = selected
                    .iter()
                    .map(|&j| cosine(&embeddings[i], &embeddings[j]))
                    .sum::<f32>()
                    / selected.len() as f32;
                (pos, avg)
            })
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((0, 0.0));
        selected.push(remaining.remove(pos));
    }

    let mut docs: Vec<Option<Document>> = docs.into_iter().map(Some).collect();
    Ok(selected
        .into_iter()
        .filter_map(|i| docs[i].take())
        .collect())
}

/// Move the strongest passages to the edges of the context: passages at
/// even 0-based positions stay in order, the rest are appended reversed.
/// `[1,2,3,4,5,6,7,8,9]` becomes `[1,3,5,7,9,8,6,4,2]`.
pub fn rerank_to_periphery(docs: Vec<Document>) -> Vec<Document> {
    let mut firsts = Vec::with_capacity(docs.len().div_ceil(2));
    let mut seconds = Vec::with_capacity(docs.len() / 2);
    for (i, doc) in docs.into_iter().enumerate() {
        if i % 2 == 0 {
            firsts.push(doc);
        } else {
            seconds.push(doc);
        }
    }
    seconds.reverse();
    firsts.extend(seconds);
    firsts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_index::HashEmbedder;
    use docchat_core::Document;

    fn docs(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .map(|c| Document::new(*c, "test.md"))
            .collect()
    }

    #[test]
    fn test_periphery_pattern() {
        let input = docs(&["1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        let out = rerank_to_periphery(input);
        let order: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, ["1", "3", "5", "7", "9", "8", "6", "4", "2"]);
    }

    #[test]
    fn test_periphery_small_inputs() {
        assert!(rerank_to_periphery(vec![]).is_empty());
        let one = rerank_to_periphery(docs(&["a"]));
        assert_eq!(one[0].content, "a");
        let two = rerank_to_periphery(docs(&["a", "b"]));
        let order: Vec<&str> = two.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn test_cross_encoder_truncates_and_orders() {
        let reranker = CrossEncoderReranker::new(Arc::new(KeywordScorer), 2);
        let passages = docs(&[
            "nothing relevant here at all",
            "penalty charges for late repayment",
            "late repayment penalty charges apply always",
        ]);
        let out = reranker
            .rerank("late repayment penalty charges", passages)
            .unwrap();
        assert_eq!(out.len(), 2);
        // both kept passages beat the irrelevant one
        for doc in &out {
            assert!(doc.content.contains("repayment"));
        }
    }

    #[test]
    fn test_cross_encoder_stable_on_ties() {
        let reranker = CrossEncoderReranker::new(Arc::new(KeywordScorer), 3);
        let passages = docs(&["alpha beta", "alpha beta", "alpha beta"]);
        let out = reranker.rerank("alpha", passages.clone()).unwrap();
        assert_eq!(out, passages);
    }

    #[test]
    fn test_diversity_is_permutation_seeded_at_zero() {
        let embedder = HashEmbedder::new(64);
        let input = docs(&[
            "gold loan interest rates",
            "gold loan interest rates today",
            "weather forecast sunny",
            "gold loan interest",
        ]);
        let out = rerank_with_diversity(input.clone(), &embedder).unwrap();

        assert_eq!(out.len(), input.len());
        // seed element keeps first position
        assert_eq!(out[0], input[0]);
        // permutation: every input appears exactly once
        for doc in &input {
            assert_eq!(out.iter().filter(|d| *d == doc).count(), 1);
        }
        // the off-topic passage is pulled forward, ahead of the near-duplicates
        let weather_pos = out
            .iter()
            .position(|d| d.content.contains("weather"))
            .unwrap();
        assert!(weather_pos == 1);
    }
}
