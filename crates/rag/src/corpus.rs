//! Chunk corpus snapshots
//!
//! The lexical and fuzzy matchers search an immutable snapshot of the chunk
//! corpus: the raw documents plus an index-aligned cleaned rendition
//! (lower-cased, stop words stripped). Rebuilds produce a whole new snapshot
//! which the owner installs atomically; in-place mutation does not exist.

use std::collections::{HashMap, HashSet};

use docchat_core::Document;
use once_cell::sync::Lazy;

use crate::lexical::LexicalIndex;
use crate::RagError;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "must",
        "shall", "can", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as",
        "into", "through", "during", "before", "after", "above", "below", "between", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
        "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
        "only", "own", "same", "so", "than", "too", "very", "just", "and", "but", "if", "or",
        "because", "until", "while", "about", "i", "me", "my", "we", "our", "you", "your",
        "he", "him", "his", "she", "her", "it", "its", "they", "them", "their", "what",
        "which", "who", "whom", "this", "that", "these", "those",
    ]
    .into_iter()
    .collect()
});

/// Lower-case, strip punctuation and drop stop words
pub fn preprocess_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| !word.is_empty() && !STOPWORDS.contains(word.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Query terms for lexical/fuzzy matching, stop words removed
pub(crate) fn query_terms(query: &str) -> Vec<String> {
    preprocess_text(query)
        .split_whitespace()
        .map(|term| term.to_string())
        .collect()
}

/// Immutable view of the chunk corpus plus everything derived from it
pub struct CorpusSnapshot {
    /// Raw chunks, as stored in the vector index
    pub docs: Vec<Document>,
    /// Index-aligned cleaned chunks
    pub clean: Vec<Document>,
    /// BM25 index over the cleaned chunks, when lexical search is on
    lexical: Option<LexicalIndex>,
    by_id: HashMap<String, usize>,
}

impl CorpusSnapshot {
    /// Snapshot with no documents, the state before any ingestion
    pub fn empty() -> Self {
        Self {
            docs: Vec::new(),
            clean: Vec::new(),
            lexical: None,
            by_id: HashMap::new(),
        }
    }

    /// Build a snapshot from raw chunks
    pub fn build(docs: Vec<Document>, with_lexical: bool) -> Result<Self, RagError> {
        let clean: Vec<Document> = docs
            .iter()
            .map(|d| Document {
                content: preprocess_text(&d.content),
                metadata: d.metadata.clone(),
            })
            .collect();

        let by_id = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id(), i))
            .collect();

        let lexical = if with_lexical && !docs.is_empty() {
            Some(LexicalIndex::build(&docs, &clean)?)
        } else {
            None
        };

        Ok(Self {
            docs,
            clean,
            lexical,
            by_id,
        })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Raw chunk by id
    pub fn raw_by_id(&self, id: &str) -> Option<&Document> {
        self.by_id.get(id).map(|&i| &self.docs[i])
    }

    pub(crate) fn lexical(&self) -> Option<&LexicalIndex> {
        self.lexical.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::Document;

    #[test]
    fn test_preprocess_strips_stopwords_and_punctuation() {
        let cleaned = preprocess_text("The Quick, brown FOX is jumping!");
        assert_eq!(cleaned, "quick brown fox jumping");
    }

    #[test]
    fn test_preprocess_all_stopwords() {
        assert_eq!(preprocess_text("the is a of"), "");
    }

    #[test]
    fn test_snapshot_build_aligns_clean_corpus() {
        let docs = vec![
            Document::new("The fox jumps.", "a.md"),
            Document::new("A dog sleeps.", "b.md"),
        ];
        let snapshot = CorpusSnapshot::build(docs, false).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.clean[0].content, "fox jumps");
        assert_eq!(snapshot.clean[1].content, "dog sleeps");
        assert_eq!(
            snapshot.clean[0].metadata.source,
            snapshot.docs[0].metadata.source
        );

        let id = snapshot.docs[1].id();
        assert_eq!(snapshot.raw_by_id(&id).unwrap().content, "A dog sleeps.");
    }
}
