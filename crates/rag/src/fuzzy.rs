//! Fuzzy word-window matching
//!
//! Complements BM25 with a prefix-tolerant scan: a sliding word window over
//! each chunk is scored by the fraction of query terms it matches, the best
//! window wins, and the returned content is the matched span widened by
//! `n_neighbor_words` words on each side of the raw chunk. Another vote
//! generator for the hybrid merge; fails soft on an empty corpus.

use docchat_core::{Document, ScoredDoc};

use crate::corpus::{query_terms, CorpusSnapshot};

/// Prefix-tolerant term match: exact, or sharing the first 4 characters
/// when the term is long enough to make that meaningful.
fn terms_match(word: &str, term: &str) -> bool {
    if word == term {
        return true;
    }
    let prefix: String = term.chars().take(4).collect();
    prefix.chars().count() == 4 && word.starts_with(&prefix)
}

/// Best window score and starting word offset for `terms` in `words`
fn best_window(words: &[String], terms: &[String]) -> (f32, usize) {
    let window = terms.len().max(1);
    let mut best = (0.0f32, 0usize);

    let last_start = words.len().saturating_sub(window);
    for start in 0..=last_start {
        let slice = &words[start..(start + window).min(words.len())];
        let matched = terms
            .iter()
            .filter(|term| slice.iter().any(|w| terms_match(w, term)))
            .count();
        let score = matched as f32 / terms.len() as f32;
        if score > best.0 {
            best = (score, start);
        }
    }

    best
}

/// Fuzzy hits for `query` against the snapshot, as (span chunk, score)
/// pairs. The span keeps the raw chunk's metadata so downstream stages can
/// still attribute it.
pub fn fuzzy_search(
    snapshot: &CorpusSnapshot,
    query: &str,
    k: usize,
    n_neighbor_words: usize,
) -> Vec<ScoredDoc> {
    if snapshot.is_empty() {
        tracing::warn!("fuzzy search on empty corpus, returning no hits");
        return Vec::new();
    }

    let terms = query_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, f32, usize)> = Vec::new();
    for (doc_idx, doc) in snapshot.docs.iter().enumerate() {
        let words: Vec<String> = doc
            .content
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            continue;
        }
        let (score, start) = best_window(&words, &terms);
        if score > 0.0 {
            scored.push((doc_idx, score, start));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(doc_idx, score, start)| {
            let doc = &snapshot.docs[doc_idx];
            let words: Vec<&str> = doc.content.split_whitespace().collect();
            let window = terms.len().max(1);
            let lo = start.saturating_sub(n_neighbor_words);
            let hi = (start + window + n_neighbor_words).min(words.len());
            let span = words[lo..hi].join(" ");
            (
                Document {
                    content: span,
                    metadata: doc.metadata.clone(),
                },
                score,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::Document;

    fn snapshot(texts: &[(&str, &str)]) -> CorpusSnapshot {
        let docs = texts
            .iter()
            .map(|(content, source)| Document::new(*content, *source))
            .collect();
        CorpusSnapshot::build(docs, false).unwrap()
    }

    #[test]
    fn test_exact_terms_score_full() {
        let snap = snapshot(&[
            ("penalty charges apply for late repayment of the loan", "a.md"),
            ("weather tomorrow will be sunny with light winds", "b.md"),
        ]);

        let hits = fuzzy_search(&snap, "late repayment", 5, 2);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.metadata.source, "a.md");
        assert!((hits[0].1 - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_prefix_tolerance() {
        let snap = snapshot(&[("repayments must arrive before the fifth", "a.md")]);
        // "repayment" matches "repayments" on the shared prefix
        let hits = fuzzy_search(&snap, "repayment", 5, 0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_span_expansion_bounded_by_chunk() {
        let snap = snapshot(&[("one two three target five six seven", "a.md")]);
        let hits = fuzzy_search(&snap, "target", 5, 2);
        assert_eq!(hits[0].0.content, "two three target five six");
        // metadata survives span replacement
        assert_eq!(hits[0].0.metadata.source, "a.md");
    }

    #[test]
    fn test_empty_corpus_fails_soft() {
        let snap = CorpusSnapshot::empty();
        assert!(fuzzy_search(&snap, "anything", 5, 10).is_empty());
    }

    #[test]
    fn test_stopword_only_query_returns_nothing() {
        let snap = snapshot(&[("the quick brown fox", "a.md")]);
        assert!(fuzzy_search(&snap, "the is of", 5, 10).is_empty());
    }
}
