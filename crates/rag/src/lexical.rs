//! Lexical search using tantivy (BM25)
//!
//! Each corpus snapshot carries its own RAM index over the cleaned chunks;
//! results are mapped back to the raw chunks by id. Lexical search is a
//! vote generator for the hybrid merge and fails soft: an empty corpus or
//! an unparseable query yields an empty list, never an error.

use docchat_core::ScoredDoc;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, STORED, STRING, TEXT},
    Index, IndexReader, TantivyDocument,
};

use crate::corpus::CorpusSnapshot;
use crate::RagError;

/// BM25 index over one corpus snapshot
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
}

impl LexicalIndex {
    /// Build a RAM index from index-aligned raw and cleaned chunks
    pub fn build(
        raw: &[docchat_core::Document],
        clean: &[docchat_core::Document],
    ) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer = index
            .writer(15_000_000)
            .map_err(|e| RagError::Index(e.to_string()))?;

        for (raw_doc, clean_doc) in raw.iter().zip(clean.iter()) {
            let mut doc = TantivyDocument::default();
            doc.add_text(id_field, raw_doc.id());
            doc.add_text(text_field, &clean_doc.content);
            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
        })
    }

    /// Top-k chunk ids with BM25 scores. Query syntax errors are tolerated;
    /// whatever parses is searched.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<(String, f32)>, RagError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);

        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(?errors, "lenient query parse dropped some terms");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(k.max(1)))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(addr)
                .map_err(|e| RagError::Search(e.to_string()))?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| match v {
                    OwnedValue::Str(s) => Some(s.as_str()),
                    _ => None,
                })
                .unwrap_or("")
                .to_string();
            results.push((id, score));
        }

        Ok(results)
    }
}

/// BM25 hits for `query` against the snapshot, as (raw chunk, score) pairs
pub fn bm25_search(snapshot: &CorpusSnapshot, query: &str, k: usize) -> Vec<ScoredDoc> {
    if snapshot.is_empty() {
        tracing::warn!("BM25 search on empty corpus, returning no hits");
        return Vec::new();
    }
    let Some(index) = snapshot.lexical() else {
        tracing::warn!("corpus snapshot built without a lexical index");
        return Vec::new();
    };

    let cleaned_query = crate::corpus::preprocess_text(query);
    match index.search(&cleaned_query, k) {
        Ok(hits) => hits
            .into_iter()
            .filter_map(|(id, score)| {
                snapshot.raw_by_id(&id).map(|doc| (doc.clone(), score))
            })
            .collect(),
        Err(e) => {
            tracing::warn!("BM25 search failed: {}", e);
            Vec::new()
        }
    }
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
        CorpusSnapshot::build(docs, true).unwrap()
    }

    #[test]
    fn test_bm25_finds_matching_chunk() {
        let snap = snapshot(&[
            ("The interest rate for savings accounts is 4 percent", "rates.md"),
            ("Branch opening hours are 9 to 5 on weekdays", "hours.md"),
        ]);

        let hits = bm25_search(&snap, "interest rate", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.metadata.source, "rates.md");
        assert!(hits[0].1 > 0.0);
        // raw content comes back, not the cleaned rendition
        assert!(hits[0].0.content.contains("The interest rate"));
    }

    #[test]
    fn test_bm25_empty_corpus_fails_soft() {
        let snap = CorpusSnapshot::empty();
        assert!(bm25_search(&snap, "anything", 5).is_empty());
    }

    #[test]
    fn test_bm25_tolerates_query_syntax() {
        let snap = snapshot(&[("savings account rates", "rates.md")]);
        // unbalanced quote would fail a strict parser
        let hits = bm25_search(&snap, "\"savings rates", 5);
        // must not panic or error; hits may or may not be empty
        let _ = hits;
    }
}
