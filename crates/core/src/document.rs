//! Document types
//!
//! A `Document` is one chunk of a source document, the atomic unit of
//! retrieval. Chunk ids are stable: either assigned at ingestion or
//! derived from a content hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A document paired with a relevance score.
///
/// Score semantics differ by producer (BM25 rank score, fuzzy-match score,
/// vector similarity, or a 0.0 placeholder) and are never comparable
/// across producers.
pub type ScoredDoc = (Document, f32);

/// Chunk metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Stable chunk id, unique within a collection. Empty until assigned;
    /// `Document::id()` falls back to a content hash.
    #[serde(default)]
    pub id: String,

    /// Source of the chunk (file path, URL, collection name)
    #[serde(default)]
    pub source: String,

    /// Ordered ids of neighboring chunks (including this one), used for
    /// context-window expansion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub window_ids: Vec<String>,

    /// Whether this document is already a chunk (vs. an unsplit original)
    #[serde(default)]
    pub is_chunk: bool,

    /// Arbitrary extra fields carried alongside the canonical ones.
    /// BTreeMap keeps serialization deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocMetadata {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

/// One chunk of text plus its metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: DocMetadata,
}

impl Document {
    /// Create a document with the given content and source
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocMetadata::new("", source),
        }
    }

    /// Set the chunk id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = id.into();
        self
    }

    /// Attach an extra metadata field
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// The chunk's stable id: the assigned metadata id, or a content hash
    /// when no id was assigned.
    pub fn id(&self) -> String {
        if self.metadata.id.is_empty() {
            self.content_hash()
        } else {
            self.metadata.id.clone()
        }
    }

    /// SHA-256 hash of content and source, hex-encoded.
    /// Stable across runs, so re-ingesting identical chunks dedups cleanly.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.metadata.source.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Whether only the canonical {content, metadata} fields are populated,
    /// i.e. metadata carries no extra structured fields. Window expansion
    /// is only safe in that case, since merged content cannot be
    /// re-attributed to unknown fields.
    pub fn has_only_canonical_fields(&self) -> bool {
        self.metadata.extra.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = Document::new("gold loan rates", "rates.md");
        let b = Document::new("gold loan rates", "rates.md");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 64);
    }

    #[test]
    fn test_hash_differs_by_source() {
        let a = Document::new("same text", "a.md");
        let b = Document::new("same text", "b.md");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_assigned_id_wins() {
        let doc = Document::new("text", "src").with_id("chunk-7");
        assert_eq!(doc.id(), "chunk-7");
    }

    #[test]
    fn test_canonical_fields_check() {
        let plain = Document::new("text", "src");
        assert!(plain.has_only_canonical_fields());

        let extra = Document::new("text", "src").with_extra("genre", "drama");
        assert!(!extra.has_only_canonical_fields());
    }
}
