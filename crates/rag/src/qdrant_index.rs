//! Qdrant-backed vector index
//!
//! Dense vector storage and similarity search over a Qdrant collection.
//! Point ids are UUIDv5 digests of the chunk id (Qdrant only accepts uuid
//! or integer ids); the chunk id itself is carried in the payload along
//! with the rest of the metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docchat_config::VectorStoreConfig;
use docchat_core::{Document, Embedder, Result, ScoredDoc, VectorIndex};
use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CreateCollectionBuilder, Distance, Filter, GetPointsBuilder,
        PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
        Value, VectorParamsBuilder,
    },
    Qdrant,
};
use tracing::info;
use uuid::Uuid;

use crate::RagError;

const SCROLL_PAGE: u32 = 256;

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    /// Connect to Qdrant and create the collection if it does not exist.
    pub async fn new(
        config: &VectorStoreConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        let index = Self {
            client,
            collection: config.collection.clone(),
            embedder,
        };
        index.ensure_collection(config.vector_dim).await?;
        Ok(index)
    }

    async fn ensure_collection(&self, vector_dim: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(vector_dim as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            info!(collection = %self.collection, vector_dim, "created collection");
        }

        Ok(())
    }

    fn point_id(doc_id: &str) -> PointId {
        PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes()).to_string())
    }

    fn source_filter(filter: Option<&str>) -> Option<Filter> {
        filter.map(|source| Filter::must([Condition::matches("source", source.to_string())]))
    }

    fn payload(doc: &Document) -> HashMap<String, Value> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("id".to_string(), doc.id().into());
        payload.insert("content".to_string(), doc.content.clone().into());
        payload.insert("source".to_string(), doc.metadata.source.clone().into());
        payload.insert("is_chunk".to_string(), doc.metadata.is_chunk.into());
        if !doc.metadata.window_ids.is_empty() {
            let ids: Vec<Value> = doc
                .metadata
                .window_ids
                .iter()
                .map(|id| Value::from(id.clone()))
                .collect();
            payload.insert("window_ids".to_string(), ids.into());
        }
        for (key, value) in &doc.metadata.extra {
            payload.insert(format!("extra.{key}"), json_to_value(value.clone()));
        }
        payload
    }

    fn document_from_payload(payload: HashMap<String, Value>) -> Document {
        let mut doc = Document::default();
        for (key, value) in payload {
            match (key.as_str(), value.kind) {
                ("id", Some(Kind::StringValue(s))) => doc.metadata.id = s,
                ("content", Some(Kind::StringValue(s))) => doc.content = s,
                ("source", Some(Kind::StringValue(s))) => doc.metadata.source = s,
                ("is_chunk", Some(Kind::BoolValue(b))) => doc.metadata.is_chunk = b,
                ("window_ids", Some(Kind::ListValue(list))) => {
                    doc.metadata.window_ids = list
                        .values
                        .into_iter()
                        .filter_map(|v| match v.kind {
                            Some(Kind::StringValue(s)) => Some(s),
                            _ => None,
                        })
                        .collect();
                }
                (_, kind) => {
                    if let Some(field) = key.strip_prefix("extra.") {
                        doc.metadata
                            .extra
                            .insert(field.to_string(), kind_to_json(kind));
                    }
                }
            }
        }
        doc
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn similar_texts_with_scores(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredDoc>> {
        let query_emb = self.embedder.embed(query)?;

        let mut builder =
            SearchPointsBuilder::new(&self.collection, query_emb, k as u64).with_payload(true);
        if let Some(f) = Self::source_filter(filter) {
            builder = builder.filter(f);
        }

        let results = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| (Self::document_from_payload(point.payload), point.score))
            .collect())
    }

    async fn get_all_documents(&self, filter: Option<&str>) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(f) = Self::source_filter(filter) {
                builder = builder.filter(f);
            }
            if let Some(o) = offset.take() {
                builder = builder.offset(o);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;

            docs.extend(
                response
                    .result
                    .into_iter()
                    .map(|point| Self::document_from_payload(point.payload)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(docs)
    }

    async fn documents_by_ids(&self, ids: &[String]) -> Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let point_ids: Vec<PointId> = ids.iter().map(|id| Self::point_id(id)).collect();
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, point_ids).with_payload(true),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let mut by_id: HashMap<String, Document> = response
            .result
            .into_iter()
            .map(|point| {
                let doc = Self::document_from_payload(point.payload);
                (doc.id(), doc)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn add_documents(&self, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let points: Vec<PointStruct> = docs
            .iter()
            .zip(embeddings)
            .map(|(doc, emb)| PointStruct::new(Self::point_id(&doc.id()), emb, Self::payload(doc)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        let dim = self.embedder.dim();
        self.ensure_collection(dim).await?;
        Ok(())
    }
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value { kind: None },
        serde_json::Value::Bool(b) => b.into(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        serde_json::Value::String(s) => s.into(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(json_to_value)
            .collect::<Vec<Value>>()
            .into(),
        // Nested objects are stored as their JSON text.
        other @ serde_json::Value::Object(_) => other.to_string().into(),
    }
}

fn kind_to_json(kind: Option<Kind>) -> serde_json::Value {
    match kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(d),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(|v| kind_to_json(v.kind)).collect(),
        ),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, kind_to_json(v.kind)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ids_are_stable_uuids() {
        let a = QdrantIndex::point_id("chunk-1");
        let b = QdrantIndex::point_id("chunk-1");
        let c = QdrantIndex::point_id("chunk-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_payload_round_trip() {
        let doc = Document::new("gold loan rates", "rates.md")
            .with_id("c1")
            .with_extra("genre", "finance");
        let mut doc = doc;
        doc.metadata.is_chunk = true;
        doc.metadata.window_ids = vec!["c1".to_string(), "c2".to_string()];

        let restored = QdrantIndex::document_from_payload(QdrantIndex::payload(&doc));
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_payload_omits_empty_window_ids() {
        let doc = Document::new("text", "a.md").with_id("c1");
        let payload = QdrantIndex::payload(&doc);
        assert!(!payload.contains_key("window_ids"));
    }
}
