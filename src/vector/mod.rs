//! Vector index (C5): two cosine-distance collections (`documents`,
//! `chunks`) holding `(id, vector, payload)` points, searched with an
//! explicit filter DSL and aggregated for cross-document similarity.

mod memory;
mod qdrant;

pub use memory::InMemoryVectorIndex;
pub use qdrant::QdrantVectorIndex;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub const DOCUMENTS_COLLECTION: &str = "documents";
pub const CHUNKS_COLLECTION: &str = "chunks";

/// A single payload field filter. Kept as a closed enum rather than an
/// open map so callers can't construct unsupported filter shapes.
#[derive(Debug, Clone)]
pub enum FieldFilter {
    Eq { field: String, value: Value },
    Range { field: String, gte: Option<f64>, lte: Option<f64> },
    /// Negative filter: payload field must NOT equal `value`.
    NotEq { field: String, value: Value },
}

/// Conjunction of field filters applied to a search or scroll.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub conditions: Vec<FieldFilter>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FieldFilter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn not_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(FieldFilter::NotEq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn range(mut self, field: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        self.conditions.push(FieldFilter::Range {
            field: field.into(),
            gte,
            lte,
        });
        self
    }

    fn matches(&self, payload: &HashMap<String, Value>) -> bool {
        self.conditions.iter().all(|c| match c {
            FieldFilter::Eq { field, value } => payload.get(field) == Some(value),
            FieldFilter::NotEq { field, value } => payload.get(field) != Some(value),
            FieldFilter::Range { field, gte, lte } => {
                let Some(v) = payload.get(field).and_then(|v| v.as_f64()) else {
                    return false;
                };
                gte.map_or(true, |g| v >= g) && lte.map_or(true, |l| v <= l)
            }
        })
    }
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: i64,
    pub score: f32,
    pub payload: HashMap<String, Value>,
}

/// One matched chunk pair discovered by cross-document aggregation.
#[derive(Debug, Clone)]
pub struct CrossDocMatch {
    pub source_chunk_id: i64,
    pub target_chunk_id: i64,
    pub score: f32,
    pub source_payload: HashMap<String, Value>,
    pub target_payload: HashMap<String, Value>,
}

/// Summary info about a collection.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: u64,
}

/// Capability set for the vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create both collections idempotently; an existing collection is success.
    async fn init(&self, dim: usize) -> Result<()>;

    /// Length-checked batch upsert into `chunks`. Every payload must
    /// contain `document_id`.
    async fn upsert_chunks(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        payloads: &[HashMap<String, Value>],
    ) -> Result<()>;

    async fn upsert_document(
        &self,
        id: i64,
        vector: Vec<f32>,
        payload: HashMap<String, Value>,
    ) -> Result<()>;

    async fn search_chunks(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>>;

    async fn search_documents(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Scroll all chunks of `source_doc_id` with vectors; for each, search
    /// target documents (explicit set or all-but-source) and aggregate hits.
    async fn cross_doc_similarities(
        &self,
        source_doc_id: i64,
        target_doc_ids: Option<&[i64]>,
        threshold: f32,
        limit_per_chunk: usize,
    ) -> Result<Vec<CrossDocMatch>>;

    async fn delete_by_document(&self, doc_id: i64) -> Result<()>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    async fn health(&self) -> Result<bool>;
}
