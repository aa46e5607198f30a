//! In-process `VectorIndex` test double, mirroring `blob::InMemoryBlobStore`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, VectorIndexError};

use super::{
    CollectionInfo, CrossDocMatch, Filter, ScoredPoint, VectorIndex, CHUNKS_COLLECTION,
    DOCUMENTS_COLLECTION,
};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    ((dot / (norm_a * norm_b)) + 1.0) / 2.0
}

#[derive(Clone)]
struct Point {
    id: i64,
    vector: Vec<f32>,
    payload: HashMap<String, Value>,
}

#[derive(Default)]
struct Collection {
    points: HashMap<i64, Point>,
}

/// A process-local stand-in for Qdrant, used in tests and local development.
pub struct InMemoryVectorIndex {
    dim: Mutex<Option<usize>>,
    documents: Mutex<Collection>,
    chunks: Mutex<Collection>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            dim: Mutex::new(None),
            documents: Mutex::new(Collection::default()),
            chunks: Mutex::new(Collection::default()),
        }
    }

    fn search(collection: &Collection, query: &[f32], limit: usize, threshold: f32, filter: Option<&Filter>) -> Vec<ScoredPoint> {
        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id,
                score: cosine(query, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn init(&self, dim: usize) -> Result<()> {
        let mut guard = self.dim.lock().unwrap();
        *guard = Some(dim);
        Ok(())
    }

    async fn upsert_chunks(
        &self,
        ids: &[i64],
        vectors: &[Vec<f32>],
        payloads: &[HashMap<String, Value>],
    ) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != payloads.len() {
            return Err(VectorIndexError::LengthMismatch.into());
        }
        for payload in payloads {
            if !payload.contains_key("document_id") {
                return Err(VectorIndexError::MissingPayloadField("document_id".to_string()).into());
            }
        }

        let mut chunks = self.chunks.lock().unwrap();
        for ((id, vector), payload) in ids.iter().zip(vectors.iter()).zip(payloads.iter()) {
            chunks.points.insert(
                *id,
                Point {
                    id: *id,
                    vector: vector.clone(),
                    payload: payload.clone(),
                },
            );
        }
        Ok(())
    }

    async fn upsert_document(&self, id: i64, vector: Vec<f32>, payload: HashMap<String, Value>) -> Result<()> {
        let mut documents = self.documents.lock().unwrap();
        documents.points.insert(id, Point { id, vector, payload });
        Ok(())
    }

    async fn search_chunks(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let chunks = self.chunks.lock().unwrap();
        Ok(Self::search(&chunks, query_vector, limit, score_threshold, filter.as_ref()))
    }

    async fn search_documents(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        let documents = self.documents.lock().unwrap();
        Ok(Self::search(&documents, query_vector, limit, score_threshold, filter.as_ref()))
    }

    async fn cross_doc_similarities(
        &self,
        source_doc_id: i64,
        target_doc_ids: Option<&[i64]>,
        threshold: f32,
        limit_per_chunk: usize,
    ) -> Result<Vec<CrossDocMatch>> {
        let chunks = self.chunks.lock().unwrap();

        let source_points: Vec<Point> = chunks
            .points
            .values()
            .filter(|p| p.payload.get("document_id").and_then(|v| v.as_i64()) == Some(source_doc_id))
            .cloned()
            .collect();

        let mut matches = Vec::new();
        for source in &source_points {
            let target_filters: Vec<Filter> = match target_doc_ids {
                Some(targets) => targets.iter().map(|t| Filter::new().eq("document_id", *t)).collect(),
                None => vec![Filter::new().not_eq("document_id", source_doc_id)],
            };

            for filter in target_filters {
                let hits = Self::search(&chunks, &source.vector, limit_per_chunk, threshold, Some(&filter));
                for hit in hits {
                    if hit.id == source.id {
                        continue;
                    }
                    matches.push(CrossDocMatch {
                        source_chunk_id: source.id,
                        target_chunk_id: hit.id,
                        score: hit.score,
                        source_payload: source.payload.clone(),
                        target_payload: hit.payload,
                    });
                }
            }
        }
        Ok(matches)
    }

    async fn delete_by_document(&self, doc_id: i64) -> Result<()> {
        let mut chunks = self.chunks.lock().unwrap();
        chunks
            .points
            .retain(|_, p| p.payload.get("document_id").and_then(|v| v.as_i64()) != Some(doc_id));

        let mut documents = self.documents.lock().unwrap();
        documents.points.remove(&doc_id);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let points_count = match name {
            DOCUMENTS_COLLECTION => self.documents.lock().unwrap().points.len() as u64,
            CHUNKS_COLLECTION => self.chunks.lock().unwrap().points.len() as u64,
            other => return Err(VectorIndexError::Unavailable(format!("unknown collection {other}")).into()),
        };
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count,
        })
    }

    async fn health(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(document_id: i64) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("document_id".to_string(), Value::from(document_id));
        map
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let index = InMemoryVectorIndex::new();
        index.init(384).await.unwrap();
        index.init(384).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_chunks_requires_document_id() {
        let index = InMemoryVectorIndex::new();
        let err = index
            .upsert_chunks(&[1], &[vec![1.0, 0.0]], &[HashMap::new()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("document_id"));
    }

    #[tokio::test]
    async fn test_upsert_chunks_rejects_length_mismatch() {
        let index = InMemoryVectorIndex::new();
        let err = index
            .upsert_chunks(&[1, 2], &[vec![1.0, 0.0]], &[payload(1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::VectorIndex(VectorIndexError::LengthMismatch)
        ));
    }

    #[tokio::test]
    async fn test_search_chunks_returns_best_match_first() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_chunks(
                &[1, 2],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                &[payload(10), payload(10)],
            )
            .await
            .unwrap();

        let hits = index
            .search_chunks(&[1.0, 0.0], 5, 0.0, None)
            .await
            .unwrap();
        assert_eq!(hits[0].id, 1);
    }

    #[tokio::test]
    async fn test_search_chunks_respects_filter() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_chunks(&[1, 2], &[vec![1.0, 0.0], vec![1.0, 0.0]], &[payload(10), payload(20)])
            .await
            .unwrap();

        let hits = index
            .search_chunks(&[1.0, 0.0], 5, 0.0, Some(Filter::new().eq("document_id", 20)))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[tokio::test]
    async fn test_cross_doc_similarities_excludes_source_document() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_chunks(
                &[1, 2, 3],
                &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
                &[payload(10), payload(20), payload(10)],
            )
            .await
            .unwrap();

        let matches = index.cross_doc_similarities(10, None, 0.0, 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].target_chunk_id, 2);
    }

    #[tokio::test]
    async fn test_delete_by_document_removes_chunks_and_document() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert_chunks(&[1], &[vec![1.0, 0.0]], &[payload(10)])
            .await
            .unwrap();
        index.upsert_document(10, vec![1.0, 0.0], payload(10)).await.unwrap();

        index.delete_by_document(10).await.unwrap();

        let chunk_info = index.collection_info(CHUNKS_COLLECTION).await.unwrap();
        let doc_info = index.collection_info(DOCUMENTS_COLLECTION).await.unwrap();
        assert_eq!(chunk_info.points_count, 0);
        assert_eq!(doc_info.points_count, 0);
    }

    #[tokio::test]
    async fn test_health_reports_true() {
        let index = InMemoryVectorIndex::new();
        assert!(index.health().await.unwrap());
    }
}
