//! The semantic-search read path: embed a query, search the `chunks`
//! collection, and fall back to a substring scan over the row store when
//! the vector index is unavailable.

use tracing::warn;

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::models::DocumentType;
use crate::store::RowStore;
use crate::vector::{Filter, ScoredPoint, VectorIndex};

const CHUNK_TEXT_PREVIEW_LEN: usize = 500;
const LIKE_FALLBACK_SIMILARITY: f32 = 0.5;

/// One ranked search result, ordered by descending `similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub document_title: Option<String>,
    pub section_title: Option<String>,
    pub chunk_text: String,
    pub similarity: f32,
}

pub async fn search(
    query: &str,
    document_type: Option<DocumentType>,
    limit: usize,
    threshold: f32,
    embedder: &dyn EmbeddingProvider,
    vector_index: &dyn VectorIndex,
    store: &RowStore,
) -> Result<Vec<SearchHit>> {
    let query_vector = embedder.embed(query).await?;
    let filter = document_type.map(|dt| Filter::new().eq("document_type", dt.as_str()));

    match vector_index
        .search_chunks(&query_vector, limit, threshold, filter)
        .await
    {
        Ok(hits) => {
            let mut resolved = Vec::with_capacity(hits.len());
            for hit in hits {
                if let Some(search_hit) = resolve_hit(hit, store).await? {
                    resolved.push(search_hit);
                }
            }
            Ok(resolved)
        }
        Err(err) => {
            warn!(error = %err, "vector index unavailable, falling back to substring search");
            fallback_search(query, limit, store).await
        }
    }
}

async fn resolve_hit(hit: ScoredPoint, store: &RowStore) -> Result<Option<SearchHit>> {
    let payload_document_id = hit.payload.get("document_id").and_then(|v| v.as_i64());
    let payload_chunk_text = hit.payload.get("chunk_text").and_then(|v| v.as_str());
    let payload_document_title = hit.payload.get("document_title").and_then(|v| v.as_str());
    let payload_section_title = hit.payload.get("section_title").and_then(|v| v.as_str());

    let (document_id, chunk_text, document_title, section_title) =
        if let (Some(document_id), Some(chunk_text)) = (payload_document_id, payload_chunk_text) {
            (
                document_id,
                chunk_text.to_string(),
                payload_document_title.map(str::to_string),
                payload_section_title.map(str::to_string),
            )
        } else {
            let Some(chunk) = store.get_chunk(hit.id).await? else {
                return Ok(None);
            };
            let document = store.get_document(chunk.doc_id).await?;
            (
                chunk.doc_id,
                chunk.chunk_text,
                document.map(|d| d.title),
                chunk.section_title,
            )
        };

    Ok(Some(SearchHit {
        chunk_id: hit.id,
        document_id,
        document_title,
        section_title,
        chunk_text: truncate_chars(&chunk_text, CHUNK_TEXT_PREVIEW_LEN),
        similarity: hit.score,
    }))
}

async fn fallback_search(query: &str, limit: usize, store: &RowStore) -> Result<Vec<SearchHit>> {
    let chunks = store.search_chunks_like(query, limit as i64).await?;
    let mut hits = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let document = store.get_document(chunk.doc_id).await?;
        hits.push(SearchHit {
            chunk_id: chunk.id,
            document_id: chunk.doc_id,
            document_title: document.map(|d| d.title),
            section_title: chunk.section_title,
            chunk_text: truncate_chars(&chunk.chunk_text, CHUNK_TEXT_PREVIEW_LEN),
            similarity: LIKE_FALLBACK_SIMILARITY,
        });
    }
    Ok(hits)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VectorIndexError;
    use crate::vector::{CollectionInfo, CrossDocMatch, InMemoryVectorIndex};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn dim(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    struct AlwaysUnavailableVectorIndex;

    #[async_trait]
    impl VectorIndex for AlwaysUnavailableVectorIndex {
        async fn init(&self, _dim: usize) -> Result<()> {
            Ok(())
        }

        async fn upsert_chunks(
            &self,
            _ids: &[i64],
            _vectors: &[Vec<f32>],
            _payloads: &[HashMap<String, serde_json::Value>],
        ) -> Result<()> {
            Ok(())
        }

        async fn upsert_document(
            &self,
            _id: i64,
            _vector: Vec<f32>,
            _payload: HashMap<String, serde_json::Value>,
        ) -> Result<()> {
            Ok(())
        }

        async fn search_chunks(
            &self,
            _query_vector: &[f32],
            _limit: usize,
            _score_threshold: f32,
            _filter: Option<Filter>,
        ) -> Result<Vec<ScoredPoint>> {
            Err(VectorIndexError::Unavailable("connection refused".to_string()).into())
        }

        async fn search_documents(
            &self,
            _query_vector: &[f32],
            _limit: usize,
            _score_threshold: f32,
            _filter: Option<Filter>,
        ) -> Result<Vec<ScoredPoint>> {
            Err(VectorIndexError::Unavailable("connection refused".to_string()).into())
        }

        async fn cross_doc_similarities(
            &self,
            _source_doc_id: i64,
            _target_doc_ids: Option<&[i64]>,
            _threshold: f32,
            _limit_per_chunk: usize,
        ) -> Result<Vec<CrossDocMatch>> {
            Err(VectorIndexError::Unavailable("connection refused".to_string()).into())
        }

        async fn delete_by_document(&self, _doc_id: i64) -> Result<()> {
            Ok(())
        }

        async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
            Err(VectorIndexError::Unavailable(format!("{name} unavailable")).into())
        }

        async fn health(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_substring_scan_when_vector_index_unavailable() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let doc_id = store
            .insert_document("Privacy Norm", "NORM", "a.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        store
            .insert_chunks(
                doc_id,
                &[(0, "discusses data privacy obligations".to_string(), None, None, None)],
            )
            .await
            .unwrap();

        let vector_index = AlwaysUnavailableVectorIndex;
        let embedder = StubEmbedder;

        let hits = search("privacy", None, 10, 0.9, &embedder, &vector_index, &store)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, LIKE_FALLBACK_SIMILARITY);
    }

    #[tokio::test]
    async fn test_empty_vector_index_returns_no_hits() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let vector_index = InMemoryVectorIndex::new();
        vector_index.init(4).await.unwrap();
        let embedder = StubEmbedder;

        let hits = search("anything", None, 10, 0.9, &embedder, &vector_index, &store)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let text = "a".repeat(600);
        let truncated = truncate_chars(&text, 500);
        assert_eq!(truncated.chars().count(), 500);
    }
}
