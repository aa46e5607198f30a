//! The Extract-Relationships job: aggregates cross-document chunk
//! similarities from the vector index into typed, confidence-scored
//! `DocumentRelationship` rows.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::models::{ChunkPair, DocumentStatus, DocumentType, RelationshipDetails, RelationshipType};
use crate::store::RowStore;
use crate::vector::{CrossDocMatch, VectorIndex};

const DEFAULT_THRESHOLD: f32 = 0.75;
const DEFAULT_LIMIT_PER_CHUNK: usize = 5;
const SUPERSEDES_SIMILARITY_FLOOR: f32 = 0.90;
const TOP_N_FOR_CONFIDENCE: usize = 10;
const TOP_N_FOR_CHUNK_PAIRS: usize = 20;

#[derive(Default)]
struct Bucket {
    scores: Vec<f32>,
    chunk_pairs: Vec<ChunkPair>,
    sections: BTreeSet<String>,
}

/// Derive and persist relationships from `source_doc_id` to every other
/// `READY` document (or, if `target_doc_ids` is given, just those).
/// Returns the ids of newly inserted relationships.
pub async fn extract_relationships(
    source_doc_id: i64,
    target_doc_ids: Option<Vec<i64>>,
    threshold: Option<f32>,
    limit_per_chunk: Option<usize>,
    store: &RowStore,
    vector_index: &dyn VectorIndex,
) -> Result<Vec<i64>> {
    let source = store
        .get_document(source_doc_id)
        .await?
        .ok_or(PipelineError::DocumentNotFound(source_doc_id))?;
    if source.status() != Some(DocumentStatus::Ready) {
        return Err(PipelineError::DocumentNotReady(source_doc_id).into());
    }

    let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);
    let limit_per_chunk = limit_per_chunk.unwrap_or(DEFAULT_LIMIT_PER_CHUNK);

    let matches = vector_index
        .cross_doc_similarities(source_doc_id, target_doc_ids.as_deref(), threshold, limit_per_chunk)
        .await?;

    let buckets = aggregate_by_target(&matches);

    let mut rows = Vec::new();
    for (target_doc_id, bucket) in buckets {
        if store.relationship_exists(source_doc_id, target_doc_id).await? {
            continue;
        }
        let Some(target) = store.get_document(target_doc_id).await? else {
            continue;
        };
        let (Some(source_type), Some(target_type)) = (source.document_type(), target.document_type()) else {
            continue;
        };

        let mut sorted_scores = bucket.scores.clone();
        sorted_scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let avg_similarity = sorted_scores.iter().sum::<f32>() / sorted_scores.len() as f32;

        let relationship_type = classify(
            source_type,
            target_type,
            source.version.as_deref(),
            target.version.as_deref(),
            avg_similarity,
        );

        let top_n = &sorted_scores[..sorted_scores.len().min(TOP_N_FOR_CONFIDENCE)];
        let confidence = round2(top_n.iter().sum::<f32>() / top_n.len() as f32 * 100.0);

        let summary = summary_for(relationship_type, &source.title, &target.title, confidence);

        let mut chunk_pairs = bucket.chunk_pairs.clone();
        chunk_pairs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        chunk_pairs.truncate(TOP_N_FOR_CHUNK_PAIRS);

        let details = RelationshipDetails {
            matched_chunks_count: sorted_scores.len(),
            avg_similarity,
            max_similarity: sorted_scores[0],
            min_similarity: *sorted_scores.last().unwrap(),
            matched_sections: bucket.sections.into_iter().collect(),
            chunk_pairs,
        };
        let details_json = serde_json::to_string(&details)?;

        rows.push((
            source_doc_id,
            target_doc_id,
            relationship_type.as_str().to_string(),
            confidence,
            summary,
            details_json,
        ));
    }

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    store.insert_relationships_batch(&rows).await
}

fn aggregate_by_target(matches: &[CrossDocMatch]) -> HashMap<i64, Bucket> {
    let mut buckets: HashMap<i64, Bucket> = HashMap::new();
    for m in matches {
        let Some(target_doc_id) = m.target_payload.get("document_id").and_then(Value::as_i64) else {
            continue;
        };
        let bucket = buckets.entry(target_doc_id).or_default();
        bucket.scores.push(m.score);
        bucket.chunk_pairs.push(ChunkPair {
            source_chunk_id: m.source_chunk_id,
            target_chunk_id: m.target_chunk_id,
            score: m.score,
        });
        if let Some(title) = m.source_payload.get("section_title").and_then(Value::as_str) {
            bucket.sections.insert(title.to_string());
        }
        if let Some(title) = m.target_payload.get("section_title").and_then(Value::as_str) {
            bucket.sections.insert(title.to_string());
        }
    }
    buckets
}

fn classify(
    source_type: DocumentType,
    target_type: DocumentType,
    source_version: Option<&str>,
    target_version: Option<&str>,
    avg_similarity: f32,
) -> RelationshipType {
    match (source_type, target_type) {
        (DocumentType::Norm, DocumentType::Guideline) => RelationshipType::Compliance,
        (DocumentType::Guideline, DocumentType::Norm) => RelationshipType::Reference,
        (DocumentType::Guideline, DocumentType::Guideline) => RelationshipType::Similar,
        (DocumentType::Norm, DocumentType::Norm) => {
            let supersedes = avg_similarity > SUPERSEDES_SIMILARITY_FLOOR
                && matches!((source_version, target_version), (Some(sv), Some(tv)) if sv > tv);
            if supersedes {
                RelationshipType::Supersedes
            } else {
                RelationshipType::Similar
            }
        }
    }
}

fn summary_for(kind: RelationshipType, source_title: &str, target_title: &str, confidence: f32) -> String {
    match kind {
        RelationshipType::Compliance => format!(
            "'{target_title}' appears to implement or comply with requirements from '{source_title}' (confidence: {confidence:.1}%)"
        ),
        RelationshipType::Reference => format!(
            "'{source_title}' references guidance from '{target_title}' (confidence: {confidence:.1}%)"
        ),
        RelationshipType::Supersedes => format!(
            "'{source_title}' supersedes the earlier version '{target_title}' (confidence: {confidence:.1}%)"
        ),
        RelationshipType::Similar => format!(
            "'{source_title}' and '{target_title}' cover substantially similar content (confidence: {confidence:.1}%)"
        ),
        RelationshipType::Conflict => format!(
            "'{source_title}' may conflict with '{target_title}' (confidence: {confidence:.1}%)"
        ),
    }
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::InMemoryVectorIndex;
    use std::collections::HashMap as StdHashMap;

    fn payload(document_id: i64, section_title: Option<&str>) -> StdHashMap<String, Value> {
        let mut p = StdHashMap::new();
        p.insert("document_id".to_string(), Value::from(document_id));
        if let Some(title) = section_title {
            p.insert("section_title".to_string(), Value::from(title));
        }
        p
    }

    #[test]
    fn test_classify_norm_guideline_is_compliance() {
        let t = classify(DocumentType::Norm, DocumentType::Guideline, None, None, 0.5);
        assert_eq!(t, RelationshipType::Compliance);
    }

    #[test]
    fn test_classify_guideline_norm_is_reference() {
        let t = classify(DocumentType::Guideline, DocumentType::Norm, None, None, 0.5);
        assert_eq!(t, RelationshipType::Reference);
    }

    #[test]
    fn test_classify_norm_norm_supersedes_when_similar_and_newer_version() {
        let t = classify(DocumentType::Norm, DocumentType::Norm, Some("2"), Some("1"), 0.93);
        assert_eq!(t, RelationshipType::Supersedes);
    }

    #[test]
    fn test_classify_norm_norm_falls_back_to_similar() {
        let t = classify(DocumentType::Norm, DocumentType::Norm, Some("1"), Some("2"), 0.93);
        assert_eq!(t, RelationshipType::Similar);

        let t = classify(DocumentType::Norm, DocumentType::Norm, None, None, 0.95);
        assert_eq!(t, RelationshipType::Similar);

        let t = classify(DocumentType::Norm, DocumentType::Norm, Some("2"), Some("1"), 0.5);
        assert_eq!(t, RelationshipType::Similar);
    }

    #[test]
    fn test_compliance_summary_matches_exact_template() {
        let summary = summary_for(RelationshipType::Compliance, "Guideline G", "Norm N", 93.0);
        assert_eq!(
            summary,
            "'Norm N' appears to implement or comply with requirements from 'Guideline G' (confidence: 93.0%)"
        );
    }

    #[test]
    fn test_aggregate_by_target_groups_matches_and_dedupes_sections() {
        let matches = vec![
            CrossDocMatch {
                source_chunk_id: 1,
                target_chunk_id: 10,
                score: 0.9,
                source_payload: payload(1, Some("Scope")),
                target_payload: payload(2, Some("Scope")),
            },
            CrossDocMatch {
                source_chunk_id: 2,
                target_chunk_id: 11,
                score: 0.8,
                source_payload: payload(1, Some("Scope")),
                target_payload: payload(2, Some("Definitions")),
            },
        ];
        let buckets = aggregate_by_target(&matches);
        let bucket = buckets.get(&2).unwrap();
        assert_eq!(bucket.scores.len(), 2);
        assert_eq!(bucket.sections.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_non_ready_source_document() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let id = store
            .insert_document("A", "NORM", "a.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        let vector_index = InMemoryVectorIndex::new();

        let result = extract_relationships(id, None, None, None, &store, &vector_index).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_matches_inserts_nothing() {
        let store = RowStore::connect("sqlite::memory:", 5).await.unwrap();
        let id = store
            .insert_document("A", "NORM", "a.pdf", "pdf", 1, None, None, "[]", None, None)
            .await
            .unwrap();
        store.mark_document_ready(id).await.unwrap();
        let vector_index = InMemoryVectorIndex::new();

        let inserted = extract_relationships(id, None, None, None, &store, &vector_index)
            .await
            .unwrap();
        assert!(inserted.is_empty());
    }
}
