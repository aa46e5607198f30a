//! Qdrant-backed `VectorIndex` implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::client::QdrantClient;
use qdrant_client::qdrant::points_selector::PointsSelectorOneOf;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigOneOf;
use qdrant_client::qdrant::{
    value::Kind, Condition, CreateCollection, DeletePoints, Distance, FieldCondition, Filter as QdrantFilter, Match,
    PointId, PointStruct, PointsSelector, Range as QdrantRange, ScrollPoints, SearchParams, SearchPoints,
    UpsertPoints, Value as QdrantValue, VectorParams, VectorsConfig,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, VectorIndexError};

use super::{
    CollectionInfo, CrossDocMatch, FieldFilter, Filter, ScoredPoint, VectorIndex, CHUNKS_COLLECTION,
    DOCUMENTS_COLLECTION,
};

pub struct QdrantVectorIndex {
    client: QdrantClient,
}

impl QdrantVectorIndex {
    pub fn connect(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = QdrantClient::from_url(url);
        if let Some(key) = api_key {
            builder = builder.with_api_key(key);
        }
        let client = builder.build().map_err(|e| VectorIndexError::InitFailed(e.to_string()))?;
        Ok(Self { client })
    }

    async fn create_collection_if_absent(&self, name: &str, dim: usize) -> Result<()> {
        let vectors_config = VectorsConfig {
            config: Some(VectorsConfigOneOf::Params(VectorParams {
                size: dim as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let result = self
            .client
            .create_collection(&CreateCollection {
                collection_name: name.to_string(),
                vectors_config: Some(vectors_config),
                ..Default::default()
            })
            .await;

        match result {
            Ok(_) => {
                info!(collection = name, "collection created");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                if message.contains("already exists") || message.contains("409") {
                    Ok(())
                } else {
                    Err(VectorIndexError::InitFailed(message).into())
                }
            }
        }
    }

    fn build_qdrant_filter(filter: &Filter) -> QdrantFilter {
        let mut must = Vec::new();
        let mut must_not = Vec::new();

        for condition in &filter.conditions {
            match condition {
                FieldFilter::Eq { field, value } => {
                    must.push(Condition::field(FieldCondition {
                        key: field.clone(),
                        r#match: Some(Match {
                            match_value: Some(json_to_match_value(value)),
                        }),
                        ..Default::default()
                    }));
                }
                FieldFilter::NotEq { field, value } => {
                    must_not.push(Condition::field(FieldCondition {
                        key: field.clone(),
                        r#match: Some(Match {
                            match_value: Some(json_to_match_value(value)),
                        }),
                        ..Default::default()
                    }));
                }
                FieldFilter::Range { field, gte, lte } => {
                    must.push(Condition::field(FieldCondition {
                        key: field.clone(),
                        range: Some(QdrantRange {
                            gte: *gte,
                            lte: *lte,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }));
                }
            }
        }

        QdrantFilter {
            must,
            must_not,
            ..Default::default()
        }
    }
}

fn json_to_match_value(value: &Value) -> MatchValue {
    match value {
        Value::String(s) => MatchValue::Keyword(s.clone()),
        Value::Number(n) if n.is_i64() => MatchValue::Integer(n.as_i64().unwrap()),
        Value::Bool(b) => MatchValue::Boolean(*b),
        other => MatchValue::Keyword(other.to_string()),
    }
}

fn payload_to_map(payload: HashMap<String, QdrantValue>) -> HashMap<String, Value> {
    payload
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v.kind).map(|j| (k, j)))
        .collect()
}

fn qdrant_value_to_json(kind: Option<Kind>) -> Option<Value> {
    match kind? {
        Kind::StringValue(s) => Some(Value::String(s)),
        Kind::IntegerValue(i) => Some(Value::from(i)),
        Kind::DoubleValue(d) => Some(Value::from(d)),
        Kind::BoolValue(b) => Some(Value::Bool(b)),
        _ => None,
    }
}

fn json_value_to_qdrant(value: &Value) -> QdrantValue {
    let kind = match value {
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Number(n) if n.is_i64() => Kind::IntegerValue(n.as_i64().unwrap()),
        Value::Number(n) => Kind::DoubleValue(n.as_f64().unwrap_or(0.0)),
        Value::Bool(b) => Kind::BoolValue(*b),
        other => Kind::StringValue(other.to_string()),
    };
    QdrantValue { kind: Some(kind) }
}

fn json_payload(payload: &HashMap<String, Value>) -> HashMap<String, QdrantValue> {
    payload.iter().map(|(k, v)| (k.clone(), json_value_to_qdrant(v))).collect()
}

fn point_id(id: i64) -> PointId {
    (id as u64).into()
}

fn extract_point_id(id: Option<PointId>) -> Option<i64> {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(n as i64),
        PointIdOptions::Uuid(_) => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn init(&self, dim: usize) -> Result<()> {
        self.create_collection_if_absent(DOCUMENTS_COLLECTION, dim).await?;
        self.create_collection_if_absent(CHUNKS_COLLECTION, dim).await?;
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

        let points: Vec<PointStruct> = ids
            .iter()
            .zip(vectors.iter())
            .zip(payloads.iter())
            .map(|((id, vector), payload)| PointStruct {
                id: Some(point_id(*id)),
                vectors: Some(vector.clone().into()),
                payload: json_payload(payload),
            })
            .collect();

        self.client
            .upsert_points(UpsertPoints {
                collection_name: CHUNKS_COLLECTION.to_string(),
                points,
                ..Default::default()
            })
            .await
            .map_err(|e| VectorIndexError::UpsertFailed(e.to_string()))?;

        Ok(())
    }

    async fn upsert_document(&self, id: i64, vector: Vec<f32>, payload: HashMap<String, Value>) -> Result<()> {
        let point = PointStruct {
            id: Some(point_id(id)),
            vectors: Some(vector.into()),
            payload: json_payload(&payload),
        };

        self.client
            .upsert_points(UpsertPoints {
                collection_name: DOCUMENTS_COLLECTION.to_string(),
                points: vec![point],
                ..Default::default()
            })
            .await
            .map_err(|e| VectorIndexError::UpsertFailed(e.to_string()))?;
        Ok(())
    }

    async fn search_chunks(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        search_collection(&self.client, CHUNKS_COLLECTION, query_vector, limit, score_threshold, filter).await
    }

    async fn search_documents(
        &self,
        query_vector: &[f32],
        limit: usize,
        score_threshold: f32,
        filter: Option<Filter>,
    ) -> Result<Vec<ScoredPoint>> {
        search_collection(&self.client, DOCUMENTS_COLLECTION, query_vector, limit, score_threshold, filter).await
    }

    async fn cross_doc_similarities(
        &self,
        source_doc_id: i64,
        target_doc_ids: Option<&[i64]>,
        threshold: f32,
        limit_per_chunk: usize,
    ) -> Result<Vec<CrossDocMatch>> {
        let scroll_filter = Self::build_qdrant_filter(&Filter::new().eq("document_id", source_doc_id));

        let scrolled = self
            .client
            .scroll(&ScrollPoints {
                collection_name: CHUNKS_COLLECTION.to_string(),
                filter: Some(scroll_filter),
                limit: Some(1000),
                with_vectors: Some(true.into()),
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorIndexError::SearchFailed(e.to_string()))?;

        let mut matches = Vec::new();

        for point in scrolled.result {
            let Some(source_chunk_id) = extract_point_id(point.id) else {
                continue;
            };
            let source_payload = payload_to_map(point.payload);
            let Some(query_vector) = point.vectors.and_then(|v| v.vectors_options).and_then(|v| match v {
                qdrant_client::qdrant::vectors::VectorsOptions::Vector(vec) => Some(vec.data),
                _ => None,
            }) else {
                continue;
            };

            let target_filters: Vec<Filter> = match target_doc_ids {
                Some(targets) => targets.iter().map(|t| Filter::new().eq("document_id", *t)).collect(),
                None => vec![Filter::new().not_eq("document_id", source_doc_id)],
            };

            for filter in target_filters {
                let hits = search_collection(
                    &self.client,
                    CHUNKS_COLLECTION,
                    &query_vector,
                    limit_per_chunk,
                    threshold,
                    Some(filter),
                )
                .await?;

                for hit in hits {
                    matches.push(CrossDocMatch {
                        source_chunk_id,
                        target_chunk_id: hit.id,
                        score: hit.score,
                        source_payload: source_payload.clone(),
                        target_payload: hit.payload,
                    });
                }
            }
        }

        Ok(matches)
    }

    async fn delete_by_document(&self, doc_id: i64) -> Result<()> {
        let filter = Self::build_qdrant_filter(&Filter::new().eq("document_id", doc_id));
        self.client
            .delete_points(&DeletePoints {
                collection_name: CHUNKS_COLLECTION.to_string(),
                points: Some(PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Filter(filter)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorIndexError::DeleteFailed(e.to_string()))?;

        let by_id = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Points(
                qdrant_client::qdrant::PointsIdsList {
                    ids: vec![point_id(doc_id)],
                },
            )),
        };

        if let Err(err) = self
            .client
            .delete_points(&DeletePoints {
                collection_name: DOCUMENTS_COLLECTION.to_string(),
                points: Some(by_id),
                ..Default::default()
            })
            .await
        {
            warn!(document_id = doc_id, error = %err, "document point deletion failed, ignoring");
        }

        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let info = self
            .client
            .collection_info(name)
            .await
            .map_err(|e| VectorIndexError::Unavailable(e.to_string()))?;

        let points_count = info.result.and_then(|r| r.points_count).unwrap_or(0);
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count,
        })
    }

    async fn health(&self) -> Result<bool> {
        match self.client.list_collections().await {
            Ok(collections) => {
                let names: Vec<String> = collections.collections.into_iter().map(|c| c.name).collect();
                Ok(names.contains(&CHUNKS_COLLECTION.to_string()) && names.contains(&DOCUMENTS_COLLECTION.to_string()))
            }
            Err(err) => {
                warn!(error = %err, "qdrant health check failed");
                Ok(false)
            }
        }
    }
}

async fn search_collection(
    client: &QdrantClient,
    collection: &str,
    query_vector: &[f32],
    limit: usize,
    score_threshold: f32,
    filter: Option<Filter>,
) -> Result<Vec<ScoredPoint>> {
    let search_params = SearchParams {
        exact: Some(false),
        ..Default::default()
    };

    // Qdrant's `Distance::Cosine` yields raw cosine in [-1, 1]; our threshold
    // and returned scores are normalized to [0, 1] via (cos + 1) / 2, so
    // convert the threshold into raw-cosine space before handing it to Qdrant.
    let raw_score_threshold = score_threshold * 2.0 - 1.0;

    let response = client
        .search_points(&SearchPoints {
            collection_name: collection.to_string(),
            vector: query_vector.to_vec(),
            limit: limit as u64,
            score_threshold: Some(raw_score_threshold),
            filter: filter.map(|f| QdrantVectorIndex::build_qdrant_filter(&f)),
            params: Some(search_params),
            with_payload: Some(true.into()),
            ..Default::default()
        })
        .await
        .map_err(|e| VectorIndexError::SearchFailed(e.to_string()))?;

    Ok(response
        .result
        .into_iter()
        .filter_map(|hit| {
            let id = extract_point_id(hit.id)?;
            Some(ScoredPoint {
                id,
                score: (hit.score + 1.0) / 2.0,
                payload: payload_to_map(hit.payload),
            })
        })
        .collect())
}
