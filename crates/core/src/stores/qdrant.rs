use crate::error::SearchError;
use crate::models::{EntityKind, SimilarEntity, VectorPoint};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ENTITY_ID_FIELD: &str = "entity_id";

/// One collection per entity kind: `{prefix}_candidate` and `{prefix}_job`.
pub struct QdrantStore {
    endpoint: String,
    collection_prefix: String,
    api_key: Option<String>,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection_prefix: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.into(),
            api_key: None,
            client: Client::new(),
            vector_size,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn collection(&self, kind: EntityKind) -> String {
        format!("{}_{}", self.collection_prefix, kind.as_str())
    }

    /// Creates both collections with cosine distance when they are missing.
    pub async fn ensure_collections(&self) -> Result<(), SearchError> {
        for kind in [EntityKind::Candidate, EntityKind::Job] {
            let collection = self.collection(kind);
            let url = format!("{}/collections/{}", self.endpoint, collection);
            let response = self.authorized(self.client.get(&url)).send().await?;
            if response.status().is_success() {
                continue;
            }
            if response.status() != StatusCode::NOT_FOUND {
                return Err(backend_error(response).await);
            }

            let response = self
                .authorized(self.client.put(&url))
                .json(&json!({
                    "vectors": { "size": self.vector_size, "distance": "Cosine" }
                }))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(backend_error(response).await);
            }
            info!(collection = %collection, size = self.vector_size, "created qdrant collection");
        }
        Ok(())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.header("api-key", api_key),
            None => request,
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.vector_size {
            return Err(SearchError::DimensionMismatch {
                expected: self.vector_size,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Qdrant only accepts integers or UUIDs as point ids, so entity ids are
/// mapped to a stable name-based UUID and the original id travels in the
/// payload.
pub fn point_id(kind: EntityKind, entity_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", kind.as_str(), entity_id).as_bytes(),
    )
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert_vector(
        &self,
        kind: EntityKind,
        entity_id: &str,
        vector: &[f32],
        mut payload: Map<String, Value>,
    ) -> Result<(), SearchError> {
        self.check_dimensions(vector)?;
        payload.insert(ENTITY_ID_FIELD.to_string(), Value::from(entity_id));

        let response = self
            .authorized(self.client.put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint,
                self.collection(kind)
            )))
            .json(&json!({
                "points": [{
                    "id": point_id(kind, entity_id),
                    "vector": vector,
                    "payload": payload,
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }
        debug!(kind = kind.as_str(), entity_id, "vector upserted");
        Ok(())
    }

    async fn delete_vector(&self, kind: EntityKind, entity_id: &str) -> Result<(), SearchError> {
        let response = self
            .authorized(self.client.post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint,
                self.collection(kind)
            )))
            .json(&json!({ "points": [point_id(kind, entity_id)] }))
            .send()
            .await?;

        // Nothing to delete from a collection that was never created.
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(backend_error(response).await)
    }

    async fn fetch_point(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<VectorPoint>, SearchError> {
        let response = self
            .authorized(self.client.post(format!(
                "{}/collections/{}/points",
                self.endpoint,
                self.collection(kind)
            )))
            .json(&json!({
                "ids": [point_id(kind, entity_id)],
                "with_payload": true,
                "with_vector": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let body: Value = response.json().await?;
        parse_point(&body)
    }

    async fn find_similar(
        &self,
        kind: EntityKind,
        query_vector: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarEntity>, SearchError> {
        self.check_dimensions(query_vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let collection = self.collection(kind);
        let response = self
            .authorized(self.client.post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, collection
            )))
            .json(&json!({
                "vector": query_vector,
                "limit": limit,
                "score_threshold": threshold,
                "with_payload": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(collection = %collection, "qdrant collection missing; treating as no match");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let body: Value = response.json().await?;
        parse_search_hits(&body, threshold, limit)
    }
}

/// Turns a `/points/search` body into results. The threshold and ordering are
/// re-applied here rather than trusted from the server.
pub fn parse_search_hits(
    body: &Value,
    threshold: f64,
    limit: usize,
) -> Result<Vec<SimilarEntity>, SearchError> {
    let hits = body
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(score) = hit.pointer("/score").and_then(Value::as_f64) else {
            continue;
        };
        if !score.is_finite() || score < threshold {
            continue;
        }
        let mut attributes = hit
            .pointer("/payload")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let entity_id = match attributes.remove(ENTITY_ID_FIELD) {
            Some(Value::String(id)) => id,
            _ => {
                warn!(point = %hit.pointer("/id").cloned().unwrap_or_default(), "qdrant hit without entity id");
                continue;
            }
        };
        results.push(SimilarEntity {
            entity_id,
            score,
            attributes,
        });
    }

    results.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.entity_id.cmp(&right.entity_id))
    });
    results.truncate(limit);
    Ok(results)
}

/// Reads the first point of a `/points` retrieve body. The business id is
/// stripped from the payload as in search hits.
pub fn parse_point(body: &Value) -> Result<Option<VectorPoint>, SearchError> {
    let Some(point) = body.pointer("/result/0") else {
        return Ok(None);
    };
    let Some(values) = point.pointer("/vector").and_then(Value::as_array) else {
        return Ok(None);
    };
    let vector = values
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "stored vector contains non-numeric values".to_string(),
        })?;
    let mut payload = point
        .pointer("/payload")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    payload.remove(ENTITY_ID_FIELD);
    Ok(Some(VectorPoint { vector, payload }))
}

async fn backend_error(response: Response) -> SearchError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SearchError::BackendResponse {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    }
}
