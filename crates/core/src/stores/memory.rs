//! In-process implementation of every store seam. Used by the CLI's
//! `--memory` mode and by tests.

use crate::embeddings::cosine_similarity;
use crate::error::{SearchError, StoreError};
use crate::evaluation::StructuredVerdict;
use crate::models::{
    Alert, EntityKind, MatchRecord, RelationshipEdge, SimilarEntity, StructuredProfile,
    SubjectType, VectorPoint, WorkflowRun,
};
use crate::traits::{
    BeginRun, GraphIndex, MatchStore, MatchUpsert, ProfileStore, RunStore, UpsertedMatch,
    VectorIndex,
};
use crate::workflow::{StageRecord, WorkflowStage};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

type EntityKey = (EntityKind, String);
type PairKey = (String, String);
type ProfileKey = (SubjectType, String);

#[derive(Debug, Clone)]
struct StoredVector {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct GraphNode {
    edges: Vec<RelationshipEdge>,
    embedding: Option<Vec<f32>>,
}

#[derive(Default)]
pub struct MemoryStore {
    vectors: RwLock<HashMap<EntityKey, StoredVector>>,
    graph: RwLock<HashMap<EntityKey, GraphNode>>,
    profiles: RwLock<HashMap<ProfileKey, StructuredProfile>>,
    matches: Mutex<HashMap<PairKey, MatchRecord>>,
    alerts: Mutex<Vec<Alert>>,
    evaluations: Mutex<HashMap<PairKey, StructuredVerdict>>,
    runs: Mutex<HashMap<Uuid, WorkflowRun>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn match_count(&self) -> usize {
        self.matches.lock().await.len()
    }

    pub async fn alert_count(&self) -> usize {
        self.alerts.lock().await.len()
    }

    pub async fn evaluation(&self, job_id: &str, candidate_id: &str) -> Option<StructuredVerdict> {
        self.evaluations
            .lock()
            .await
            .get(&(job_id.to_string(), candidate_id.to_string()))
            .cloned()
    }

    pub async fn has_graph_node(&self, kind: EntityKind, subject_id: &str) -> bool {
        self.graph
            .read()
            .await
            .contains_key(&(kind, subject_id.to_string()))
    }

    pub async fn graph_embedding(&self, kind: EntityKind, subject_id: &str) -> Option<Vec<f32>> {
        self.graph
            .read()
            .await
            .get(&(kind, subject_id.to_string()))
            .and_then(|node| node.embedding.clone())
    }
}

#[async_trait]
impl VectorIndex for MemoryStore {
    async fn upsert_vector(
        &self,
        kind: EntityKind,
        entity_id: &str,
        vector: &[f32],
        payload: Map<String, Value>,
    ) -> Result<(), SearchError> {
        self.vectors.write().await.insert(
            (kind, entity_id.to_string()),
            StoredVector {
                vector: vector.to_vec(),
                payload,
            },
        );
        Ok(())
    }

    async fn delete_vector(&self, kind: EntityKind, entity_id: &str) -> Result<(), SearchError> {
        self.vectors
            .write()
            .await
            .remove(&(kind, entity_id.to_string()));
        Ok(())
    }

    async fn fetch_point(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<VectorPoint>, SearchError> {
        Ok(self
            .vectors
            .read()
            .await
            .get(&(kind, entity_id.to_string()))
            .map(|stored| VectorPoint {
                vector: stored.vector.clone(),
                payload: stored.payload.clone(),
            }))
    }

    async fn find_similar(
        &self,
        kind: EntityKind,
        query_vector: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarEntity>, SearchError> {
        let vectors = self.vectors.read().await;
        let mut hits: Vec<SimilarEntity> = vectors
            .iter()
            .filter(|((stored_kind, _), _)| *stored_kind == kind)
            .filter_map(|((_, entity_id), stored)| {
                let score = cosine_similarity(query_vector, &stored.vector);
                (score >= threshold).then(|| SimilarEntity {
                    entity_id: entity_id.clone(),
                    score,
                    attributes: stored.payload.clone(),
                })
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.entity_id.cmp(&right.entity_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl GraphIndex for MemoryStore {
    async fn write_subject(
        &self,
        kind: EntityKind,
        subject_id: &str,
        edges: &[RelationshipEdge],
    ) -> Result<(), SearchError> {
        if let Some(edge) = edges.iter().find(|edge| edge.relationship.owner_kind() != kind) {
            return Err(SearchError::Request(format!(
                "{} edges cannot leave a {} node",
                edge.relationship,
                kind.graph_label()
            )));
        }
        let mut graph = self.graph.write().await;
        let node = graph.entry((kind, subject_id.to_string())).or_default();
        node.edges = edges.to_vec();
        Ok(())
    }

    async fn set_embedding(
        &self,
        kind: EntityKind,
        subject_id: &str,
        vector: &[f32],
    ) -> Result<(), SearchError> {
        let mut graph = self.graph.write().await;
        let node = graph
            .get_mut(&(kind, subject_id.to_string()))
            .ok_or_else(|| {
                SearchError::Request(format!(
                    "{} node {subject_id} does not exist",
                    kind.graph_label()
                ))
            })?;
        node.embedding = Some(vector.to_vec());
        Ok(())
    }

    async fn remove_subject(&self, kind: EntityKind, subject_id: &str) -> Result<(), SearchError> {
        self.graph
            .write()
            .await
            .remove(&(kind, subject_id.to_string()));
        Ok(())
    }

    async fn relationships(
        &self,
        kind: EntityKind,
        subject_id: &str,
    ) -> Result<Vec<RelationshipEdge>, SearchError> {
        Ok(self
            .graph
            .read()
            .await
            .get(&(kind, subject_id.to_string()))
            .map(|node| node.edges.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn upsert_profile(&self, profile: &StructuredProfile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .insert(
                (profile.subject_type, profile.subject_id.clone()),
                profile.clone(),
            );
        Ok(())
    }

    async fn load_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Option<StructuredProfile>, StoreError> {
        Ok(self
            .profiles
            .read()
            .await
            .get(&(subject_type, subject_id.to_string()))
            .cloned())
    }

    async fn discard_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .remove(&(subject_type, subject_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn upsert_match(
        &self,
        job_id: &str,
        candidate_id: &str,
        composite_score: f64,
        policy: MatchUpsert,
    ) -> Result<UpsertedMatch, StoreError> {
        let mut matches = self.matches.lock().await;
        let key = (job_id.to_string(), candidate_id.to_string());
        if let Some(existing) = matches.get_mut(&key) {
            if policy == MatchUpsert::Refresh {
                existing.composite_score = composite_score;
            }
            return Ok(UpsertedMatch {
                record: existing.clone(),
                created: false,
            });
        }

        let record = MatchRecord {
            id: Uuid::new_v4(),
            job_id: job_id.to_string(),
            candidate_id: candidate_id.to_string(),
            composite_score,
            created_at: Utc::now(),
        };
        matches.insert(key, record.clone());
        Ok(UpsertedMatch {
            record,
            created: true,
        })
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.lock().await;
        let duplicate = alerts.iter().any(|existing| {
            existing.recipient_id == alert.recipient_id
                && existing.reference_id == alert.reference_id
        });
        if duplicate {
            return Ok(false);
        }
        alerts.push(alert.clone());
        Ok(true)
    }

    async fn upsert_evaluation(
        &self,
        job_id: &str,
        candidate_id: &str,
        verdict: &StructuredVerdict,
    ) -> Result<(), StoreError> {
        self.evaluations.lock().await.insert(
            (job_id.to_string(), candidate_id.to_string()),
            verdict.clone(),
        );
        Ok(())
    }

    async fn find_match(
        &self,
        job_id: &str,
        candidate_id: &str,
    ) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self
            .matches
            .lock()
            .await
            .get(&(job_id.to_string(), candidate_id.to_string()))
            .cloned())
    }

    async fn alerts_for(&self, recipient_id: &str) -> Result<Vec<Alert>, StoreError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .lock()
            .await
            .iter()
            .filter(|alert| alert.recipient_id == recipient_id)
            .cloned()
            .collect();
        alerts.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(alerts)
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn begin_run(&self, run: &WorkflowRun) -> Result<BeginRun, StoreError> {
        let mut runs = self.runs.lock().await;
        if let Some(active) = runs
            .values()
            .find(|existing| {
                existing.subject_type == run.subject_type
                    && existing.subject_id == run.subject_id
                    && existing.is_active()
            })
        {
            return Ok(BeginRun::ActiveRunExists(active.clone()));
        }
        runs.insert(run.id, run.clone());
        Ok(BeginRun::Started(run.clone()))
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        Ok(self.runs.lock().await.get(&run_id).cloned())
    }

    async fn advance(
        &self,
        run_id: Uuid,
        from: WorkflowStage,
        to: WorkflowStage,
        record: Option<StageRecord>,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(None);
        };
        if run.stage != from || (run.cancel_requested && !to.is_terminal()) {
            return Ok(None);
        }
        run.stage = to;
        run.stages.extend(record);
        if error.is_some() {
            run.error = error;
        }
        if result_ref.is_some() {
            run.result_ref = result_ref;
        }
        run.updated_at = Utc::now();
        Ok(Some(run.clone()))
    }

    async fn request_cancel(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(None);
        };
        if run.stage.is_cancellable() {
            run.cancel_requested = true;
            run.updated_at = Utc::now();
        }
        Ok(Some(run.clone()))
    }
}
