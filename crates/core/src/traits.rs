use crate::error::{IngestError, SearchError, StoreError};
use crate::evaluation::StructuredVerdict;
use crate::models::{
    Alert, EntityKind, InferredExtraction, MatchRecord, NotificationEvent, RelationshipEdge,
    SimilarEntity, StaticExtraction, StructuredProfile, SubjectType, VectorPoint, WorkflowRun,
    WorkflowTrigger,
};
use crate::workflow::{StageRecord, WorkflowStage};
use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert_vector(
        &self,
        kind: EntityKind,
        entity_id: &str,
        vector: &[f32],
        payload: Map<String, Value>,
    ) -> Result<(), SearchError>;

    async fn delete_vector(&self, kind: EntityKind, entity_id: &str) -> Result<(), SearchError>;

    async fn fetch_point(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<VectorPoint>, SearchError>;

    async fn fetch_vector(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Option<Vec<f32>>, SearchError> {
        Ok(self
            .fetch_point(kind, entity_id)
            .await?
            .map(|point| point.vector))
    }

    /// Entities of `kind` scoring at least `threshold` against `query_vector`,
    /// best first, at most `limit`. An index that does not exist yet yields an
    /// empty list; an unreachable store is an error.
    async fn find_similar(
        &self,
        kind: EntityKind,
        query_vector: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarEntity>, SearchError>;
}

#[async_trait]
pub trait GraphIndex: Send + Sync {
    /// Writes the subject node and all of its outgoing edges in one transaction,
    /// replacing edges from an earlier ingestion of the same subject.
    async fn write_subject(
        &self,
        kind: EntityKind,
        subject_id: &str,
        edges: &[RelationshipEdge],
    ) -> Result<(), SearchError>;

    async fn set_embedding(
        &self,
        kind: EntityKind,
        subject_id: &str,
        vector: &[f32],
    ) -> Result<(), SearchError>;

    async fn remove_subject(&self, kind: EntityKind, subject_id: &str) -> Result<(), SearchError>;

    async fn relationships(
        &self,
        kind: EntityKind,
        subject_id: &str,
    ) -> Result<Vec<RelationshipEdge>, SearchError>;
}

/// Relational record of ingested subjects, keyed by `(subject_type, subject_id)`
/// so a resume and a job description may share an id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn upsert_profile(&self, profile: &StructuredProfile) -> Result<(), StoreError>;

    async fn load_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Option<StructuredProfile>, StoreError>;

    async fn discard_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchUpsert {
    /// Keep the stored score of an existing pair.
    #[default]
    KeepExisting,
    /// Replace the stored score with the new one. `created_at` is never touched.
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertedMatch {
    pub record: MatchRecord,
    pub created: bool,
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn upsert_match(
        &self,
        job_id: &str,
        candidate_id: &str,
        composite_score: f64,
        policy: MatchUpsert,
    ) -> Result<UpsertedMatch, StoreError>;

    /// Inserts the alert unless one already exists for the same
    /// `(recipient_id, reference_id)`. Returns whether a row was created.
    async fn insert_alert(&self, alert: &Alert) -> Result<bool, StoreError>;

    async fn upsert_evaluation(
        &self,
        job_id: &str,
        candidate_id: &str,
        verdict: &StructuredVerdict,
    ) -> Result<(), StoreError>;

    async fn find_match(
        &self,
        job_id: &str,
        candidate_id: &str,
    ) -> Result<Option<MatchRecord>, StoreError>;

    async fn alerts_for(&self, recipient_id: &str) -> Result<Vec<Alert>, StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeginRun {
    Started(WorkflowRun),
    ActiveRunExists(WorkflowRun),
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Inserts a queued run unless the subject already has an active one. The
    /// check and the insert are one atomic operation.
    async fn begin_run(&self, run: &WorkflowRun) -> Result<BeginRun, StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError>;

    /// Moves the cursor from `from` to `to`, appending `record` when given.
    /// Returns the updated run, or `None` when the stored cursor was no longer
    /// `from`, or when cancellation was requested and `to` is not terminal.
    async fn advance(
        &self,
        run_id: Uuid,
        from: WorkflowStage,
        to: WorkflowStage,
        record: Option<StageRecord>,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<WorkflowRun>, StoreError>;

    /// Sets `cancel_requested` only while the stored stage is still
    /// cancellable, in the same operation as the check. Returns the run as
    /// stored afterwards.
    async fn request_cancel(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), StoreError>;
}

/// Upstream extractor for the two enrichment stages.
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    async fn extract_static(&self, trigger: &WorkflowTrigger)
        -> Result<StaticExtraction, IngestError>;

    async fn extract_inferred(
        &self,
        trigger: &WorkflowTrigger,
        known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError>;
}
