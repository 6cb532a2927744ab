use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use talentgraph_core::error::{IngestError, SearchError, WorkflowError};
use talentgraph_core::models::{
    ExtractedRelation, InferredExtraction, ProfileAttributes, RelationshipEdge, StaticExtraction,
};
use talentgraph_core::workflow::{StageOutcome, WorkflowStage};
use talentgraph_core::{
    get_run_status, CharacterNgramEmbedder, Embedder, EntityKind, GraphIndex,
    IngestionOrchestrator, MemoryStore, ProfileExtractor, ProfileStore, RelationshipType,
    RunStore, StatusLabel, SubjectType, VectorIndex, WorkflowConfig, WorkflowTrigger,
};
use tokio::sync::Notify;

fn resume(subject_id: &str) -> WorkflowTrigger {
    WorkflowTrigger {
        subject_type: SubjectType::Resume,
        subject_id: subject_id.to_string(),
        owner_id: "candidate-user".to_string(),
        session: Some("session-1".to_string()),
        raw_extract: "Data engineer with Python, SQL and Airflow experience".to_string(),
    }
}

struct ScriptedExtractor;

#[async_trait]
impl ProfileExtractor for ScriptedExtractor {
    async fn extract_static(&self, _trigger: &WorkflowTrigger) -> Result<StaticExtraction, IngestError> {
        Ok(StaticExtraction {
            attributes: ProfileAttributes {
                display_name: Some("Sam Rivera".to_string()),
                title: Some("Data Engineer".to_string()),
                ..Default::default()
            },
            relations: vec![
                ExtractedRelation {
                    relationship: RelationshipType::HasSkill,
                    target: "Python".to_string(),
                },
                ExtractedRelation {
                    relationship: RelationshipType::HasSkill,
                    target: "SQL".to_string(),
                },
            ],
        })
    }

    async fn extract_inferred(
        &self,
        _trigger: &WorkflowTrigger,
        _known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError> {
        Ok(InferredExtraction {
            summary: Some("Builds batch pipelines".to_string()),
            relations: vec![ExtractedRelation {
                relationship: RelationshipType::PotentialRole,
                target: "Analytics Engineer".to_string(),
            }],
        })
    }
}

struct FailingExtractor;

#[async_trait]
impl ProfileExtractor for FailingExtractor {
    async fn extract_static(&self, _trigger: &WorkflowTrigger) -> Result<StaticExtraction, IngestError> {
        Err(IngestError::Extraction("model unavailable".to_string()))
    }

    async fn extract_inferred(
        &self,
        _trigger: &WorkflowTrigger,
        _known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError> {
        Err(IngestError::Extraction("model unavailable".to_string()))
    }
}

/// Blocks static extraction until released, so a test can act while the run
/// sits in `ExtractingStatic`.
struct GatedExtractor {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ProfileExtractor for GatedExtractor {
    async fn extract_static(&self, trigger: &WorkflowTrigger) -> Result<StaticExtraction, IngestError> {
        self.entered.notify_one();
        self.release.notified().await;
        ScriptedExtractor.extract_static(trigger).await
    }

    async fn extract_inferred(
        &self,
        trigger: &WorkflowTrigger,
        known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError> {
        ScriptedExtractor.extract_inferred(trigger, known).await
    }
}

struct SlowExtractor;

#[async_trait]
impl ProfileExtractor for SlowExtractor {
    async fn extract_static(&self, trigger: &WorkflowTrigger) -> Result<StaticExtraction, IngestError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        ScriptedExtractor.extract_static(trigger).await
    }

    async fn extract_inferred(
        &self,
        trigger: &WorkflowTrigger,
        known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError> {
        ScriptedExtractor.extract_inferred(trigger, known).await
    }
}

/// Graph wrapper that can fail or pause `write_subject`.
struct TestGraph {
    inner: Arc<MemoryStore>,
    fail_writes: bool,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

#[async_trait]
impl GraphIndex for TestGraph {
    async fn write_subject(
        &self,
        kind: EntityKind,
        subject_id: &str,
        edges: &[RelationshipEdge],
    ) -> Result<(), SearchError> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_writes {
            return Err(SearchError::Request("neo4j unavailable".to_string()));
        }
        self.inner.write_subject(kind, subject_id, edges).await
    }

    async fn set_embedding(
        &self,
        kind: EntityKind,
        subject_id: &str,
        vector: &[f32],
    ) -> Result<(), SearchError> {
        self.inner.set_embedding(kind, subject_id, vector).await
    }

    async fn remove_subject(&self, kind: EntityKind, subject_id: &str) -> Result<(), SearchError> {
        self.inner.remove_subject(kind, subject_id).await
    }

    async fn relationships(
        &self,
        kind: EntityKind,
        subject_id: &str,
    ) -> Result<Vec<RelationshipEdge>, SearchError> {
        self.inner.relationships(kind, subject_id).await
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, SearchError> {
        Err(SearchError::Request("embedding endpoint down".to_string()))
    }
}

fn orchestrator_with(
    store: &Arc<MemoryStore>,
    graph: Arc<dyn GraphIndex>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn ProfileExtractor>,
) -> Arc<IngestionOrchestrator> {
    Arc::new(IngestionOrchestrator::new(
        store.clone(),
        store.clone(),
        graph,
        store.clone(),
        embedder,
        extractor,
        WorkflowConfig::default(),
    ))
}

fn orchestrator(store: &Arc<MemoryStore>, extractor: Arc<dyn ProfileExtractor>) -> Arc<IngestionOrchestrator> {
    orchestrator_with(
        store,
        store.clone(),
        Arc::new(CharacterNgramEmbedder::default()),
        extractor,
    )
}

#[tokio::test]
async fn happy_path_writes_profile_graph_and_vector() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(ScriptedExtractor));

    let run = orchestrator.run(&resume("cand-1")).await.expect("run");

    assert_eq!(run.stage, WorkflowStage::Completed);
    assert_eq!(run.result_ref.as_deref(), Some("candidate:cand-1"));
    assert_eq!(run.stages.len(), 5);
    assert!(run.stages.iter().all(|record| record.outcome.is_success()));
    assert_eq!(run.input_checksum.len(), 64);

    let profile = store
        .load_profile(SubjectType::Resume, "cand-1")
        .await
        .expect("load")
        .expect("profile");
    assert_eq!(profile.attributes.summary.as_deref(), Some("Builds batch pipelines"));
    assert_eq!(profile.relations.len(), 3);

    let edges = store
        .relationships(EntityKind::Candidate, "cand-1")
        .await
        .expect("edges");
    assert_eq!(edges.len(), 3);
    assert!(store.graph_embedding(EntityKind::Candidate, "cand-1").await.is_some());
    assert!(store
        .fetch_vector(EntityKind::Candidate, "cand-1")
        .await
        .expect("fetch")
        .is_some());

    let status = get_run_status(store.as_ref(), run.id).await;
    assert_eq!(status.status, StatusLabel::Completed);
    assert_eq!(status.result_ref.as_deref(), Some("candidate:cand-1"));
}

#[tokio::test]
async fn enrichment_failures_are_recorded_and_the_run_completes() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(FailingExtractor));

    let run = orchestrator.run(&resume("cand-2")).await.expect("run");

    assert_eq!(run.stage, WorkflowStage::Completed);
    let skipped: Vec<WorkflowStage> = run
        .stages
        .iter()
        .filter(|record| matches!(record.outcome, StageOutcome::SkippedWithError(_)))
        .map(|record| record.stage)
        .collect();
    assert_eq!(
        skipped,
        vec![WorkflowStage::ExtractingStatic, WorkflowStage::ExtractingInferred]
    );
    // The raw extract still produces a searchable vector.
    assert!(store
        .fetch_vector(EntityKind::Candidate, "cand-2")
        .await
        .expect("fetch")
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn slow_enrichment_times_out_and_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(SlowExtractor));

    let run = orchestrator.run(&resume("cand-3")).await.expect("run");

    assert_eq!(run.stage, WorkflowStage::Completed);
    let first = &run.stages[0];
    assert_eq!(first.stage, WorkflowStage::ExtractingStatic);
    assert!(first
        .outcome
        .error()
        .is_some_and(|error| error.contains("timed out")));
}

#[tokio::test]
async fn graph_failure_fails_the_run_and_leaves_no_structured_data() {
    let store = Arc::new(MemoryStore::new());
    let graph = Arc::new(TestGraph {
        inner: store.clone(),
        fail_writes: true,
        gate: None,
    });
    let orchestrator = orchestrator_with(
        &store,
        graph,
        Arc::new(CharacterNgramEmbedder::default()),
        Arc::new(ScriptedExtractor),
    );

    let run = orchestrator.run(&resume("cand-4")).await.expect("run");

    assert_eq!(run.stage, WorkflowStage::Failed);
    assert!(run.error.as_deref().is_some_and(|error| error.contains("neo4j")));
    let last = run.stages.last().expect("stage journal");
    assert_eq!(last.stage, WorkflowStage::BuildingGraph);
    assert!(matches!(last.outcome, StageOutcome::Failed(_)));

    assert!(store
        .load_profile(SubjectType::Resume, "cand-4")
        .await
        .expect("load")
        .is_none());
    assert!(!store.has_graph_node(EntityKind::Candidate, "cand-4").await);
    assert_eq!(
        get_run_status(store.as_ref(), run.id).await.status,
        StatusLabel::Failed
    );
}

#[tokio::test]
async fn embedding_failure_removes_the_graph_node() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator_with(
        &store,
        store.clone(),
        Arc::new(FailingEmbedder),
        Arc::new(ScriptedExtractor),
    );

    let run = orchestrator.run(&resume("cand-5")).await.expect("run");

    assert_eq!(run.stage, WorkflowStage::Failed);
    assert_eq!(
        run.stages.last().map(|record| record.stage),
        Some(WorkflowStage::EmbeddingGraph)
    );
    assert!(!store.has_graph_node(EntityKind::Candidate, "cand-5").await);
    assert!(store
        .load_profile(SubjectType::Resume, "cand-5")
        .await
        .expect("load")
        .is_none());
    assert!(store
        .fetch_vector(EntityKind::Candidate, "cand-5")
        .await
        .expect("fetch")
        .is_none());
}

#[tokio::test]
async fn second_start_for_an_active_subject_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(ScriptedExtractor));

    let first = orchestrator.start(&resume("cand-6")).await.expect("first start");
    let error = orchestrator.start(&resume("cand-6")).await.unwrap_err();
    assert!(matches!(
        error,
        WorkflowError::ActiveRunExists { run_id, .. } if run_id == first.id
    ));

    // A different subject is independent.
    orchestrator.start(&resume("cand-7")).await.expect("other subject");

    // Once the first run is terminal the subject can be ingested again.
    orchestrator.execute(first, &resume("cand-6")).await.expect("execute");
    orchestrator.start(&resume("cand-6")).await.expect("restart");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_for_one_subject_admit_exactly_one() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(ScriptedExtractor));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.start(&resume("cand-8")).await
        }));
    }

    let mut started = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => started += 1,
            Err(WorkflowError::ActiveRunExists { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 7);
}

#[tokio::test]
async fn cancel_during_extraction_stops_the_run_before_the_graph() {
    let store = Arc::new(MemoryStore::new());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let orchestrator = orchestrator(
        &store,
        Arc::new(GatedExtractor {
            entered: entered.clone(),
            release: release.clone(),
        }),
    );

    let (run, handle) = orchestrator.spawn(resume("cand-9")).await.expect("spawn");
    entered.notified().await;

    let flagged = orchestrator.cancel(run.id).await.expect("cancel accepted");
    assert!(flagged.cancel_requested);
    assert_eq!(flagged.stage, WorkflowStage::ExtractingStatic);

    release.notify_one();
    let finished = handle.await.expect("join").expect("run");

    assert_eq!(finished.stage, WorkflowStage::Cancelled);
    assert_eq!(
        get_run_status(store.as_ref(), run.id).await.status,
        StatusLabel::Cancelled
    );
    assert!(store
        .load_profile(SubjectType::Resume, "cand-9")
        .await
        .expect("load")
        .is_none());
    assert!(!store.has_graph_node(EntityKind::Candidate, "cand-9").await);

    let again = orchestrator.cancel(run.id).await.unwrap_err();
    assert!(matches!(again, WorkflowError::Terminal { .. }));
}

#[tokio::test]
async fn cancel_during_graph_construction_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let graph = Arc::new(TestGraph {
        inner: store.clone(),
        fail_writes: false,
        gate: Some((entered.clone(), release.clone())),
    });
    let orchestrator = orchestrator_with(
        &store,
        graph,
        Arc::new(CharacterNgramEmbedder::default()),
        Arc::new(ScriptedExtractor),
    );

    let (run, handle) = orchestrator.spawn(resume("cand-10")).await.expect("spawn");
    entered.notified().await;

    let error = orchestrator.cancel(run.id).await.unwrap_err();
    assert!(matches!(error, WorkflowError::NotCancellable { .. }));

    release.notify_one();
    let finished = handle.await.expect("join").expect("run");
    assert_eq!(finished.stage, WorkflowStage::Completed);
    assert!(!finished.cancel_requested);
}

#[tokio::test]
async fn cancel_of_unknown_run_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&store, Arc::new(ScriptedExtractor));
    let run_id = uuid::Uuid::new_v4();

    let error = orchestrator.cancel(run_id).await.unwrap_err();
    assert!(matches!(error, WorkflowError::RunNotFound(id) if id == run_id));
    assert!(store.get_run(run_id).await.expect("get").is_none());
}
