use crate::config::WorkflowConfig;
use crate::embeddings::Embedder;
use crate::error::WorkflowError;
use crate::extractor::input_checksum;
use crate::logging;
use crate::models::{
    InferredExtraction, ProfileAttributes, StaticExtraction, StructuredProfile, WorkflowRun,
    WorkflowTrigger,
};
use crate::text::{normalize_entity_name, truncate_chars};
use crate::traits::{BeginRun, GraphIndex, ProfileExtractor, ProfileStore, RunStore, VectorIndex};
use crate::workflow::{StageOutcome, StageRecord, WorkflowStage};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Result of one attempted cursor move.
enum Step {
    Moved(WorkflowRun),
    /// Cancellation won the race; the run is now terminal.
    Stopped(WorkflowRun),
}

/// Data carried between stages of one run.
#[derive(Default)]
struct StageWork {
    extracted: Option<StaticExtraction>,
    inferred: Option<InferredExtraction>,
    profile: Option<StructuredProfile>,
    profile_written: bool,
}

impl StageWork {
    fn profile(&mut self, trigger: &WorkflowTrigger) -> &StructuredProfile {
        let (extracted, inferred) = (self.extracted.as_ref(), self.inferred.as_ref());
        self.profile
            .get_or_insert_with(|| build_profile(trigger, extracted, inferred))
    }
}

/// Drives ingestion runs through the stage machine. One worker owns a run
/// from `Queued` to a terminal stage; every cursor move is a compare-and-set
/// against the run store, so a concurrent cancel is observed at the next
/// stage boundary.
pub struct IngestionOrchestrator {
    runs: Arc<dyn RunStore>,
    profiles: Arc<dyn ProfileStore>,
    graph: Arc<dyn GraphIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn ProfileExtractor>,
    config: WorkflowConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        runs: Arc<dyn RunStore>,
        profiles: Arc<dyn ProfileStore>,
        graph: Arc<dyn GraphIndex>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn ProfileExtractor>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            runs,
            profiles,
            graph,
            vectors,
            embedder,
            extractor,
            config,
        }
    }

    /// Registers a queued run for the trigger's subject. Rejected, not queued,
    /// when the subject already has an active run.
    pub async fn start(&self, trigger: &WorkflowTrigger) -> Result<WorkflowRun, WorkflowError> {
        validate_trigger(trigger)?;

        let run = WorkflowRun::queued(trigger, input_checksum(&trigger.raw_extract));
        match self.runs.begin_run(&run).await? {
            BeginRun::Started(run) => {
                info!(run_id = %run.id, subject_id = %run.subject_id, "run queued");
                Ok(run)
            }
            BeginRun::ActiveRunExists(active) => Err(WorkflowError::ActiveRunExists {
                subject_id: active.subject_id,
                run_id: active.id,
            }),
        }
    }

    /// Starts and executes a run on the current task.
    pub async fn run(&self, trigger: &WorkflowTrigger) -> Result<WorkflowRun, WorkflowError> {
        let run = self.start(trigger).await?;
        self.execute(run, trigger).await
    }

    /// Starts a run and executes it on a spawned task. The queued run is
    /// returned immediately so the caller can poll it.
    pub async fn spawn(
        self: &Arc<Self>,
        trigger: WorkflowTrigger,
    ) -> Result<(WorkflowRun, JoinHandle<Result<WorkflowRun, WorkflowError>>), WorkflowError> {
        let run = self.start(&trigger).await?;
        let orchestrator = Arc::clone(self);
        let queued = run.clone();
        let handle = tokio::spawn(async move { orchestrator.execute(queued, &trigger).await });
        Ok((run, handle))
    }

    /// Flags a run for cancellation. Only runs still before graph
    /// construction accept the flag; the worker acts on it at its next stage
    /// boundary.
    pub async fn cancel(&self, run_id: Uuid) -> Result<WorkflowRun, WorkflowError> {
        let run = self
            .runs
            .request_cancel(run_id)
            .await?
            .ok_or(WorkflowError::RunNotFound(run_id))?;

        if run.stage.is_terminal() {
            return Err(WorkflowError::Terminal {
                run_id,
                stage: run.stage.to_string(),
            });
        }
        if !run.cancel_requested {
            return Err(WorkflowError::NotCancellable {
                run_id,
                stage: run.stage.to_string(),
            });
        }
        info!(run_id = %run_id, stage = %run.stage, "cancel requested");
        Ok(run)
    }

    /// Executes `run` from its stored stage to a terminal stage and returns
    /// the terminal run.
    pub async fn execute(
        &self,
        run: WorkflowRun,
        trigger: &WorkflowTrigger,
    ) -> Result<WorkflowRun, WorkflowError> {
        let span = info_span!(
            "ingestion_run",
            run_id = %run.id,
            subject_id = %run.subject_id,
            stage = field::Empty
        );
        self.drive(run, trigger).instrument(span).await
    }

    async fn drive(
        &self,
        mut run: WorkflowRun,
        trigger: &WorkflowTrigger,
    ) -> Result<WorkflowRun, WorkflowError> {
        let mut work = StageWork::default();
        Span::current().record(logging::STAGE, run.stage.as_str());

        while !run.stage.is_terminal() {
            let stage = run.stage;
            let outcome = self.run_stage(stage, trigger, &mut work).await;
            let record = (stage != WorkflowStage::Queued)
                .then(|| StageRecord::new(stage, outcome.clone()));

            let step = match outcome {
                StageOutcome::Failed(error) => {
                    warn!(stage = %stage, error = %error, "structural stage failed");
                    self.compensate(trigger, &work).await;
                    self.transition(&run, WorkflowStage::Failed, record, Some(error), None)
                        .await?
                }
                StageOutcome::Succeeded | StageOutcome::SkippedWithError(_) => {
                    let Some(next) = stage.next() else {
                        break;
                    };
                    let reference = (next == WorkflowStage::Completed).then(|| result_ref(trigger));
                    self.transition(&run, next, record, None, reference).await?
                }
            };

            run = match step {
                Step::Moved(run) => run,
                Step::Stopped(run) => {
                    self.discard_partial(trigger, &work).await;
                    info!("run cancelled");
                    return Ok(run);
                }
            };
        }

        info!(stage = %run.stage, stages = run.stages.len(), "run finished");
        Ok(run)
    }

    async fn run_stage(
        &self,
        stage: WorkflowStage,
        trigger: &WorkflowTrigger,
        work: &mut StageWork,
    ) -> StageOutcome {
        match stage {
            WorkflowStage::Queued => StageOutcome::Succeeded,
            WorkflowStage::ExtractingStatic => {
                match self.bounded(self.extractor.extract_static(trigger)).await {
                    Ok(extraction) => {
                        work.extracted = Some(extraction);
                        StageOutcome::Succeeded
                    }
                    Err(error) => skipped(stage, error),
                }
            }
            WorkflowStage::ExtractingInferred => {
                let known = work.extracted.clone().unwrap_or_default();
                match self.bounded(self.extractor.extract_inferred(trigger, &known)).await {
                    Ok(extraction) => {
                        work.inferred = Some(extraction);
                        StageOutcome::Succeeded
                    }
                    Err(error) => skipped(stage, error),
                }
            }
            WorkflowStage::WritingStructured => {
                let profile = work.profile(trigger).clone();
                match self.bounded(self.profiles.upsert_profile(&profile)).await {
                    Ok(()) => {
                        work.profile_written = true;
                        debug!(relations = profile.relations.len(), "structured profile written");
                        StageOutcome::Succeeded
                    }
                    Err(error) => skipped(stage, error),
                }
            }
            WorkflowStage::BuildingGraph => {
                let profile = work.profile(trigger);
                let edges = profile.edges();
                let kind = profile.kind();
                match self
                    .bounded(self.graph.write_subject(kind, &trigger.subject_id, &edges))
                    .await
                {
                    Ok(()) => StageOutcome::Succeeded,
                    Err(error) => StageOutcome::Failed(error),
                }
            }
            WorkflowStage::EmbeddingGraph => {
                let profile = work.profile(trigger).clone();
                match self.bounded(self.embed_subject(&profile, trigger)).await {
                    Ok(()) => StageOutcome::Succeeded,
                    Err(error) => StageOutcome::Failed(error),
                }
            }
            WorkflowStage::Completed | WorkflowStage::Failed | WorkflowStage::Cancelled => {
                StageOutcome::Succeeded
            }
        }
    }

    async fn embed_subject(
        &self,
        profile: &StructuredProfile,
        trigger: &WorkflowTrigger,
    ) -> Result<(), crate::error::SearchError> {
        let text = profile.embedding_text();
        let text = if text.trim().is_empty() {
            trigger.raw_extract.as_str()
        } else {
            text.as_str()
        };
        let text = truncate_chars(text, self.config.max_embedding_chars);

        let vector = self.embedder.embed(text).await?;
        let kind = profile.kind();
        self.vectors
            .upsert_vector(kind, &profile.subject_id, &vector, profile.vector_payload())
            .await?;
        self.graph.set_embedding(kind, &profile.subject_id, &vector).await?;
        debug!(dimensions = vector.len(), "subject embedded");
        Ok(())
    }

    async fn bounded<T, E: Display>(
        &self,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.config.stage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!(
                "timed out after {}s",
                self.config.stage_timeout.as_secs_f64()
            )),
        }
    }

    /// Compare-and-set of the cursor. When the store refuses the move because
    /// cancellation was requested, the run is moved to `Cancelled` instead.
    async fn transition(
        &self,
        current: &WorkflowRun,
        to: WorkflowStage,
        record: Option<StageRecord>,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Step, WorkflowError> {
        let from = current.stage;
        if !from.can_transition_to(to) {
            return Err(WorkflowError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if let Some(run) = self
            .runs
            .advance(current.id, from, to, record.clone(), error, result_ref)
            .await?
        {
            Span::current().record(logging::STAGE, to.as_str());
            debug!(from = %from, to = %to, "stage transition");
            return Ok(Step::Moved(run));
        }

        let stored = self
            .runs
            .get_run(current.id)
            .await?
            .ok_or(WorkflowError::RunNotFound(current.id))?;
        let cancellable = from.can_transition_to(WorkflowStage::Cancelled);
        if stored.stage == from && stored.cancel_requested && cancellable {
            if let Some(run) = self
                .runs
                .advance(current.id, from, WorkflowStage::Cancelled, record, None, None)
                .await?
            {
                Span::current().record(logging::STAGE, WorkflowStage::Cancelled.as_str());
                return Ok(Step::Stopped(run));
            }
        }

        Err(WorkflowError::StageConflict {
            run_id: current.id,
            expected: from.to_string(),
        })
    }

    /// Undoes every write this run may have made for the subject so a failed
    /// run leaves no structured data, graph node or vector behind.
    async fn compensate(&self, trigger: &WorkflowTrigger, work: &StageWork) {
        let kind = trigger.subject_type.entity_kind();
        let subject_id = trigger.subject_id.as_str();

        self.discard_partial(trigger, work).await;
        if let Err(error) = self.graph.remove_subject(kind, subject_id).await {
            warn!(error = %error, "graph cleanup failed");
        }
        if let Err(error) = self.vectors.delete_vector(kind, subject_id).await {
            warn!(error = %error, "vector cleanup failed");
        }
    }

    async fn discard_partial(&self, trigger: &WorkflowTrigger, work: &StageWork) {
        if !work.profile_written {
            return;
        }
        if let Err(error) = self
            .profiles
            .discard_profile(trigger.subject_type, &trigger.subject_id)
            .await {
            warn!(error = %error, "structured profile cleanup failed");
        }
    }
}

/// `kind:subject_id` of the subject a completed run produced.
pub fn result_ref(trigger: &WorkflowTrigger) -> String {
    format!(
        "{}:{}",
        trigger.subject_type.entity_kind().as_str(),
        trigger.subject_id
    )
}

fn skipped(stage: WorkflowStage, error: String) -> StageOutcome {
    warn!(stage = %stage, error = %error, "enrichment stage skipped");
    StageOutcome::SkippedWithError(error)
}

fn validate_trigger(trigger: &WorkflowTrigger) -> Result<(), WorkflowError> {
    if trigger.subject_id.trim().is_empty() {
        return Err(WorkflowError::InvalidTrigger("subjectId is empty".to_string()));
    }
    if trigger.owner_id.trim().is_empty() {
        return Err(WorkflowError::InvalidTrigger("ownerId is empty".to_string()));
    }
    if trigger.raw_extract.trim().is_empty() {
        return Err(WorkflowError::InvalidTrigger("rawExtract is empty".to_string()));
    }
    Ok(())
}

/// Merges the two extraction outputs into the subject's structured record.
/// Static facts win over inferred ones; relations owned by the other side of
/// a match and duplicate targets are dropped.
pub fn build_profile(
    trigger: &WorkflowTrigger,
    extracted: Option<&StaticExtraction>,
    inferred: Option<&InferredExtraction>,
) -> StructuredProfile {
    let kind = trigger.subject_type.entity_kind();

    let mut attributes = ProfileAttributes::default();
    if let Some(extracted) = extracted {
        attributes.merge_missing(extracted.attributes.clone());
    }
    if let Some(inferred) = inferred {
        attributes.merge_missing(ProfileAttributes {
            summary: inferred.summary.clone(),
            ..Default::default()
        });
    }

    let candidates = extracted
        .map(|extraction| extraction.relations.as_slice())
        .unwrap_or_default()
        .iter()
        .chain(
            inferred
                .map(|extraction| extraction.relations.as_slice())
                .unwrap_or_default(),
        );

    let mut seen = HashSet::new();
    let mut relations = Vec::new();
    for relation in candidates {
        let target = relation.target.trim();
        if target.is_empty() || relation.relationship.owner_kind() != kind {
            debug!(relationship = %relation.relationship, target, "relation dropped");
            continue;
        }
        if seen.insert((relation.relationship, normalize_entity_name(target))) {
            let mut relation = relation.clone();
            relation.target = target.to_string();
            relations.push(relation);
        }
    }

    StructuredProfile {
        subject_id: trigger.subject_id.clone(),
        subject_type: trigger.subject_type,
        owner_id: trigger.owner_id.clone(),
        attributes,
        relations,
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedRelation, RelationshipType, SubjectType};

    fn trigger(subject_type: SubjectType) -> WorkflowTrigger {
        WorkflowTrigger {
            subject_type,
            subject_id: "subject-1".to_string(),
            owner_id: "owner-1".to_string(),
            session: None,
            raw_extract: "Senior data engineer, Python and SQL".to_string(),
        }
    }

    fn relation(relationship: RelationshipType, target: &str) -> ExtractedRelation {
        ExtractedRelation {
            relationship,
            target: target.to_string(),
        }
    }

    #[test]
    fn profile_merges_static_and_inferred_facts() {
        let extracted = StaticExtraction {
            attributes: ProfileAttributes {
                title: Some("Data Engineer".to_string()),
                ..Default::default()
            },
            relations: vec![
                relation(RelationshipType::HasSkill, "Python"),
                relation(RelationshipType::HasSkill, " python "),
                relation(RelationshipType::RequiresSkill, "SQL"),
            ],
        };
        let inferred = InferredExtraction {
            summary: Some("Builds pipelines".to_string()),
            relations: vec![
                relation(RelationshipType::PotentialRole, "Analytics Engineer"),
                relation(RelationshipType::InIndustry, ""),
            ],
        };

        let profile = build_profile(&trigger(SubjectType::Resume), Some(&extracted), Some(&inferred));

        assert_eq!(profile.attributes.title.as_deref(), Some("Data Engineer"));
        assert_eq!(profile.attributes.summary.as_deref(), Some("Builds pipelines"));
        assert_eq!(
            profile.relations,
            vec![
                relation(RelationshipType::HasSkill, "Python"),
                relation(RelationshipType::PotentialRole, "Analytics Engineer"),
            ]
        );
    }

    #[test]
    fn profile_without_extractions_is_bare() {
        let profile = build_profile(&trigger(SubjectType::JobDescription), None, None);
        assert_eq!(profile.subject_type, SubjectType::JobDescription);
        assert!(profile.relations.is_empty());
        assert_eq!(profile.attributes, ProfileAttributes::default());
    }

    #[test]
    fn empty_trigger_fields_are_rejected() {
        let mut bad = trigger(SubjectType::Resume);
        bad.raw_extract = "   ".to_string();
        assert!(matches!(validate_trigger(&bad), Err(WorkflowError::InvalidTrigger(_))));

        let mut bad = trigger(SubjectType::Resume);
        bad.owner_id.clear();
        assert!(matches!(validate_trigger(&bad), Err(WorkflowError::InvalidTrigger(_))));

        assert!(validate_trigger(&trigger(SubjectType::Resume)).is_ok());
    }
}
