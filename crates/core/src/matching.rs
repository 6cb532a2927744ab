use crate::config::MatchConfig;
use crate::error::{MatchError, ScoreError, StoreError};
use crate::evaluation::{QualitativeEvaluator, StructuredVerdict};
use crate::logging;
use crate::models::{
    Alert, CandidateProfile, EntityKind, JobOpportunity, MatchRecord, MatchTrigger,
    NotificationEvent, SimilarEntity, SubjectType,
};
use crate::scoring::{aggregate, Signal, SignalScores, SubScoreEvaluator};
use crate::traits::{GraphIndex, MatchStore, MatchUpsert, Notifier, ProfileStore, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, field, info, info_span, warn, Instrument};

/// Persists accepted pairs with their alert and notification, in that order.
#[derive(Clone)]
pub struct MatchRecorder {
    store: Arc<dyn MatchStore>,
    notifier: Arc<dyn Notifier>,
}

impl MatchRecorder {
    pub fn new(store: Arc<dyn MatchStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Writes nothing when `overall_fit` is false. Otherwise upserts the pair
    /// and its alert, both keyed on business identity, so a retry after a
    /// partial failure completes the missing writes. The notification goes out
    /// only for the call that created the alert row. A failed notification is
    /// logged and does not undo the persisted match.
    pub async fn record_match_if_fit(
        &self,
        verdict: &StructuredVerdict,
        job: &JobOpportunity,
        candidate: &CandidateProfile,
        composite_score: f64,
        policy: MatchUpsert,
    ) -> Result<Option<MatchRecord>, StoreError> {
        if !verdict.overall_fit {
            debug!(
                job_id = %job.job_id,
                candidate_id = %candidate.candidate_id,
                "verdict rejected pair; nothing recorded"
            );
            return Ok(None);
        }

        let upserted = self
            .store
            .upsert_match(&job.job_id, &candidate.candidate_id, composite_score, policy)
            .await?;
        let record = upserted.record;
        if upserted.created {
            info!(
                match_id = %record.id,
                job_id = %job.job_id,
                candidate_id = %candidate.candidate_id,
                score = record.composite_score,
                "match recorded"
            );
        }

        let alert = Alert::new_match(&job.owner_id, record.id);
        if !self.store.insert_alert(&alert).await? {
            debug!(match_id = %record.id, "match already alerted");
            return Ok(Some(record));
        }

        let event = NotificationEvent {
            recipient_id: job.owner_id.clone(),
            job_title: job.title.clone(),
            candidate_name: candidate.name.clone(),
            match_report_ref: record.id.to_string(),
        };
        if let Err(error) = self.notifier.notify(&event).await {
            warn!(match_id = %record.id, error = %error, "match notification failed");
        }
        Ok(Some(record))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairScore {
    pub signals: SignalScores,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate_id: String,
    pub similarity: f64,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFailure {
    pub candidate_id: String,
    pub error: String,
}

/// Outcome of one `match_job` pass. A candidate lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchRunReport {
    pub job_id: String,
    pub considered: usize,
    pub below_floor: Vec<ScoredCandidate>,
    pub rejected: Vec<ScoredCandidate>,
    pub matched: Vec<MatchRecord>,
    pub failures: Vec<CandidateFailure>,
}

enum CandidateOutcome {
    BelowFloor(ScoredCandidate),
    Rejected(ScoredCandidate),
    Matched(MatchRecord),
}

pub struct MatchEngine {
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphIndex>,
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchStore>,
    sub_scores: SubScoreEvaluator,
    evaluator: Arc<dyn QualitativeEvaluator>,
    recorder: MatchRecorder,
    config: MatchConfig,
}

impl MatchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphIndex>,
        profiles: Arc<dyn ProfileStore>,
        matches: Arc<dyn MatchStore>,
        notifier: Arc<dyn Notifier>,
        sub_scores: SubScoreEvaluator,
        evaluator: Arc<dyn QualitativeEvaluator>,
        config: MatchConfig,
    ) -> Self {
        Self {
            vectors,
            graph,
            profiles,
            recorder: MatchRecorder::new(Arc::clone(&matches), notifier),
            matches,
            sub_scores,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Sub-scores plus the embedding similarity as the `original` signal,
    /// aggregated with the configured weights.
    pub async fn score_pair(
        &self,
        job: &JobOpportunity,
        candidate: &CandidateProfile,
        similarity: f64,
    ) -> Result<PairScore, MatchError> {
        let mut signals = self
            .sub_scores
            .evaluate_all(&job.relationships, &candidate.relationships)
            .await?;
        // Cosine similarity can be negative; the signal lives in [0, 1].
        signals.insert(Signal::Original, similarity.clamp(0.0, 1.0));
        let composite = aggregate(&signals, &self.config.weights, self.config.normalize)?;
        Ok(PairScore { signals, composite })
    }

    /// The relational profile supplies the view when it exists. A run whose
    /// profile write was skipped still left a vector payload behind, and
    /// that is enough to match on.
    pub async fn load_job(&self, job_id: &str) -> Result<JobOpportunity, MatchError> {
        let profile = self
            .profiles
            .load_profile(SubjectType::JobDescription, job_id)
            .await?;
        let point = self.vectors.fetch_point(EntityKind::Job, job_id).await?;
        let relationships = self.graph.relationships(EntityKind::Job, job_id).await?;
        let mut job = match (profile, &point) {
            (Some(profile), _) => JobOpportunity::from_structured(&profile, relationships),
            (None, Some(point)) => {
                debug!(job_id, "no structured profile; using vector payload");
                JobOpportunity::from_point(job_id, point, relationships)
            }
            (None, None) => {
                return Err(MatchError::MissingProfile {
                    kind: "job",
                    id: job_id.to_string(),
                })
            }
        };
        job.embedding = point.map(|point| point.vector);
        Ok(job)
    }

    pub async fn load_candidate(&self, candidate_id: &str) -> Result<CandidateProfile, MatchError> {
        let profile = self
            .profiles
            .load_profile(SubjectType::Resume, candidate_id)
            .await?;
        let point = self
            .vectors
            .fetch_point(EntityKind::Candidate, candidate_id)
            .await?;
        let relationships = self
            .graph
            .relationships(EntityKind::Candidate, candidate_id)
            .await?;
        let mut candidate = match (profile, &point) {
            (Some(profile), _) => CandidateProfile::from_structured(&profile, relationships),
            (None, Some(point)) => {
                debug!(candidate_id, "no structured profile; using vector payload");
                CandidateProfile::from_point(candidate_id, point, relationships)
            }
            (None, None) => {
                return Err(MatchError::MissingProfile {
                    kind: "candidate",
                    id: candidate_id.to_string(),
                })
            }
        };
        candidate.embedding = point.map(|point| point.vector);
        Ok(candidate)
    }

    /// Searches candidates for a stored job and runs every hit through the
    /// scoring pipeline. A search failure aborts the pass; a failure on one
    /// candidate is reported and the rest continue.
    pub async fn match_job(&self, job_id: &str) -> Result<MatchRunReport, MatchError> {
        let job = self.load_job(job_id).await?;
        let query = job
            .embedding
            .as_deref()
            .ok_or_else(|| MatchError::MissingProfile {
                kind: "job embedding",
                id: job_id.to_string(),
            })?;

        let hits = self
            .vectors
            .find_similar(
                EntityKind::Candidate,
                query,
                self.config.similarity_threshold,
                self.config.candidate_limit,
            )
            .await?;

        let mut report = MatchRunReport {
            job_id: job_id.to_string(),
            considered: hits.len(),
            ..Default::default()
        };
        if hits.is_empty() {
            info!(job_id, "no candidates above similarity threshold");
            return Ok(report);
        }

        for hit in &hits {
            match self.process_hit(&job, hit).await {
                Ok(CandidateOutcome::BelowFloor(scored)) => report.below_floor.push(scored),
                Ok(CandidateOutcome::Rejected(scored)) => report.rejected.push(scored),
                Ok(CandidateOutcome::Matched(record)) => report.matched.push(record),
                Err(error) => {
                    warn!(job_id, candidate_id = %hit.entity_id, error = %error, "candidate skipped");
                    report.failures.push(CandidateFailure {
                        candidate_id: hit.entity_id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            job_id,
            considered = report.considered,
            matched = report.matched.len(),
            rejected = report.rejected.len(),
            below_floor = report.below_floor.len(),
            failed = report.failures.len(),
            "match pass finished"
        );
        Ok(report)
    }

    async fn process_hit(
        &self,
        job: &JobOpportunity,
        hit: &SimilarEntity,
    ) -> Result<CandidateOutcome, MatchError> {
        let span = info_span!(
            "match_candidate",
            job_id = %job.job_id,
            candidate_id = %hit.entity_id,
            score = field::Empty
        );
        async {
            let candidate = self.load_candidate(&hit.entity_id).await?;
            let pair = self.score_pair(job, &candidate, hit.score).await?;
            tracing::Span::current().record(logging::SCORE, pair.composite);

            let scored = ScoredCandidate {
                candidate_id: candidate.candidate_id.clone(),
                similarity: hit.score,
                composite: pair.composite,
            };
            if pair.composite < self.config.acceptance_floor {
                debug!(floor = self.config.acceptance_floor, "below acceptance floor");
                return Ok(CandidateOutcome::BelowFloor(scored));
            }

            match self.evaluate_and_record(job, &candidate, pair.composite).await? {
                Some(record) => Ok(CandidateOutcome::Matched(record)),
                None => Ok(CandidateOutcome::Rejected(scored)),
            }
        }
        .instrument(span)
        .await
    }

    /// Consumes a match evaluation trigger: qualitative verdict, independent
    /// evaluation write, then the conditional match record. The composite
    /// score must lie in [0, 1]; a pair below the acceptance floor is not
    /// evaluated.
    pub async fn handle_trigger(&self, trigger: &MatchTrigger) -> Result<Option<MatchRecord>, MatchError> {
        let score = trigger.composite_score;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ScoreError::ScoreOutOfRange {
                signal: "composite".to_string(),
                score,
            }
            .into());
        }
        if score < self.config.acceptance_floor {
            debug!(
                job_id = %trigger.job_id,
                candidate_id = %trigger.candidate_id,
                score,
                floor = self.config.acceptance_floor,
                "trigger below acceptance floor; not evaluated"
            );
            return Ok(None);
        }

        let job = self.load_job(&trigger.job_id).await?;
        let candidate = self.load_candidate(&trigger.candidate_id).await?;
        self.evaluate_and_record(&job, &candidate, trigger.composite_score)
            .instrument(info_span!(
                "match_trigger",
                job_id = %trigger.job_id,
                candidate_id = %trigger.candidate_id
            ))
            .await
    }

    async fn evaluate_and_record(
        &self,
        job: &JobOpportunity,
        candidate: &CandidateProfile,
        composite_score: f64,
    ) -> Result<Option<MatchRecord>, MatchError> {
        // A schema violation leaves the pair unscored.
        let verdict = self.evaluator.evaluate(job, candidate, composite_score).await?;
        self.matches
            .upsert_evaluation(&job.job_id, &candidate.candidate_id, &verdict)
            .await?;
        let record = self
            .recorder
            .record_match_if_fit(&verdict, job, candidate, composite_score, MatchUpsert::KeepExisting)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::EvaluationError;
    use crate::models::{RelationshipEdge, RelationshipType};
    use crate::traits::UpsertedMatch;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::AtomicBool;
    use crate::scoring::MatchStrategy;
    use crate::stores::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn verdict(overall_fit: bool) -> StructuredVerdict {
        StructuredVerdict {
            overall_fit,
            skills_fit: overall_fit,
            preferred_skills_fit: false,
            experience_fit: true,
            role_fit: true,
            education_fit: true,
            certification_fit: true,
            industry_fit: true,
            location_fit: true,
            compatibility_score: if overall_fit { 8 } else { 3 },
            development_areas: Vec::new(),
            recommendation: "Proceed to interview.".to_string(),
        }
    }

    fn job() -> JobOpportunity {
        JobOpportunity {
            job_id: "job-1".to_string(),
            owner_id: "emp-1".to_string(),
            title: "Data Engineer".to_string(),
            compensation: None,
            location: None,
            clearance_requirement: None,
            embedding: None,
            relationships: vec![
                RelationshipEdge::new("job-1", RelationshipType::RequiresSkill, "Python"),
                RelationshipEdge::new("job-1", RelationshipType::RequiresSkill, "SQL"),
            ],
        }
    }

    fn candidate() -> CandidateProfile {
        CandidateProfile {
            candidate_id: "cand-1".to_string(),
            name: "Sam Rivera".to_string(),
            title: None,
            location: None,
            clearance_level: None,
            embedding: None,
            relationships: vec![RelationshipEdge::new(
                "cand-1",
                RelationshipType::HasSkill,
                "Python",
            )],
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _event: &NotificationEvent) -> Result<(), StoreError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &NotificationEvent) -> Result<(), StoreError> {
            Err(StoreError::Notification("queue unavailable".to_string()))
        }
    }

    struct FixedEvaluator(StructuredVerdict);

    #[async_trait]
    impl QualitativeEvaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            _job: &JobOpportunity,
            _candidate: &CandidateProfile,
            _composite_score: f64,
        ) -> Result<StructuredVerdict, EvaluationError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn recording_twice_creates_one_match_one_alert_one_notification() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let recorder = MatchRecorder::new(store.clone(), notifier.clone());

        let first = recorder
            .record_match_if_fit(&verdict(true), &job(), &candidate(), 0.74, MatchUpsert::KeepExisting)
            .await
            .expect("record")
            .expect("fit pair is recorded");
        let second = recorder
            .record_match_if_fit(&verdict(true), &job(), &candidate(), 0.91, MatchUpsert::KeepExisting)
            .await
            .expect("record")
            .expect("fit pair is recorded");

        assert_eq!(first.id, second.id);
        assert_eq!(second.composite_score, 0.74);
        assert_eq!(store.match_count().await, 1);
        assert_eq!(store.alerts_for("emp-1").await.expect("alerts").len(), 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_verdict_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(CountingNotifier::default());
        let recorder = MatchRecorder::new(store.clone(), notifier.clone());

        let result = recorder
            .record_match_if_fit(&verdict(false), &job(), &candidate(), 0.9, MatchUpsert::KeepExisting)
            .await
            .expect("record");

        assert!(result.is_none());
        assert_eq!(store.match_count().await, 0);
        assert_eq!(store.alert_count().await, 0);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_notification_keeps_the_match() {
        let store = Arc::new(MemoryStore::new());
        let recorder = MatchRecorder::new(store.clone(), Arc::new(FailingNotifier));

        let record = recorder
            .record_match_if_fit(&verdict(true), &job(), &candidate(), 0.8, MatchUpsert::KeepExisting)
            .await
            .expect("notification failure is not a store failure");

        assert!(record.is_some());
        assert_eq!(store.alert_count().await, 1);
    }

    fn engine(store: Arc<MemoryStore>, verdict: StructuredVerdict, config: MatchConfig) -> MatchEngine {
        MatchEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            Arc::new(CountingNotifier::default()),
            SubScoreEvaluator::new(
                Arc::new(CharacterNgramEmbedder::default()),
                MatchStrategy::SetOverlap,
            ),
            Arc::new(FixedEvaluator(verdict)),
            config,
        )
    }

    #[tokio::test]
    async fn score_pair_combines_similarity_and_sub_scores() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, verdict(true), MatchConfig::default());

        let pair = engine
            .score_pair(&job(), &candidate(), 0.8)
            .await
            .expect("scores");

        assert_eq!(pair.signals.get(&Signal::A), Some(&0.5));
        assert_eq!(pair.signals.get(&Signal::Original), Some(&0.8));
        // original 0.50 * 0.8, A 0.25 * 0.5, G 0.05 * 0.0, over 0.80 of weight.
        let expected = (0.50 * 0.8 + 0.25 * 0.5) / 0.80;
        assert!((pair.composite - expected).abs() < 1e-9, "{}", pair.composite);
    }

    #[tokio::test]
    async fn negative_similarity_is_clamped_not_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, verdict(true), MatchConfig::default());
        let pair = engine
            .score_pair(&job(), &candidate(), -0.2)
            .await
            .expect("scores");
        assert_eq!(pair.signals.get(&Signal::Original), Some(&0.0));
    }

    #[tokio::test]
    async fn trigger_persists_evaluation_even_when_rejected() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), verdict(false), MatchConfig::default());

        let error = engine
            .handle_trigger(&MatchTrigger {
                job_id: "missing".to_string(),
                candidate_id: "cand-1".to_string(),
                composite_score: 0.7,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, MatchError::MissingProfile { kind: "job", .. }));

        let record = engine
            .evaluate_and_record(&job(), &candidate(), 0.7)
            .await
            .expect("evaluation succeeds");
        assert!(record.is_none());
        assert!(store.evaluation("job-1", "cand-1").await.is_some());
        assert_eq!(store.match_count().await, 0);
    }

    /// Fails the first alert insert, then behaves like the wrapped store.
    struct FlakyAlertStore {
        inner: MemoryStore,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl MatchStore for FlakyAlertStore {
        async fn upsert_match(
            &self,
            job_id: &str,
            candidate_id: &str,
            composite_score: f64,
            policy: MatchUpsert,
        ) -> Result<UpsertedMatch, StoreError> {
            self.inner
                .upsert_match(job_id, candidate_id, composite_score, policy)
                .await
        }

        async fn insert_alert(&self, alert: &Alert) -> Result<bool, StoreError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Conflict("connection reset".to_string()));
            }
            self.inner.insert_alert(alert).await
        }

        async fn upsert_evaluation(
            &self,
            job_id: &str,
            candidate_id: &str,
            verdict: &StructuredVerdict,
        ) -> Result<(), StoreError> {
            self.inner.upsert_evaluation(job_id, candidate_id, verdict).await
        }

        async fn find_match(
            &self,
            job_id: &str,
            candidate_id: &str,
        ) -> Result<Option<MatchRecord>, StoreError> {
            self.inner.find_match(job_id, candidate_id).await
        }

        async fn alerts_for(&self, recipient_id: &str) -> Result<Vec<Alert>, StoreError> {
            self.inner.alerts_for(recipient_id).await
        }
    }

    #[tokio::test]
    async fn retry_after_failed_alert_insert_raises_the_alert() {
        let store = Arc::new(FlakyAlertStore {
            inner: MemoryStore::new(),
            failed_once: AtomicBool::new(false),
        });
        let notifier = Arc::new(CountingNotifier::default());
        let recorder = MatchRecorder::new(store.clone(), notifier.clone());

        let first = recorder
            .record_match_if_fit(&verdict(true), &job(), &candidate(), 0.8, MatchUpsert::KeepExisting)
            .await;
        assert!(first.is_err());
        assert_eq!(store.inner.match_count().await, 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);

        let retried = recorder
            .record_match_if_fit(&verdict(true), &job(), &candidate(), 0.8, MatchUpsert::KeepExisting)
            .await
            .expect("retry succeeds")
            .expect("fit pair is recorded");

        let alerts = store.alerts_for("emp-1").await.expect("alerts");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reference_id, retried.id);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    fn trigger(composite_score: f64) -> MatchTrigger {
        MatchTrigger {
            job_id: "job-1".to_string(),
            candidate_id: "cand-1".to_string(),
            composite_score,
        }
    }

    #[tokio::test]
    async fn trigger_with_score_outside_unit_interval_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), verdict(true), MatchConfig::default());

        for score in [f64::NAN, f64::INFINITY, 1.2, -0.1] {
            let error = engine.handle_trigger(&trigger(score)).await.unwrap_err();
            assert!(
                matches!(error, MatchError::Score(ScoreError::ScoreOutOfRange { .. })),
                "{score}: {error}"
            );
        }
        assert!(store.evaluation("job-1", "cand-1").await.is_none());
        assert_eq!(store.match_count().await, 0);
    }

    fn point(payload: Value) -> Map<String, Value> {
        payload.as_object().cloned().unwrap_or_default()
    }

    async fn seed_vectors(store: &MemoryStore) {
        store
            .upsert_vector(
                EntityKind::Job,
                "job-1",
                &[1.0, 0.0],
                point(json!({
                    "owner_id": "emp-1",
                    "name": "Data Engineer",
                    "title": "Data Engineer"
                })),
            )
            .await
            .expect("job vector");
        store
            .upsert_vector(
                EntityKind::Candidate,
                "cand-1",
                &[0.9, 0.1],
                point(json!({ "owner_id": "user-1", "name": "Sam Rivera" })),
            )
            .await
            .expect("candidate vector");
    }

    #[tokio::test]
    async fn trigger_below_acceptance_floor_skips_the_evaluator() {
        let store = Arc::new(MemoryStore::new());
        seed_vectors(&store).await;
        let engine = engine(store.clone(), verdict(true), MatchConfig::default());

        let outcome = engine.handle_trigger(&trigger(0.3)).await.expect("handled");

        assert!(outcome.is_none());
        assert!(store.evaluation("job-1", "cand-1").await.is_none());
        assert_eq!(store.match_count().await, 0);

        let accepted = engine.handle_trigger(&trigger(0.75)).await.expect("handled");
        assert!(accepted.is_some());
    }

    #[tokio::test]
    async fn views_fall_back_to_vector_payload_without_a_profile() {
        let store = Arc::new(MemoryStore::new());
        seed_vectors(&store).await;
        store
            .write_subject(
                EntityKind::Job,
                "job-1",
                &[RelationshipEdge::new("job-1", RelationshipType::RequiresSkill, "Python")],
            )
            .await
            .expect("graph");
        let engine = engine(store, verdict(true), MatchConfig::default());

        let job = engine.load_job("job-1").await.expect("job view");
        assert_eq!(job.owner_id, "emp-1");
        assert_eq!(job.title, "Data Engineer");
        assert_eq!(job.embedding, Some(vec![1.0, 0.0]));
        assert_eq!(job.relationships.len(), 1);

        let candidate = engine.load_candidate("cand-1").await.expect("candidate view");
        assert_eq!(candidate.name, "Sam Rivera");
        assert!(candidate.relationships.is_empty());

        let error = engine.load_candidate("job-1").await.unwrap_err();
        assert!(matches!(error, MatchError::MissingProfile { kind: "candidate", .. }));
    }
}
