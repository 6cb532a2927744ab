use super::aggregate::{Signal, SignalScores};
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::SearchError;
use crate::models::{RelationshipEdge, RelationshipType};
use crate::text::normalize_entity_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Which job-side relationship each sub-score compares against which
/// candidate-side relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPair {
    pub signal: Signal,
    pub job: RelationshipType,
    pub candidate: RelationshipType,
}

pub const SIGNAL_PAIRS: [SignalPair; 9] = [
    SignalPair {
        signal: Signal::A,
        job: RelationshipType::RequiresSkill,
        candidate: RelationshipType::HasSkill,
    },
    SignalPair {
        signal: Signal::B,
        job: RelationshipType::PrefersSkill,
        candidate: RelationshipType::HasSkill,
    },
    SignalPair {
        signal: Signal::C,
        job: RelationshipType::SuitableForRole,
        candidate: RelationshipType::PotentialRole,
    },
    SignalPair {
        signal: Signal::D,
        job: RelationshipType::RequiredEducation,
        candidate: RelationshipType::HasEducation,
    },
    SignalPair {
        signal: Signal::E,
        job: RelationshipType::RequiredCertification,
        candidate: RelationshipType::HasCertification,
    },
    SignalPair {
        signal: Signal::F,
        job: RelationshipType::SuitableForRole,
        candidate: RelationshipType::WorkedAs,
    },
    SignalPair {
        signal: Signal::G,
        job: RelationshipType::RequiresSkill,
        candidate: RelationshipType::HasCertification,
    },
    SignalPair {
        signal: Signal::H,
        job: RelationshipType::PrefersSkill,
        candidate: RelationshipType::HasCertification,
    },
    SignalPair {
        signal: Signal::I,
        job: RelationshipType::SuitableForRole,
        candidate: RelationshipType::InIndustry,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Exact match on normalized names.
    SetOverlap,
    /// Exact match, else the best name-embedding similarity at or above
    /// `threshold`.
    Semantic { threshold: f64 },
}

impl Default for MatchStrategy {
    fn default() -> Self {
        Self::Semantic { threshold: 0.82 }
    }
}

/// Set-overlap score: fraction of distinct requirements the candidate holds.
/// `None` when there are no requirements.
pub fn set_overlap_score(requirements: &[String], possessions: &[String]) -> Option<f64> {
    let required = distinct_names(requirements);
    if required.is_empty() {
        return None;
    }
    let held = distinct_names(possessions);
    let matched = required.keys().filter(|key| held.contains_key(*key)).count();
    Some(matched as f64 / required.len() as f64)
}

fn distinct_names(names: &[String]) -> BTreeMap<String, &str> {
    names
        .iter()
        .filter_map(|name| {
            let key = normalize_entity_name(name);
            (!key.is_empty()).then_some((key, name.as_str()))
        })
        .collect()
}

fn targets_of(edges: &[RelationshipEdge], relationship: RelationshipType) -> Vec<String> {
    edges
        .iter()
        .filter(|edge| edge.relationship == relationship)
        .map(|edge| edge.target.clone())
        .collect()
}

pub struct SubScoreEvaluator {
    embedder: Arc<dyn Embedder>,
    strategy: MatchStrategy,
}

impl SubScoreEvaluator {
    pub fn new(embedder: Arc<dyn Embedder>, strategy: MatchStrategy) -> Self {
        Self { embedder, strategy }
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Scores all nine pairs. Pairs without job-side requirements are left out
    /// of the map.
    pub async fn evaluate_all(
        &self,
        job_edges: &[RelationshipEdge],
        candidate_edges: &[RelationshipEdge],
    ) -> Result<SignalScores, SearchError> {
        let names = match self.strategy {
            MatchStrategy::SetOverlap => HashMap::new(),
            MatchStrategy::Semantic { .. } => {
                self.embed_names(job_edges.iter().chain(candidate_edges)).await?
            }
        };

        let mut scores = SignalScores::new();
        for pair in SIGNAL_PAIRS {
            let requirements = targets_of(job_edges, pair.job);
            let possessions = targets_of(candidate_edges, pair.candidate);
            if let Some(score) = self.score_with(&requirements, &possessions, &names) {
                scores.insert(pair.signal, score);
            }
        }
        Ok(scores)
    }

    /// Scores a single requirement list against a possession list.
    pub async fn evaluate(
        &self,
        requirements: &[String],
        possessions: &[String],
    ) -> Result<Option<f64>, SearchError> {
        let names = match self.strategy {
            MatchStrategy::SetOverlap => HashMap::new(),
            MatchStrategy::Semantic { .. } => {
                let all: Vec<String> = requirements.iter().chain(possessions).cloned().collect();
                self.embed_name_list(&all).await?
            }
        };
        Ok(self.score_with(requirements, possessions, &names))
    }

    fn score_with(
        &self,
        requirements: &[String],
        possessions: &[String],
        name_vectors: &HashMap<String, Vec<f32>>,
    ) -> Option<f64> {
        let threshold = match self.strategy {
            MatchStrategy::SetOverlap => return set_overlap_score(requirements, possessions),
            MatchStrategy::Semantic { threshold } => threshold,
        };

        let required = distinct_names(requirements);
        if required.is_empty() {
            return None;
        }
        let held = distinct_names(possessions);

        let total: f64 = required
            .keys()
            .map(|requirement| {
                if held.contains_key(requirement) {
                    return 1.0;
                }
                let Some(required_vector) = name_vectors.get(requirement) else {
                    return 0.0;
                };
                let best = held
                    .keys()
                    .filter_map(|possession| name_vectors.get(possession))
                    .map(|vector| cosine_similarity(required_vector, vector))
                    .fold(0.0_f64, f64::max);
                if best >= threshold {
                    best.min(1.0)
                } else {
                    0.0
                }
            })
            .sum();

        Some((total / required.len() as f64).clamp(0.0, 1.0))
    }

    async fn embed_names<'a>(
        &self,
        edges: impl Iterator<Item = &'a RelationshipEdge>,
    ) -> Result<HashMap<String, Vec<f32>>, SearchError> {
        let all: Vec<String> = edges.map(|edge| edge.target.clone()).collect();
        self.embed_name_list(&all).await
    }

    async fn embed_name_list(&self, names: &[String]) -> Result<HashMap<String, Vec<f32>>, SearchError> {
        let distinct = distinct_names(names);
        if distinct.is_empty() {
            return Ok(HashMap::new());
        }
        let (keys, originals): (Vec<String>, Vec<String>) = distinct
            .into_iter()
            .map(|(key, original)| (key, original.to_string()))
            .unzip();
        let vectors = self.embedder.embed_batch(&originals).await?;
        Ok(keys.into_iter().zip(vectors).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn evaluator(strategy: MatchStrategy) -> SubScoreEvaluator {
        SubScoreEvaluator::new(Arc::new(CharacterNgramEmbedder::default()), strategy)
    }

    #[test]
    fn half_of_required_skills_scores_one_half() {
        let score = set_overlap_score(&names(&["Python", "SQL"]), &names(&["Python"]));
        assert_eq!(score, Some(0.5));
    }

    #[test]
    fn empty_requirements_are_absent_not_zero() {
        assert_eq!(set_overlap_score(&[], &names(&["Python"])), None);
        assert_eq!(set_overlap_score(&names(&["  "]), &names(&["Python"])), None);
    }

    #[test]
    fn unmatched_requirements_score_zero() {
        assert_eq!(set_overlap_score(&names(&["Rust"]), &[]), Some(0.0));
    }

    #[test]
    fn duplicate_requirements_count_once() {
        let score = set_overlap_score(&names(&["SQL", "sql", "Go"]), &names(&["SQL"]));
        assert_eq!(score, Some(0.5));
    }

    #[tokio::test]
    async fn evaluate_all_skips_pairs_without_requirements() {
        let job = vec![
            RelationshipEdge::new("job-1", RelationshipType::RequiresSkill, "Python"),
            RelationshipEdge::new("job-1", RelationshipType::RequiresSkill, "SQL"),
        ];
        let candidate = vec![RelationshipEdge::new("cand-1", RelationshipType::HasSkill, "python")];

        let scores = evaluator(MatchStrategy::SetOverlap)
            .evaluate_all(&job, &candidate)
            .await
            .expect("scoring succeeds");

        assert_eq!(scores.get(&Signal::A), Some(&0.5));
        // G compares required skills against certifications: requirements exist, no matches.
        assert_eq!(scores.get(&Signal::G), Some(&0.0));
        assert!(!scores.contains_key(&Signal::B));
        assert!(!scores.contains_key(&Signal::E));
        assert_eq!(scores.len(), 2);
    }

    #[tokio::test]
    async fn semantic_strategy_accepts_close_phrasing() {
        let semantic = evaluator(MatchStrategy::Semantic { threshold: 0.5 });
        let score = semantic
            .evaluate(&names(&["PostgreSQL"]), &names(&["Postgres SQL"]))
            .await
            .expect("scoring succeeds")
            .expect("requirement present");
        assert!(score > 0.5, "got {score}");

        let overlap = evaluator(MatchStrategy::SetOverlap)
            .evaluate(&names(&["PostgreSQL"]), &names(&["Postgres SQL"]))
            .await
            .expect("scoring succeeds");
        assert_eq!(overlap, Some(0.0));
    }

    #[tokio::test]
    async fn semantic_strategy_rejects_unrelated_names() {
        let score = evaluator(MatchStrategy::Semantic { threshold: 0.82 })
            .evaluate(&names(&["Kubernetes"]), &names(&["Watercolor painting"]))
            .await
            .expect("scoring succeeds");
        assert_eq!(score, Some(0.0));
    }

    #[test]
    fn every_candidate_side_type_is_candidate_owned() {
        for pair in SIGNAL_PAIRS {
            assert_eq!(pair.job.owner_kind(), crate::models::EntityKind::Job);
            assert_eq!(pair.candidate.owner_kind(), crate::models::EntityKind::Candidate);
        }
    }
}
