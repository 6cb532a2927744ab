use crate::error::EvaluationError;
use crate::llm::LlmClient;
use crate::models::{CandidateProfile, JobOpportunity, RelationshipEdge};
use crate::prompts::{EVALUATION_PROMPT, EVALUATION_SYSTEM};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write as _;
use tracing::info;

pub const MAX_COMPATIBILITY_SCORE: u8 = 10;

/// Fixed-shape model verdict for one (job, candidate) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StructuredVerdict {
    pub overall_fit: bool,
    pub skills_fit: bool,
    pub preferred_skills_fit: bool,
    pub experience_fit: bool,
    pub role_fit: bool,
    pub education_fit: bool,
    pub certification_fit: bool,
    pub industry_fit: bool,
    pub location_fit: bool,
    pub compatibility_score: u8,
    pub development_areas: Vec<String>,
    pub recommendation: String,
}

impl StructuredVerdict {
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.compatibility_score > MAX_COMPATIBILITY_SCORE {
            return Err(EvaluationError::Schema(format!(
                "compatibility_score {} exceeds {}",
                self.compatibility_score, MAX_COMPATIBILITY_SCORE
            )));
        }
        if self.recommendation.trim().is_empty() {
            return Err(EvaluationError::Schema("recommendation is empty".to_string()));
        }
        Ok(())
    }

    pub fn json_schema() -> Value {
        let flag = json!({ "type": "boolean" });
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": [
                "overall_fit", "skills_fit", "preferred_skills_fit", "experience_fit",
                "role_fit", "education_fit", "certification_fit", "industry_fit",
                "location_fit", "compatibility_score", "development_areas", "recommendation"
            ],
            "properties": {
                "overall_fit": flag,
                "skills_fit": flag,
                "preferred_skills_fit": flag,
                "experience_fit": flag,
                "role_fit": flag,
                "education_fit": flag,
                "certification_fit": flag,
                "industry_fit": flag,
                "location_fit": flag,
                "compatibility_score": { "type": "integer", "minimum": 0, "maximum": MAX_COMPATIBILITY_SCORE },
                "development_areas": { "type": "array", "items": { "type": "string" } },
                "recommendation": { "type": "string" }
            }
        })
    }
}

/// Parses and validates raw model output. Anything short of the full shape is
/// rejected.
pub fn parse_verdict(text: &str) -> Result<StructuredVerdict, EvaluationError> {
    let verdict: StructuredVerdict = crate::llm::decode_json(text)?;
    verdict.validate()?;
    Ok(verdict)
}

#[async_trait]
pub trait QualitativeEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        job: &JobOpportunity,
        candidate: &CandidateProfile,
        composite_score: f64,
    ) -> Result<StructuredVerdict, EvaluationError>;
}

pub struct LlmEvaluator {
    llm: LlmClient,
}

impl LlmEvaluator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl QualitativeEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        job: &JobOpportunity,
        candidate: &CandidateProfile,
        composite_score: f64,
    ) -> Result<StructuredVerdict, EvaluationError> {
        let prompt = build_evaluation_prompt(job, candidate, composite_score);
        let raw = self
            .llm
            .call(
                EVALUATION_SYSTEM,
                &prompt,
                "match_verdict",
                &StructuredVerdict::json_schema(),
            )
            .await?;
        let verdict = parse_verdict(&raw)?;
        info!(
            job_id = %job.job_id,
            candidate_id = %candidate.candidate_id,
            overall_fit = verdict.overall_fit,
            compatibility_score = verdict.compatibility_score,
            "qualitative evaluation finished"
        );
        Ok(verdict)
    }
}

pub fn build_evaluation_prompt(
    job: &JobOpportunity,
    candidate: &CandidateProfile,
    composite_score: f64,
) -> String {
    let mut job_text = String::new();
    let _ = writeln!(job_text, "Title: {}", job.title);
    write_optional(&mut job_text, "Location", job.location.as_deref());
    write_optional(&mut job_text, "Compensation", job.compensation.as_deref());
    write_optional(&mut job_text, "Clearance required", job.clearance_requirement.as_deref());
    write_edges(&mut job_text, &job.relationships);

    let mut candidate_text = String::new();
    let _ = writeln!(candidate_text, "Name: {}", candidate.name);
    write_optional(&mut candidate_text, "Current title", candidate.title.as_deref());
    write_optional(&mut candidate_text, "Location", candidate.location.as_deref());
    write_optional(&mut candidate_text, "Clearance", candidate.clearance_level.as_deref());
    write_edges(&mut candidate_text, &candidate.relationships);

    EVALUATION_PROMPT
        .replace("{job}", job_text.trim_end())
        .replace("{candidate}", candidate_text.trim_end())
        .replace("{composite_score}", &format!("{composite_score:.3}"))
}

fn write_optional(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
        let _ = writeln!(out, "{label}: {value}");
    }
}

fn write_edges(out: &mut String, edges: &[RelationshipEdge]) {
    let mut sorted: Vec<&RelationshipEdge> = edges.iter().collect();
    sorted.sort_by(|left, right| {
        left.relationship
            .cmp(&right.relationship)
            .then_with(|| left.target.cmp(&right.target))
    });
    for edge in sorted {
        let _ = writeln!(out, "- {}: {}", edge.relationship, edge.target);
    }
}
