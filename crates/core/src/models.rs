use crate::error::SearchError;
use crate::workflow::{RunStatus, StageRecord, WorkflowStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    JobDescription,
    Resume,
}

impl SubjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobDescription => "job_description",
            Self::Resume => "resume",
        }
    }

    pub fn entity_kind(self) -> EntityKind {
        match self {
            Self::JobDescription => EntityKind::Job,
            Self::Resume => EntityKind::Candidate,
        }
    }
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "job_description" => Ok(Self::JobDescription),
            "resume" => Ok(Self::Resume),
            other => Err(format!("unknown subject type `{other}`")),
        }
    }
}

/// Which side of a match an entity lives on. Doubles as the graph label and
/// the vector payload discriminator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Candidate,
    Job,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Job => "job",
        }
    }

    pub fn graph_label(self) -> &'static str {
        match self {
            Self::Candidate => "Candidate",
            Self::Job => "JobOpportunity",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    HasSkill,
    HasCertification,
    InIndustry,
    HasEducation,
    WorkedAt,
    WorkedAs,
    PotentialRole,
    RequiresSkill,
    PrefersSkill,
    RequiredCertification,
    RequiredEducation,
    SuitableForRole,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 12] = [
        Self::HasSkill,
        Self::HasCertification,
        Self::InIndustry,
        Self::HasEducation,
        Self::WorkedAt,
        Self::WorkedAs,
        Self::PotentialRole,
        Self::RequiresSkill,
        Self::PrefersSkill,
        Self::RequiredCertification,
        Self::RequiredEducation,
        Self::SuitableForRole,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasSkill => "HAS_SKILL",
            Self::HasCertification => "HAS_CERTIFICATION",
            Self::InIndustry => "IN_INDUSTRY",
            Self::HasEducation => "HAS_EDUCATION",
            Self::WorkedAt => "WORKED_AT",
            Self::WorkedAs => "WORKED_AS",
            Self::PotentialRole => "POTENTIAL_ROLE",
            Self::RequiresSkill => "REQUIRES_SKILL",
            Self::PrefersSkill => "PREFERS_SKILL",
            Self::RequiredCertification => "REQUIRED_CERTIFICATION",
            Self::RequiredEducation => "REQUIRED_EDUCATION",
            Self::SuitableForRole => "SUITABLE_FOR_ROLE",
        }
    }

    pub fn owner_kind(self) -> EntityKind {
        match self {
            Self::RequiresSkill
            | Self::PrefersSkill
            | Self::RequiredCertification
            | Self::RequiredEducation
            | Self::SuitableForRole => EntityKind::Job,
            _ => EntityKind::Candidate,
        }
    }

    /// Node label of the relationship target in the graph.
    pub fn target_label(self) -> &'static str {
        match self {
            Self::HasSkill | Self::RequiresSkill | Self::PrefersSkill => "Skill",
            Self::HasCertification | Self::RequiredCertification => "Certification",
            Self::InIndustry => "Industry",
            Self::HasEducation | Self::RequiredEducation => "Education",
            Self::WorkedAt => "Company",
            Self::WorkedAs | Self::PotentialRole | Self::SuitableForRole => "Role",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| SearchError::UnknownRelationship(value.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RelationshipEdge {
    pub source_id: String,
    pub relationship: RelationshipType,
    pub target: String,
}

impl RelationshipEdge {
    pub fn new(
        source_id: impl Into<String>,
        relationship: RelationshipType,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            relationship,
            target: target.into(),
        }
    }
}

/// A relationship target named by an extractor, before it is attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ExtractedRelation {
    pub relationship: RelationshipType,
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileAttributes {
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub clearance: Option<String>,
    pub compensation: Option<String>,
    pub summary: Option<String>,
}

impl ProfileAttributes {
    /// Fills fields that are still empty from `other`.
    pub fn merge_missing(&mut self, other: ProfileAttributes) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.is_none() {
                *slot = value.filter(|text| !text.trim().is_empty());
            }
        }
        fill(&mut self.display_name, other.display_name);
        fill(&mut self.title, other.title);
        fill(&mut self.location, other.location);
        fill(&mut self.clearance, other.clearance);
        fill(&mut self.compensation, other.compensation);
        fill(&mut self.summary, other.summary);
    }
}

/// Output of the static (explicit facts) extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticExtraction {
    #[serde(default)]
    pub attributes: ProfileAttributes,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

/// Output of the inferred (model-judged) extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferredExtraction {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub relations: Vec<ExtractedRelation>,
}

/// Relational record for an ingested subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredProfile {
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub owner_id: String,
    pub attributes: ProfileAttributes,
    pub relations: Vec<ExtractedRelation>,
    pub updated_at: DateTime<Utc>,
}

impl StructuredProfile {
    pub fn kind(&self) -> EntityKind {
        self.subject_type.entity_kind()
    }

    pub fn edges(&self) -> Vec<RelationshipEdge> {
        self.relations
            .iter()
            .map(|relation| {
                RelationshipEdge::new(&self.subject_id, relation.relationship, &relation.target)
            })
            .collect()
    }

    pub fn display_name(&self) -> String {
        self.attributes
            .display_name
            .clone()
            .or_else(|| self.attributes.title.clone())
            .unwrap_or_else(|| self.subject_id.clone())
    }

    /// Text the subject embedding is computed from.
    pub fn embedding_text(&self) -> String {
        let mut parts = Vec::new();
        for value in [
            &self.attributes.title,
            &self.attributes.summary,
            &self.attributes.location,
        ]
        .into_iter()
        .flatten()
        {
            parts.push(value.clone());
        }
        for relation in &self.relations {
            parts.push(relation.target.clone());
        }
        parts.join(". ")
    }

    pub fn vector_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("subject_type".to_string(), Value::from(self.subject_type.as_str()));
        payload.insert("owner_id".to_string(), Value::from(self.owner_id.clone()));
        payload.insert("name".to_string(), Value::from(self.display_name()));
        if let Some(title) = &self.attributes.title {
            payload.insert("title".to_string(), Value::from(title.clone()));
        }
        if let Some(location) = &self.attributes.location {
            payload.insert("location".to_string(), Value::from(location.clone()));
        }
        if let Some(clearance) = &self.attributes.clearance {
            payload.insert("clearance".to_string(), Value::from(clearance.clone()));
        }
        payload
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateProfile {
    pub candidate_id: String,
    pub name: String,
    pub title: Option<String>,
    pub location: Option<String>,
    pub clearance_level: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub relationships: Vec<RelationshipEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOpportunity {
    pub job_id: String,
    pub owner_id: String,
    pub title: String,
    pub compensation: Option<String>,
    pub location: Option<String>,
    pub clearance_requirement: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub relationships: Vec<RelationshipEdge>,
}

impl CandidateProfile {
    pub fn from_structured(profile: &StructuredProfile, relationships: Vec<RelationshipEdge>) -> Self {
        Self {
            candidate_id: profile.subject_id.clone(),
            name: profile.display_name(),
            title: profile.attributes.title.clone(),
            location: profile.attributes.location.clone(),
            clearance_level: profile.attributes.clearance.clone(),
            embedding: None,
            relationships,
        }
    }

    /// View built from the vector payload alone, for subjects whose
    /// relational profile was never written.
    pub fn from_point(candidate_id: &str, point: &VectorPoint, relationships: Vec<RelationshipEdge>) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            name: point
                .text("name")
                .unwrap_or_else(|| candidate_id.to_string()),
            title: point.text("title"),
            location: point.text("location"),
            clearance_level: point.text("clearance"),
            embedding: Some(point.vector.clone()),
            relationships,
        }
    }
}

impl JobOpportunity {
    pub fn from_point(job_id: &str, point: &VectorPoint, relationships: Vec<RelationshipEdge>) -> Self {
        Self {
            job_id: job_id.to_string(),
            owner_id: point.text("owner_id").unwrap_or_default(),
            title: point
                .text("title")
                .or_else(|| point.text("name"))
                .unwrap_or_else(|| job_id.to_string()),
            compensation: None,
            location: point.text("location"),
            clearance_requirement: point.text("clearance"),
            embedding: Some(point.vector.clone()),
            relationships,
        }
    }

    pub fn from_structured(profile: &StructuredProfile, relationships: Vec<RelationshipEdge>) -> Self {
        Self {
            job_id: profile.subject_id.clone(),
            owner_id: profile.owner_id.clone(),
            title: profile
                .attributes
                .title
                .clone()
                .unwrap_or_else(|| profile.display_name()),
            compensation: profile.attributes.compensation.clone(),
            location: profile.attributes.location.clone(),
            clearance_requirement: profile.attributes.clearance.clone(),
            embedding: None,
            relationships,
        }
    }
}

/// A stored embedding together with the attributes written beside it.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

impl VectorPoint {
    pub fn text(&self, field: &str) -> Option<String> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarEntity {
    pub entity_id: String,
    pub score: f64,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub id: Uuid,
    pub job_id: String,
    pub candidate_id: String,
    pub composite_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    NewMatch,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewMatch => "new_match",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Unread,
    Read,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub recipient_id: String,
    pub alert_type: AlertType,
    pub reference_id: Uuid,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new_match(recipient_id: impl Into<String>, match_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            alert_type: AlertType::NewMatch,
            reference_id: match_id,
            status: AlertStatus::Unread,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub recipient_id: String,
    pub job_title: String,
    pub candidate_name: String,
    pub match_report_ref: String,
}

/// Consumed event that starts an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTrigger {
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub session: Option<String>,
    pub raw_extract: String,
}

/// Consumed event that asks for a qualitative evaluation of one pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchTrigger {
    pub job_id: String,
    pub candidate_id: String,
    pub composite_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub owner_id: String,
    pub stage: WorkflowStage,
    pub cancel_requested: bool,
    pub stages: Vec<StageRecord>,
    pub input_checksum: String,
    pub error: Option<String>,
    pub result_ref: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn queued(trigger: &WorkflowTrigger, input_checksum: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id: trigger.subject_id.clone(),
            subject_type: trigger.subject_type,
            owner_id: trigger.owner_id.clone(),
            stage: WorkflowStage::Queued,
            cancel_requested: false,
            stages: Vec::new(),
            input_checksum,
            error: None,
            result_ref: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.stage.status()
    }

    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }
}
