use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ingestion state machine cursor.
///
/// `Queued -> ExtractingStatic -> ExtractingInferred -> WritingStructured ->
/// BuildingGraph -> EmbeddingGraph -> Completed`, with `Failed` reachable from
/// any non-terminal stage and `Cancelled` only from stages before
/// `BuildingGraph`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Queued,
    ExtractingStatic,
    ExtractingInferred,
    WritingStructured,
    BuildingGraph,
    EmbeddingGraph,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 9] = [
        Self::Queued,
        Self::ExtractingStatic,
        Self::ExtractingInferred,
        Self::WritingStructured,
        Self::BuildingGraph,
        Self::EmbeddingGraph,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::ExtractingStatic => "extracting_static",
            Self::ExtractingInferred => "extracting_inferred",
            Self::WritingStructured => "writing_structured",
            Self::BuildingGraph => "building_graph",
            Self::EmbeddingGraph => "embedding_graph",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Enrichment stages tolerate failure; the run moves on with partial data.
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            Self::ExtractingStatic | Self::ExtractingInferred | Self::WritingStructured
        )
    }

    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::ExtractingStatic | Self::ExtractingInferred | Self::WritingStructured
        )
    }

    pub fn next(self) -> Option<WorkflowStage> {
        match self {
            Self::Queued => Some(Self::ExtractingStatic),
            Self::ExtractingStatic => Some(Self::ExtractingInferred),
            Self::ExtractingInferred => Some(Self::WritingStructured),
            Self::WritingStructured => Some(Self::BuildingGraph),
            Self::BuildingGraph => Some(Self::EmbeddingGraph),
            Self::EmbeddingGraph => Some(Self::Completed),
            Self::Completed | Self::Failed | Self::Cancelled => None,
        }
    }

    pub fn can_transition_to(self, to: WorkflowStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Self::Failed => true,
            Self::Cancelled => self.is_cancellable(),
            other => self.next() == Some(other),
        }
    }

    pub fn status(self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Failed => RunStatus::Failed,
            Self::Cancelled => RunStatus::Cancelled,
            _ => RunStatus::Running,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| format!("unknown workflow stage `{value}`"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    /// Enrichment stage failed; the run carried on with partial data.
    SkippedWithError(String),
    /// Structural stage failed; the run stopped here.
    Failed(String),
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::SkippedWithError(error) | Self::Failed(error) => Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: WorkflowStage,
    pub outcome: StageOutcome,
    pub finished_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(stage: WorkflowStage, outcome: StageOutcome) -> Self {
        Self {
            stage,
            outcome,
            finished_at: Utc::now(),
        }
    }
}
