use crate::config::PollConfig;
use crate::models::WorkflowRun;
use crate::traits::RunStore;
use crate::workflow::{RunStatus, StageRecord, WorkflowStage};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Label returned to status callers. The last two are not run states: they
/// describe the read itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusLabel {
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(rename = "No data")]
    NoData,
    #[serde(rename = "Error fetching data")]
    ErrorFetchingData,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::NoData => "No data",
            Self::ErrorFetchingData => "Error fetching data",
        }
    }

    /// Pollers stop on every label except `Running`; the two read-failure
    /// labels count as terminal with an error.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::NoData | Self::ErrorFetchingData)
    }
}

impl From<RunStatus> for StatusLabel {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Running => Self::Running,
            RunStatus::Completed => Self::Completed,
            RunStatus::Failed => Self::Failed,
            RunStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatusReport {
    pub run_id: Uuid,
    pub status: StatusLabel,
    pub stage: Option<WorkflowStage>,
    pub cancel_requested: bool,
    pub result_ref: Option<String>,
    pub error: Option<String>,
    pub stages: Vec<StageRecord>,
}

impl RunStatusReport {
    fn without_run(run_id: Uuid, status: StatusLabel, error: Option<String>) -> Self {
        Self {
            run_id,
            status,
            stage: None,
            cancel_requested: false,
            result_ref: None,
            error,
            stages: Vec::new(),
        }
    }

    pub fn from_run(run: WorkflowRun) -> Self {
        Self {
            run_id: run.id,
            status: run.status().into(),
            stage: Some(run.stage),
            cancel_requested: run.cancel_requested,
            result_ref: run.result_ref,
            error: run.error,
            stages: run.stages,
        }
    }
}

/// Read-only status lookup. Never fails and never writes: a missing run is
/// `No data`, a store failure is `Error fetching data`.
pub async fn get_run_status(store: &dyn RunStore, run_id: Uuid) -> RunStatusReport {
    match store.get_run(run_id).await {
        Ok(Some(run)) => RunStatusReport::from_run(run),
        Ok(None) => RunStatusReport::without_run(run_id, StatusLabel::NoData, None),
        Err(error) => {
            warn!(run_id = %run_id, error = %error, "run status lookup failed");
            RunStatusReport::without_run(
                run_id,
                StatusLabel::ErrorFetchingData,
                Some(error.to_string()),
            )
        }
    }
}

/// Polls until a terminal label is seen or `poll.max_attempts` reads have
/// been made, sleeping with bounded exponential backoff in between. Returns
/// the last report read.
pub async fn poll_until_terminal(
    store: &dyn RunStore,
    run_id: Uuid,
    poll: PollConfig,
) -> RunStatusReport {
    let attempts = poll.max_attempts.max(1);
    let mut report = get_run_status(store, run_id).await;

    for attempt in 1..attempts {
        if report.status.is_terminal() {
            break;
        }
        let delay = poll.delay_for(attempt - 1);
        debug!(run_id = %run_id, attempt, delay_ms = delay.as_millis() as u64, "run still running");
        tokio::time::sleep(delay).await;
        report = get_run_status(store, run_id).await;
    }
    report
}
