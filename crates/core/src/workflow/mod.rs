//! Ingestion workflow: the stage machine, the orchestrator that drives runs
//! through it and the read-only status contract callers poll.

pub mod orchestrator;
pub mod stage;
pub mod status;

pub use orchestrator::{build_profile, result_ref, IngestionOrchestrator};
pub use stage::{RunStatus, StageOutcome, StageRecord, WorkflowStage};
pub use status::{get_run_status, poll_until_terminal, RunStatusReport, StatusLabel};
