//! Structured logging field names.
//!
//! Spans are opened with these fields declared (empty where the value is not
//! known yet) and filled through `Span::record`, so log queries can rely on
//! one spelling across the ingestion and matching paths.
//!
//! | Level | Usage |
//! |-------|-------|
//! | WARN  | Enrichment stage skipped, notification not delivered |
//! | INFO  | Run started / finished, match recorded |
//! | DEBUG | Stage transitions, per-candidate scores |

/// Workflow run UUID.
pub const RUN_ID: &str = "run_id";

/// Resume or job description being ingested.
pub const SUBJECT_ID: &str = "subject_id";

/// Current workflow stage, in storage form (`building_graph`).
pub const STAGE: &str = "stage";

pub const JOB_ID: &str = "job_id";

pub const CANDIDATE_ID: &str = "candidate_id";

/// Composite score of a (job, candidate) pair.
pub const SCORE: &str = "score";
