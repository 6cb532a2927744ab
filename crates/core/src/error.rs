use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("document is not valid utf-8: {0}")]
    Encoding(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("unknown relationship type `{0}`")]
    UnknownRelationship(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("weight for signal `{signal}` is negative or not finite: {weight}")]
    InvalidWeight { signal: String, weight: f64 },

    #[error("score for signal `{signal}` is outside [0, 1]: {score}")]
    ScoreOutOfRange { signal: String, score: f64 },

    #[error("unknown signal `{0}`")]
    UnknownSignal(String),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model output violates the verdict schema: {0}")]
    Schema(String),

    #[error("model returned empty content")]
    EmptyContent,

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row in {table}: {details}")]
    CorruptRow { table: &'static str, details: String },

    #[error("notification failed: {0}")]
    Notification(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("subject {subject_id} already has an active run {run_id}")]
    ActiveRunExists { subject_id: String, run_id: Uuid },

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {run_id} can no longer be cancelled from stage {stage}")]
    NotCancellable { run_id: Uuid, stage: String },

    #[error("run {run_id} is already terminal ({stage})")]
    Terminal { run_id: Uuid, stage: String },

    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("run {run_id} left stage {expected} underneath this worker")]
    StageConflict { run_id: Uuid, expected: String },

    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} {id} has no profile")]
    MissingProfile { kind: &'static str, id: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Score(#[from] ScoreError),
}
