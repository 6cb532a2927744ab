pub mod config;
pub mod embeddings;
pub mod error;
pub mod evaluation;
pub mod extractor;
pub mod llm;
pub mod logging;
pub mod matching;
pub mod models;
pub mod prompts;
pub mod scoring;
pub mod stores;
pub mod text;
pub mod traits;
pub mod workflow;

pub use config::{MatchConfig, PollConfig, WorkflowConfig};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, HttpEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EvaluationError, IngestError, MatchError, ScoreError, SearchError, StoreError,
    WorkflowError,
};
pub use evaluation::{LlmEvaluator, QualitativeEvaluator, StructuredVerdict};
pub use extractor::{
    discover_documents, input_checksum, read_raw_extract, trigger_for_path, LlmProfileExtractor,
};
pub use llm::{LlmClient, LlmConfig};
pub use matching::{MatchEngine, MatchRecorder, MatchRunReport, PairScore};
pub use models::{
    Alert, CandidateProfile, EntityKind, JobOpportunity, MatchRecord, MatchTrigger,
    NotificationEvent, RelationshipEdge, RelationshipType, SimilarEntity, StructuredProfile,
    SubjectType, VectorPoint, WorkflowRun, WorkflowTrigger,
};
pub use scoring::{aggregate, MatchStrategy, Signal, SignalScores, SubScoreEvaluator, WeightTable};
pub use stores::{BroadcastNotifier, MemoryStore, Neo4jStore, PgStore, QdrantStore, WebhookNotifier};
pub use traits::{
    GraphIndex, MatchStore, MatchUpsert, Notifier, ProfileExtractor, ProfileStore, RunStore,
    VectorIndex,
};
pub use workflow::{
    get_run_status, poll_until_terminal, IngestionOrchestrator, RunStatus, RunStatusReport,
    StatusLabel, WorkflowStage,
};
