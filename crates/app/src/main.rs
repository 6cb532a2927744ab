use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use talentgraph_core::evaluation::QualitativeEvaluator;
use talentgraph_core::llm::{DEFAULT_GEN_MODEL, DEFAULT_OPENAI_URL};
use talentgraph_core::{
    discover_documents, get_run_status, poll_until_terminal, trigger_for_path,
    BroadcastNotifier, CharacterNgramEmbedder, Embedder, GraphIndex, HttpEmbedder,
    IngestionOrchestrator, LlmClient, LlmConfig, LlmEvaluator, LlmProfileExtractor, MatchConfig,
    MatchEngine, MatchStore, MatchTrigger, MemoryStore, Neo4jStore, Notifier, PgStore,
    PollConfig, ProfileExtractor, ProfileStore, QdrantStore, RunStore, SubScoreEvaluator,
    SubjectType, VectorIndex, WebhookNotifier, WorkflowConfig,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "talentgraph", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Keep every store in process memory. Nothing outlives the command.
    #[arg(long, global = true, default_value_t = false)]
    memory: bool,

    /// Postgres connection string for profiles, matches and workflow runs
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/talentgraph")]
    database_url: String,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Prefix of the per-kind Qdrant collections
    #[arg(long, env = "QDRANT_COLLECTION_PREFIX", default_value = "talentgraph")]
    qdrant_prefix: String,

    /// Neo4j HTTP endpoint
    #[arg(long, env = "NEO4J_URL", default_value = "http://localhost:7474")]
    neo4j_url: String,

    #[arg(long, env = "NEO4J_DB", default_value = "neo4j")]
    neo4j_db: String,

    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = "password")]
    neo4j_password: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_URL)]
    openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,

    /// Chat model used for extraction and evaluation
    #[arg(long, env = "GEN_MODEL", default_value = DEFAULT_GEN_MODEL)]
    gen_model: String,

    /// Embedding model. Without one the offline n-gram embedder is used.
    #[arg(long, env = "EMBED_MODEL")]
    embed_model: Option<String>,

    #[arg(long, env = "EMBED_DIMENSIONS", default_value = "1536")]
    embed_dimensions: usize,

    /// Webhook that receives new-match notifications
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    notify_webhook_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create or update the relational schema.
    Migrate,
    /// Ingest one document or every document under a folder.
    Ingest {
        /// File or folder (searched recursively).
        #[arg(long)]
        path: PathBuf,
        /// `resume` or `job_description`.
        #[arg(long)]
        subject_type: SubjectType,
        /// Owner of the ingested subjects (candidate user or employer).
        #[arg(long)]
        owner: String,
    },
    /// Print the status of a workflow run.
    Status {
        run_id: Uuid,
        /// Poll with backoff until the run is terminal.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
    /// Request cancellation of a run that has not reached graph construction.
    Cancel { run_id: Uuid },
    /// Search candidates for a stored job and record accepted matches.
    MatchJob { job_id: String },
    /// Qualitative evaluation of one pair, as delivered by a match trigger.
    Evaluate {
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        candidate_id: String,
        #[arg(long)]
        composite_score: f64,
    },
}

/// Store and model handles shared by the subcommands.
struct Services {
    runs: Arc<dyn RunStore>,
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchStore>,
    graph: Arc<dyn GraphIndex>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    notifier: Arc<dyn Notifier>,
    llm: LlmClient,
}

impl Services {
    async fn connect(cli: &Cli) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> = match &cli.embed_model {
            Some(model) => Arc::new(HttpEmbedder::new(
                &cli.openai_base_url,
                cli.openai_api_key.clone(),
                model.clone(),
                cli.embed_dimensions,
            )?),
            None => Arc::new(CharacterNgramEmbedder::default()),
        };

        let notifier: Arc<dyn Notifier> = match &cli.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url)?),
            None => Arc::new(BroadcastNotifier::default()),
        };

        let llm = LlmClient::new(LlmConfig {
            base_url: cli.openai_base_url.clone(),
            api_key: cli.openai_api_key.clone(),
            model: cli.gen_model.clone(),
            ..LlmConfig::default()
        })?;
        if cli.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; model calls will likely be rejected");
        }

        if cli.memory {
            let store = Arc::new(MemoryStore::new());
            return Ok(Self {
                runs: store.clone(),
                profiles: store.clone(),
                matches: store.clone(),
                graph: store.clone(),
                vectors: store,
                embedder,
                notifier,
                llm,
            });
        }

        let postgres = Arc::new(
            PgStore::connect(&cli.database_url)
                .await
                .context("connecting to postgres")?,
        );
        let qdrant = QdrantStore::new(&cli.qdrant_url, &cli.qdrant_prefix, embedder.dimensions())
            .with_api_key(cli.qdrant_api_key.clone());
        let neo4j = Neo4jStore::new(
            &cli.neo4j_url,
            &cli.neo4j_db,
            &cli.neo4j_user,
            &cli.neo4j_password,
        );

        Ok(Self {
            runs: postgres.clone(),
            profiles: postgres.clone(),
            matches: postgres,
            graph: Arc::new(neo4j),
            vectors: Arc::new(qdrant),
            embedder,
            notifier,
            llm,
        })
    }

    fn orchestrator(&self) -> Arc<IngestionOrchestrator> {
        let extractor: Arc<dyn ProfileExtractor> =
            Arc::new(LlmProfileExtractor::new(self.llm.clone()));
        Arc::new(IngestionOrchestrator::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.profiles),
            Arc::clone(&self.graph),
            Arc::clone(&self.vectors),
            Arc::clone(&self.embedder),
            extractor,
            WorkflowConfig::default(),
        ))
    }

    fn engine(&self, config: MatchConfig) -> MatchEngine {
        let evaluator: Arc<dyn QualitativeEvaluator> =
            Arc::new(LlmEvaluator::new(self.llm.clone()));
        MatchEngine::new(
            Arc::clone(&self.vectors),
            Arc::clone(&self.graph),
            Arc::clone(&self.profiles),
            Arc::clone(&self.matches),
            Arc::clone(&self.notifier),
            SubScoreEvaluator::new(Arc::clone(&self.embedder), config.strategy),
            evaluator,
            config,
        )
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn ingest(
    services: &Services,
    path: &Path,
    subject_type: SubjectType,
    owner: &str,
) -> anyhow::Result<()> {
    let files = if path.is_dir() {
        discover_documents(path)
    } else {
        vec![path.to_path_buf()]
    };
    if files.is_empty() {
        bail!("no documents found under {}", path.display());
    }

    let orchestrator = services.orchestrator();
    let mut handles = Vec::with_capacity(files.len());
    for file in &files {
        let trigger = match trigger_for_path(file, subject_type, owner) {
            Ok(trigger) => trigger,
            Err(error) => {
                warn!(path = %file.display(), error = %error, "skipped document");
                continue;
            }
        };
        match orchestrator.spawn(trigger).await {
            Ok((run, handle)) => {
                info!(path = %file.display(), run_id = %run.id, "run started");
                handles.push((file.clone(), handle));
            }
            Err(error) => warn!(path = %file.display(), error = %error, "run not started"),
        }
    }

    let mut finished = Vec::with_capacity(handles.len());
    for (file, handle) in handles {
        match handle.await? {
            Ok(run) => finished.push(json!({
                "path": file.display().to_string(),
                "run_id": run.id,
                "subject_id": run.subject_id,
                "status": run.status().as_str(),
                "result_ref": run.result_ref,
                "stages": run.stages,
            })),
            Err(error) => {
                warn!(path = %file.display(), error = %error, "run aborted");
                finished.push(json!({
                    "path": file.display().to_string(),
                    "error": error.to_string(),
                }));
            }
        }
    }

    info!(documents = files.len(), runs = finished.len(), "ingestion finished");
    print_json(&finished)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        memory = cli.memory,
        "talentgraph boot"
    );

    if let Command::Migrate = cli.command {
        if cli.memory {
            bail!("migrate needs a database; drop --memory");
        }
        let postgres = PgStore::connect(&cli.database_url)
            .await
            .context("connecting to postgres")?;
        postgres.migrate().await?;
        let embedder_dimensions = if cli.embed_model.is_some() {
            cli.embed_dimensions
        } else {
            CharacterNgramEmbedder::default().dimensions()
        };
        QdrantStore::new(&cli.qdrant_url, &cli.qdrant_prefix, embedder_dimensions)
            .with_api_key(cli.qdrant_api_key.clone())
            .ensure_collections()
            .await?;
        println!("schema ready at {}", Utc::now().to_rfc3339());
        return Ok(());
    }

    let services = Services::connect(&cli).await?;

    match &cli.command {
        Command::Migrate => {}
        Command::Ingest {
            path,
            subject_type,
            owner,
        } => ingest(&services, path, *subject_type, owner).await?,
        Command::Status { run_id, wait } => {
            let report = if *wait {
                poll_until_terminal(services.runs.as_ref(), *run_id, PollConfig::default()).await
            } else {
                get_run_status(services.runs.as_ref(), *run_id).await
            };
            print_json(&report)?;
        }
        Command::Cancel { run_id } => {
            let run = services.orchestrator().cancel(*run_id).await?;
            print_json(&run)?;
        }
        Command::MatchJob { job_id } => {
            let engine = services.engine(MatchConfig::from_env()?);
            let report = engine.match_job(job_id).await?;
            print_json(&report)?;
        }
        Command::Evaluate {
            job_id,
            candidate_id,
            composite_score,
        } => {
            let engine = services.engine(MatchConfig::from_env()?);
            let trigger = MatchTrigger {
                job_id: job_id.clone(),
                candidate_id: candidate_id.clone(),
                composite_score: *composite_score,
            };
            let record = engine.handle_trigger(&trigger).await?;
            print_json(&json!({
                "job_id": trigger.job_id,
                "candidate_id": trigger.candidate_id,
                "matched": record.is_some(),
                "match": record,
            }))?;
        }
    }

    Ok(())
}
