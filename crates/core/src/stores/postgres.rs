//! PostgreSQL store for structured profiles, matches, alerts, evaluations and
//! workflow runs.
//!
//! Every write is keyed on business identity and resolved with
//! `ON CONFLICT`, so duplicate triggers never need a read-then-write.

use crate::error::StoreError;
use crate::evaluation::StructuredVerdict;
use crate::models::{
    Alert, ExtractedRelation, MatchRecord, ProfileAttributes, StructuredProfile, SubjectType,
    WorkflowRun,
};
use crate::traits::{BeginRun, MatchStore, MatchUpsert, ProfileStore, RunStore, UpsertedMatch};
use crate::workflow::{StageRecord, WorkflowStage};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

const RUN_COLUMNS: &str = "id, subject_id, subject_type, owner_id, stage, cancel_requested, \
    stages, input_checksum, error, result_ref, started_at, updated_at";

const MATCH_COLUMNS: &str = "id, job_id, candidate_id, composite_score, created_at";

/// Attempts at `begin_run` when the conflicting run finishes between the
/// insert and the lookup.
const BEGIN_RUN_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;
        info!(max_connections = DEFAULT_MAX_CONNECTIONS, "connected to postgres");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("postgres migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn active_run_for(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs
             WHERE subject_type = $1 AND subject_id = $2 AND stage <> ALL($3)
             ORDER BY started_at DESC
             LIMIT 1"
        ))
        .bind(subject_type.as_str())
        .bind(subject_id)
        .bind(terminal_stage_names())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_run_row).transpose()
    }
}

fn terminal_stage_names() -> Vec<String> {
    WorkflowStage::ALL
        .iter()
        .filter(|stage| stage.is_terminal())
        .map(|stage| stage.as_str().to_string())
        .collect()
}

fn cancellable_stage_names() -> Vec<String> {
    WorkflowStage::ALL
        .iter()
        .filter(|stage| stage.is_cancellable())
        .map(|stage| stage.as_str().to_string())
        .collect()
}

fn corrupt(table: &'static str, details: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        table,
        details: details.into(),
    }
}

fn parse_run_row(row: &PgRow) -> Result<WorkflowRun, StoreError> {
    let stage: String = row.try_get("stage")?;
    let subject_type: String = row.try_get("subject_type")?;
    let stages: Json<Vec<StageRecord>> = row.try_get("stages")?;
    Ok(WorkflowRun {
        id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        subject_type: subject_type
            .parse()
            .map_err(|error: String| corrupt("workflow_runs", error))?,
        owner_id: row.try_get("owner_id")?,
        stage: stage
            .parse()
            .map_err(|error: String| corrupt("workflow_runs", error))?,
        cancel_requested: row.try_get("cancel_requested")?,
        stages: stages.0,
        input_checksum: row.try_get("input_checksum")?,
        error: row.try_get("error")?,
        result_ref: row.try_get("result_ref")?,
        started_at: row.try_get("started_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_match_row(row: &PgRow) -> Result<MatchRecord, StoreError> {
    Ok(MatchRecord {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        candidate_id: row.try_get("candidate_id")?,
        composite_score: row.try_get("composite_score")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_alert_row(row: &PgRow) -> Result<Alert, StoreError> {
    let alert_type: String = row.try_get("alert_type")?;
    let status: String = row.try_get("status")?;
    Ok(Alert {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        alert_type: serde_json::from_value(serde_json::Value::String(alert_type))
            .map_err(|error| corrupt("alerts", error.to_string()))?,
        reference_id: row.try_get("reference_id")?,
        status: serde_json::from_value(serde_json::Value::String(status))
            .map_err(|error| corrupt("alerts", error.to_string()))?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn upsert_profile(&self, profile: &StructuredProfile) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO structured_profiles
                (subject_id, subject_type, owner_id, attributes, relations, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (subject_type, subject_id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                attributes = EXCLUDED.attributes,
                relations = EXCLUDED.relations,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&profile.subject_id)
        .bind(profile.subject_type.as_str())
        .bind(&profile.owner_id)
        .bind(Json(&profile.attributes))
        .bind(Json(&profile.relations))
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<Option<StructuredProfile>, StoreError> {
        let row = sqlx::query(
            "SELECT subject_id, subject_type, owner_id, attributes, relations, updated_at
             FROM structured_profiles WHERE subject_type = $1 AND subject_id = $2",
        )
        .bind(subject_type.as_str())
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let subject_type: String = row.try_get("subject_type")?;
        let attributes: Json<ProfileAttributes> = row.try_get("attributes")?;
        let relations: Json<Vec<ExtractedRelation>> = row.try_get("relations")?;
        Ok(Some(StructuredProfile {
            subject_id: row.try_get("subject_id")?,
            subject_type: subject_type
                .parse()
                .map_err(|error: String| corrupt("structured_profiles", error))?,
            owner_id: row.try_get("owner_id")?,
            attributes: attributes.0,
            relations: relations.0,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn discard_profile(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM structured_profiles WHERE subject_type = $1 AND subject_id = $2")
            .bind(subject_type.as_str())
            .bind(subject_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn upsert_match(
        &self,
        job_id: &str,
        candidate_id: &str,
        composite_score: f64,
        policy: MatchUpsert,
    ) -> Result<UpsertedMatch, StoreError> {
        // `xmax = 0` only holds for a row this statement inserted.
        let row = sqlx::query(&format!(
            "INSERT INTO match_records (id, job_id, candidate_id, composite_score)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (job_id, candidate_id) DO UPDATE SET
                composite_score = CASE WHEN $5 THEN EXCLUDED.composite_score
                                       ELSE match_records.composite_score END,
                updated_at = CASE WHEN $5 THEN now() ELSE match_records.updated_at END
             RETURNING {MATCH_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(candidate_id)
        .bind(composite_score)
        .bind(policy == MatchUpsert::Refresh)
        .fetch_one(&self.pool)
        .await?;

        let created: bool = row.try_get("inserted")?;
        let record = parse_match_row(&row)?;
        debug!(match_id = %record.id, created, "match upserted");
        Ok(UpsertedMatch { record, created })
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO alerts (id, recipient_id, alert_type, reference_id, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (recipient_id, reference_id) DO NOTHING",
        )
        .bind(alert.id)
        .bind(&alert.recipient_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.reference_id)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_evaluation(
        &self,
        job_id: &str,
        candidate_id: &str,
        verdict: &StructuredVerdict,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO match_evaluations (job_id, candidate_id, verdict, evaluated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (job_id, candidate_id) DO UPDATE SET
                verdict = EXCLUDED.verdict,
                evaluated_at = EXCLUDED.evaluated_at",
        )
        .bind(job_id)
        .bind(candidate_id)
        .bind(Json(verdict))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_match(
        &self,
        job_id: &str,
        candidate_id: &str,
    ) -> Result<Option<MatchRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_records WHERE job_id = $1 AND candidate_id = $2"
        ))
        .bind(job_id)
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_match_row).transpose()
    }

    async fn alerts_for(&self, recipient_id: &str) -> Result<Vec<Alert>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, recipient_id, alert_type, reference_id, status, created_at
             FROM alerts WHERE recipient_id = $1 ORDER BY created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_alert_row).collect()
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn begin_run(&self, run: &WorkflowRun) -> Result<BeginRun, StoreError> {
        for _ in 0..BEGIN_RUN_ATTEMPTS {
            let inserted = sqlx::query(&format!(
                "INSERT INTO workflow_runs
                    (id, subject_id, subject_type, owner_id, stage, cancel_requested, stages,
                     input_checksum, error, result_ref, started_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, false, $6, $7, NULL, NULL, $8, $8)
                 ON CONFLICT (subject_type, subject_id) WHERE stage NOT IN ('completed', 'failed', 'cancelled')
                 DO NOTHING
                 RETURNING {RUN_COLUMNS}"
            ))
            .bind(run.id)
            .bind(&run.subject_id)
            .bind(run.subject_type.as_str())
            .bind(&run.owner_id)
            .bind(run.stage.as_str())
            .bind(Json(&run.stages))
            .bind(&run.input_checksum)
            .bind(run.started_at)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = inserted {
                return Ok(BeginRun::Started(parse_run_row(&row)?));
            }
            if let Some(active) = self.active_run_for(run.subject_type, &run.subject_id).await? {
                return Ok(BeginRun::ActiveRunExists(active));
            }
        }
        Err(StoreError::Conflict(format!(
            "active run for subject {} kept changing during begin_run",
            run.subject_id
        )))
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = $1"))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_run_row).transpose()
    }

    async fn advance(
        &self,
        run_id: Uuid,
        from: WorkflowStage,
        to: WorkflowStage,
        record: Option<StageRecord>,
        error: Option<String>,
        result_ref: Option<String>,
    ) -> Result<Option<WorkflowRun>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE workflow_runs SET
                stage = $3,
                stages = CASE WHEN $4::jsonb IS NULL THEN stages
                              ELSE stages || jsonb_build_array($4::jsonb) END,
                error = COALESCE($5, error),
                result_ref = COALESCE($6, result_ref),
                updated_at = now()
             WHERE id = $1 AND stage = $2 AND (NOT cancel_requested OR $7)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(run_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(record.map(Json))
        .bind(error)
        .bind(result_ref)
        .bind(to.is_terminal())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_run_row).transpose()
    }

    async fn request_cancel(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE workflow_runs SET cancel_requested = true, updated_at = now()
             WHERE id = $1 AND stage = ANY($2)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(run_id)
        .bind(cancellable_stage_names())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(parse_run_row(&row)?)),
            None => self.get_run(run_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_cancellable_stage_sets_are_disjoint() {
        let terminal = terminal_stage_names();
        let cancellable = cancellable_stage_names();
        assert_eq!(terminal, vec!["completed", "failed", "cancelled"]);
        assert!(cancellable.iter().all(|stage| !terminal.contains(stage)));
        assert!(!cancellable.contains(&"building_graph".to_string()));
    }

    #[test]
    fn migration_index_matches_terminal_stages() {
        let migration = include_str!("../../migrations/20250101000000_init.sql");
        for stage in terminal_stage_names() {
            assert!(migration.contains(&format!("'{stage}'")), "{stage}");
        }
    }
}
