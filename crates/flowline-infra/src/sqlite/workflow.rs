//! SQLite workflow repository implementation.
//!
//! Implements `DefinitionRepository` and `RunRepository` from `flowline-core`
//! using sqlx with split read/write pools. Definitions are stored as JSON
//! documents; run input and result contexts are stored as JSON text.

use chrono::{DateTime, SecondsFormat, Utc};
use flowline_core::repository::workflow::{DefinitionRepository, RunRepository};
use flowline_types::context::ContextMap;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RunFilter, RunStatus, RunUpdate, WorkflowDefinition, WorkflowRun};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed workflow definition and run store.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowDefRow {
    definition: String,
}

impl WorkflowDefRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            definition: row.try_get("definition")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))
    }
}

struct WorkflowRunRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    status: String,
    trigger_type: String,
    input: String,
    result: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl WorkflowRunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            trigger_type: row.try_get("trigger_type")?,
            input: row.try_get("input")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_run(self) -> Result<WorkflowRun, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(WorkflowRun {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_name: self.workflow_name,
            status,
            trigger_type: self.trigger_type,
            input: parse_context(&self.input)?,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            result: self.result.as_deref().map(parse_context).transpose()?,
            error: self.error,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_context(s: &str) -> Result<ContextMap, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))
}

fn context_json(map: &ContextMap) -> Result<String, RepositoryError> {
    serde_json::to_string(map).map_err(|e| RepositoryError::Query(format!("serialize context: {e}")))
}

fn rows_to_runs(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<WorkflowRun>, RepositoryError> {
    let mut runs = Vec::with_capacity(rows.len());
    for row in rows {
        let r = WorkflowRunRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        runs.push(r.into_run()?);
    }
    Ok(runs)
}

// ---------------------------------------------------------------------------
// DefinitionRepository impl
// ---------------------------------------------------------------------------

impl DefinitionRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflows (id, owner_id, name, enabled, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 name = excluded.name,
                 enabled = excluded.enabled,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(def.id.to_string())
        .bind(&def.owner_id)
        .bind(&def.name)
        .bind(def.enabled)
        .bind(&definition_json)
        .bind(format_datetime(&def.created_at))
        .bind(format_datetime(&def.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowDefRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_definition()?))
            }
            None => Ok(None),
        }
    }

    async fn list_definitions(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query("SELECT definition FROM workflows WHERE owner_id = ? ORDER BY name ASC")
                    .bind(owner)
                    .fetch_all(&self.pool.reader)
                    .await
            }
            None => {
                sqlx::query("SELECT definition FROM workflows ORDER BY name ASC")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut defs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = WorkflowDefRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            defs.push(r.into_definition()?);
        }
        Ok(defs)
    }

    async fn delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// RunRepository impl
// ---------------------------------------------------------------------------

impl RunRepository for SqliteWorkflowRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<WorkflowRun, RepositoryError> {
        let input_json = context_json(&run.input)?;
        let result_json = run.result.as_ref().map(context_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_runs
               (id, workflow_id, workflow_name, status, trigger_type, input,
                result, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(&run.workflow_name)
        .bind(run.status.as_str())
        .bind(&run.trigger_type)
        .bind(&input_json)
        .bind(&result_json)
        .bind(&run.error)
        .bind(format_datetime(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("run {} already exists", run.id))
            }
            _ => RepositoryError::Query(e.to_string()),
        })?;

        Ok(run.clone())
    }

    async fn update_run(
        &self,
        run_id: &Uuid,
        update: &RunUpdate,
    ) -> Result<WorkflowRun, RepositoryError> {
        let result_json = update.result.as_ref().map(context_json).transpose()?;

        let row = sqlx::query(
            r#"UPDATE workflow_runs SET
                 status = COALESCE(?, status),
                 completed_at = COALESCE(?, completed_at),
                 result = COALESCE(?, result),
                 error = COALESCE(?, error)
               WHERE id = ?
               RETURNING *"#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.completed_at.as_ref().map(format_datetime))
        .bind(&result_json)
        .bind(&update.error)
        .bind(run_id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .ok_or(RepositoryError::NotFound)?;

        WorkflowRunRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_run()
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRunRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn find_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let workflow_id = filter.workflow_id.map(|id| id.to_string());
        let status = filter.status.map(|s| s.as_str());
        // LIMIT -1 means no limit in SQLite.
        let limit = filter.limit.map_or(-1, i64::from);

        let rows = sqlx::query(
            r#"SELECT * FROM workflow_runs
               WHERE (?1 IS NULL OR workflow_id = ?1)
                 AND (?2 IS NULL OR status = ?2)
               ORDER BY started_at DESC, id DESC
               LIMIT ?3"#,
        )
        .bind(&workflow_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_runs(&rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
