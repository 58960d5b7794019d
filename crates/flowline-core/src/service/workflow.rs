//! Workflow management service.
//!
//! CRUD around definitions plus run history queries and statistics. Running
//! workflows is the orchestrator's job; this service only reads runs.

use std::sync::Arc;

use chrono::Utc;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{
    NewDefinition, RunFilter, RunStatus, StepDefinition, WorkflowDefinition, WorkflowRun,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::workflow::{DefinitionRepository, RunRepository};
use crate::workflow::definition::{WorkflowError, validate_definition};

/// Default number of runs returned by history queries.
pub const DEFAULT_RUN_HISTORY_LIMIT: u32 = 50;

/// Errors from the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("workflow {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Invalid(#[from] WorkflowError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Partial update to a definition. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct DefinitionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Vec<StepDefinition>>,
    pub triggers: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

/// Aggregate run counts for one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Runs not yet terminal (pending or running).
    pub running: usize,
    /// Rounded percentage of completed runs; 100 when there are none.
    pub success_rate: u32,
}

impl RunStats {
    fn from_runs(runs: &[WorkflowRun]) -> Self {
        let total = runs.len();
        let completed = runs.iter().filter(|r| r.status == RunStatus::Completed).count();
        let failed = runs.iter().filter(|r| r.status == RunStatus::Failed).count();
        let success_rate = if total == 0 {
            100
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            total,
            completed,
            failed,
            running: total - completed - failed,
            success_rate,
        }
    }
}

/// Service for managing workflow definitions and reading run history.
pub struct WorkflowService<R> {
    repo: Arc<R>,
    history_limit: u32,
}

impl<R> WorkflowService<R>
where
    R: DefinitionRepository + RunRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            history_limit: DEFAULT_RUN_HISTORY_LIMIT,
        }
    }

    /// Override the default run history limit.
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Validate and store a new definition.
    pub async fn create_definition(
        &self,
        new: NewDefinition,
    ) -> Result<WorkflowDefinition, ServiceError> {
        let now = Utc::now();
        let def = WorkflowDefinition {
            id: Uuid::now_v7(),
            owner_id: new.owner_id,
            name: new.name.trim().to_string(),
            description: new.description,
            steps: new.steps,
            triggers: new.triggers,
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
        };
        validate_definition(&def)?;
        self.repo.save_definition(&def).await?;
        tracing::info!(workflow_id = %def.id, name = %def.name, "workflow created");
        Ok(def)
    }

    pub async fn get_definition(&self, id: &Uuid) -> Result<WorkflowDefinition, ServiceError> {
        self.repo
            .get_definition(id)
            .await?
            .ok_or(ServiceError::NotFound(*id))
    }

    pub async fn list_definitions(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, ServiceError> {
        Ok(self.repo.list_definitions(owner_id).await?)
    }

    /// Definitions with `enabled = true`.
    pub async fn list_enabled(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, ServiceError> {
        let mut defs = self.repo.list_definitions(owner_id).await?;
        defs.retain(|d| d.enabled);
        Ok(defs)
    }

    /// Apply a partial update, revalidate and bump `updated_at`.
    pub async fn update_definition(
        &self,
        id: &Uuid,
        update: DefinitionUpdate,
    ) -> Result<WorkflowDefinition, ServiceError> {
        let mut def = self.get_definition(id).await?;

        if let Some(name) = update.name {
            def.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            def.description = Some(description);
        }
        if let Some(steps) = update.steps {
            def.steps = steps;
        }
        if let Some(triggers) = update.triggers {
            def.triggers = triggers;
        }
        if let Some(enabled) = update.enabled {
            def.enabled = enabled;
        }
        def.updated_at = Utc::now();

        validate_definition(&def)?;
        self.repo.save_definition(&def).await?;
        tracing::info!(workflow_id = %def.id, "workflow updated");
        Ok(def)
    }

    pub async fn delete_definition(&self, id: &Uuid) -> Result<(), ServiceError> {
        if !self.repo.delete_definition(id).await? {
            return Err(ServiceError::NotFound(*id));
        }
        tracing::info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    pub async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, ServiceError> {
        Ok(self.repo.get_run(run_id).await?)
    }

    /// Most recent runs of a workflow, newest first.
    pub async fn list_runs(
        &self,
        workflow_id: &Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<WorkflowRun>, ServiceError> {
        self.find_runs(workflow_id, None, limit).await
    }

    /// Most recent runs of a workflow, optionally restricted to one status.
    pub async fn find_runs(
        &self,
        workflow_id: &Uuid,
        status: Option<RunStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<WorkflowRun>, ServiceError> {
        let mut filter =
            RunFilter::for_workflow(*workflow_id).with_limit(limit.unwrap_or(self.history_limit));
        filter.status = status;
        Ok(self.repo.find_runs(&filter).await?)
    }

    /// Most recent failed runs of a workflow, newest first.
    pub async fn failed_runs(&self, workflow_id: &Uuid) -> Result<Vec<WorkflowRun>, ServiceError> {
        self.find_runs(workflow_id, Some(RunStatus::Failed), None).await
    }

    pub async fn run_stats(&self, workflow_id: &Uuid) -> Result<RunStats, ServiceError> {
        let runs = self
            .repo
            .find_runs(&RunFilter::for_workflow(*workflow_id))
            .await?;
        Ok(RunStats::from_runs(&runs))
    }
}
