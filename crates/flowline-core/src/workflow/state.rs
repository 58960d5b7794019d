//! Run lifecycle state machine.
//!
//! `pending -> running -> completed | failed`, plus `pending -> failed` for
//! runs that never got going. Every transition is persisted as exactly one
//! `RunUpdate` and the caller's record is refreshed from the store.

use std::sync::Arc;

use chrono::Utc;
use flowline_types::context::ContextMap;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RunStatus, RunUpdate, WorkflowDefinition, WorkflowRun};
use uuid::Uuid;

use crate::repository::workflow::RunRepository;

/// Errors from run state transitions.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid run transition {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Creates, advances and finalizes run records.
pub struct RunStateMachine<R> {
    repo: Arc<R>,
}

impl<R> Clone for RunStateMachine<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: RunRepository> RunStateMachine<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Persist a new `pending` run for a definition.
    pub async fn create(
        &self,
        definition: &WorkflowDefinition,
        input: ContextMap,
        trigger_type: &str,
    ) -> Result<WorkflowRun, StateError> {
        let run = WorkflowRun {
            id: Uuid::now_v7(),
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
            status: RunStatus::Pending,
            trigger_type: trigger_type.to_string(),
            input,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        };
        let created = self.repo.create_run(&run).await?;
        tracing::debug!(run_id = %created.id, workflow = %created.workflow_name, "run created");
        Ok(created)
    }

    pub async fn mark_running(&self, run: &mut WorkflowRun) -> Result<(), StateError> {
        self.transition(
            run,
            RunUpdate {
                status: Some(RunStatus::Running),
                ..RunUpdate::default()
            },
        )
        .await
    }

    /// Finalize as `completed` with the final context snapshot.
    pub async fn complete(&self, run: &mut WorkflowRun, result: ContextMap) -> Result<(), StateError> {
        self.transition(
            run,
            RunUpdate {
                status: Some(RunStatus::Completed),
                completed_at: Some(Utc::now()),
                result: Some(result),
                error: None,
            },
        )
        .await
    }

    /// Finalize as `failed` with an error message.
    pub async fn fail(&self, run: &mut WorkflowRun, message: impl Into<String>) -> Result<(), StateError> {
        self.transition(
            run,
            RunUpdate {
                status: Some(RunStatus::Failed),
                completed_at: Some(Utc::now()),
                result: None,
                error: Some(message.into()),
            },
        )
        .await
    }

    /// Fail a run known only by ID, reading its current status from the
    /// store. Already-terminal runs are returned unchanged.
    pub async fn fail_by_id(&self, run_id: Uuid, message: impl Into<String>) -> Result<WorkflowRun, StateError> {
        let mut run = self
            .repo
            .get_run(&run_id)
            .await?
            .ok_or(StateError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        self.fail(&mut run, message).await?;
        Ok(run)
    }

    async fn transition(&self, run: &mut WorkflowRun, update: RunUpdate) -> Result<(), StateError> {
        let to = update.status.unwrap_or(run.status);
        if !run.status.can_transition_to(to) {
            return Err(StateError::InvalidTransition {
                from: run.status,
                to,
            });
        }
        *run = self.repo.update_run(&run.id, &update).await?;
        tracing::debug!(run_id = %run.id, status = %run.status, "run transitioned");
        Ok(())
    }
}
