//! Run orchestrator: the entry point that turns a definition plus input into
//! a run.
//!
//! `start` loads the definition, persists a `pending` run and spawns the run
//! body on the tokio runtime, returning before any step executes. The body
//! marks the run `running`, folds the step runner over the top-level steps
//! and finalizes the run. A supervising task awaits the body so that a panic
//! is logged and persisted as a failure instead of leaving the run stuck.
//!
//! Known limitation: runs cannot be cancelled and have no deadline.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use flowline_types::context::{ContextMap, ExecutionContext};
use flowline_types::error::RepositoryError;
use flowline_types::event::WorkflowEvent;
use flowline_types::workflow::{WorkflowDefinition, WorkflowRun};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::state::{RunStateMachine, StateError};
use super::step_runner::StepRunner;
use crate::event::EventBus;
use crate::repository::workflow::{DefinitionRepository, RunRepository};

/// Trigger type recorded for runs started through [`WorkflowOrchestrator::start`].
pub const TRIGGER_MANUAL: &str = "manual";

/// Message persisted when the run task panics.
pub const PANIC_MESSAGE: &str = "run task panicked";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of `start` and `RunHandle::wait`.
///
/// Step failures never appear here; they are recorded on the run itself.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("workflow definition {0} not found")]
    DefinitionNotFound(Uuid),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("run supervisor stopped: {0}")]
    Supervisor(String),
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a started run.
///
/// Dropping the handle detaches the run; it keeps executing in the
/// background and its outcome is only visible through the run store.
#[derive(Debug)]
pub struct RunHandle {
    run: WorkflowRun,
    completion: JoinHandle<Result<WorkflowRun, OrchestratorError>>,
}

impl RunHandle {
    /// The run as persisted at start (status `pending`).
    pub fn run(&self) -> &WorkflowRun {
        &self.run
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    /// Wait for the run to reach a terminal state and return the final record.
    pub async fn wait(self) -> Result<WorkflowRun, OrchestratorError> {
        self.completion
            .await
            .map_err(|e| OrchestratorError::Supervisor(e.to_string()))?
    }
}

// ---------------------------------------------------------------------------
// WorkflowOrchestrator
// ---------------------------------------------------------------------------

/// Starts and drives workflow runs.
pub struct WorkflowOrchestrator<R> {
    repo: Arc<R>,
    runner: Arc<StepRunner>,
    state: RunStateMachine<R>,
    event_bus: EventBus,
}

impl<R> Clone for WorkflowOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            runner: Arc::clone(&self.runner),
            state: self.state.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

impl<R> WorkflowOrchestrator<R>
where
    R: DefinitionRepository + RunRepository + 'static,
{
    pub fn new(repo: Arc<R>, runner: StepRunner, event_bus: EventBus) -> Self {
        Self {
            state: RunStateMachine::new(Arc::clone(&repo)),
            repo,
            runner: Arc::new(runner),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start a manually triggered run.
    pub async fn start(
        &self,
        definition_id: Uuid,
        input: ContextMap,
    ) -> Result<RunHandle, OrchestratorError> {
        self.start_with_trigger(definition_id, input, TRIGGER_MANUAL)
            .await
    }

    /// Start a run, recording which trigger source asked for it.
    pub async fn start_with_trigger(
        &self,
        definition_id: Uuid,
        input: ContextMap,
        trigger_type: &str,
    ) -> Result<RunHandle, OrchestratorError> {
        let definition = self
            .repo
            .get_definition(&definition_id)
            .await?
            .ok_or(OrchestratorError::DefinitionNotFound(definition_id))?;

        let run = self.state.create(&definition, input, trigger_type).await?;
        tracing::info!(
            run_id = %run.id,
            workflow = %definition.name,
            trigger = trigger_type,
            "starting workflow run"
        );

        let body = tokio::spawn(run_body(
            self.state.clone(),
            Arc::clone(&self.runner),
            self.event_bus.clone(),
            definition,
            run.clone(),
        ));
        let completion = tokio::spawn(supervise(
            body,
            self.state.clone(),
            self.event_bus.clone(),
            run.id,
            run.workflow_name.clone(),
        ));

        Ok(RunHandle { run, completion })
    }
}

/// The run body: running -> steps -> completed | failed.
async fn run_body<R: RunRepository>(
    state: RunStateMachine<R>,
    runner: Arc<StepRunner>,
    event_bus: EventBus,
    definition: WorkflowDefinition,
    mut run: WorkflowRun,
) -> Result<WorkflowRun, StateError> {
    let started = Instant::now();

    if let Err(e) = state.mark_running(&mut run).await {
        tracing::error!(run_id = %run.id, error = %e, "failed to mark run running");
        state.fail(&mut run, e.to_string()).await?;
        publish_failed(&event_bus, &run);
        return Ok(run);
    }

    event_bus.publish(WorkflowEvent::RunStarted {
        run_id: run.id,
        workflow_id: run.workflow_id,
        workflow_name: run.workflow_name.clone(),
        trigger_type: run.trigger_type.clone(),
    });

    let context = ExecutionContext::from(run.input.clone());
    match runner.execute_steps(&definition.steps, context).await {
        Ok(context) => {
            if let Err(e) = state.complete(&mut run, context.into_map()).await {
                tracing::error!(run_id = %run.id, error = %e, "failed to persist run result");
                state
                    .fail(&mut run, format!("failed to persist run result: {e}"))
                    .await?;
                publish_failed(&event_bus, &run);
                return Ok(run);
            }
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::info!(run_id = %run.id, duration_ms, "workflow run completed");
            event_bus.publish(WorkflowEvent::RunCompleted {
                run_id: run.id,
                workflow_name: run.workflow_name.clone(),
                duration_ms,
            });
        }
        Err(e) => {
            tracing::warn!(run_id = %run.id, step_id = e.step_id(), error = %e, "workflow run failed");
            state.fail(&mut run, e.failure_message()).await?;
            publish_failed(&event_bus, &run);
        }
    }

    Ok(run)
}

/// Await the run body and convert a panic into a persisted failure.
async fn supervise<R: RunRepository>(
    body: JoinHandle<Result<WorkflowRun, StateError>>,
    state: RunStateMachine<R>,
    event_bus: EventBus,
    run_id: Uuid,
    workflow_name: String,
) -> Result<WorkflowRun, OrchestratorError> {
    match body.await {
        Ok(Ok(run)) => Ok(run),
        Ok(Err(e)) => {
            tracing::error!(%run_id, workflow = %workflow_name, error = %e, "run state could not be persisted");
            Err(e.into())
        }
        Err(join_error) => {
            let detail = if join_error.is_panic() {
                panic_detail(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            tracing::error!(%run_id, workflow = %workflow_name, panic = %detail, "{PANIC_MESSAGE}");
            let run = state
                .fail_by_id(run_id, format!("{PANIC_MESSAGE}: {detail}"))
                .await?;
            publish_failed(&event_bus, &run);
            Ok(run)
        }
    }
}

fn publish_failed(event_bus: &EventBus, run: &WorkflowRun) {
    event_bus.publish(WorkflowEvent::RunFailed {
        run_id: run.id,
        workflow_name: run.workflow_name.clone(),
        error: run.error.clone().unwrap_or_default(),
    });
}

fn panic_detail(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
