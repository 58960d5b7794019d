//! Step interpreter.
//!
//! `StepRunner` walks the step tree recursively, threading an
//! `ExecutionContext` through it:
//!
//! - `action` resolves inputs, dispatches to a handler and binds outputs.
//! - `condition` evaluates an expression and runs `then` or `else`.
//! - `loop` runs its steps once per item, sequentially, each iteration
//!   starting from the enclosing context plus `item`.
//! - `parallel` runs branches concurrently from the same snapshot and joins
//!   all-or-nothing.
//!
//! The first error at any depth aborts the whole walk.

use std::future::Future;
use std::pin::Pin;

use flowline_types::context::{ContextMap, ContextValue, ExecutionContext};
use flowline_types::workflow::{ParallelBranch, StepConfig, StepDefinition, StepKind};
use futures_util::future::try_join_all;

use super::action::{ActionDispatcher, DispatchError};
use super::expression::WorkflowEvaluator;
use super::resolver::{lookup_path, resolve, resolve_inputs};

/// Context key holding the current element inside a loop.
pub const LOOP_ITEM_KEY: &str = "item";

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<ExecutionContext, StepError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that abort step execution.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The action handler could not be found or failed.
    #[error("step '{step_id}': {source}")]
    Action {
        step_id: String,
        #[source]
        source: DispatchError,
    },

    /// The declared step kind disagrees with its configuration.
    #[error("step '{step_id}': unknown step kind '{declared}' for {actual} config")]
    KindMismatch {
        step_id: String,
        declared: StepKind,
        actual: StepKind,
    },
}

impl StepError {
    /// ID of the step that failed.
    pub fn step_id(&self) -> &str {
        match self {
            StepError::Action { step_id, .. } | StepError::KindMismatch { step_id, .. } => step_id,
        }
    }

    /// Message recorded on a failed run: a handler's own error text,
    /// otherwise the dispatch or kind error without the step prefix.
    pub fn failure_message(&self) -> String {
        match self {
            StepError::Action {
                source: DispatchError::Handler { source, .. },
                ..
            } => source.to_string(),
            StepError::Action { source, .. } => source.to_string(),
            StepError::KindMismatch {
                declared, actual, ..
            } => format!("unknown step kind '{declared}' for {actual} config"),
        }
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes workflow steps against an execution context.
#[derive(Debug, Clone)]
pub struct StepRunner {
    dispatcher: ActionDispatcher,
    evaluator: WorkflowEvaluator,
}

impl StepRunner {
    pub fn new(dispatcher: ActionDispatcher) -> Self {
        Self {
            dispatcher,
            evaluator: WorkflowEvaluator::new(),
        }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Execute one step and return the updated context.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        self.execute_boxed(step, context).await
    }

    /// Execute a list of steps in order, threading the context forward.
    pub async fn execute_steps(
        &self,
        steps: &[StepDefinition],
        context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        self.execute_steps_boxed(steps, context).await
    }

    fn execute_steps_boxed<'a>(
        &'a self,
        steps: &'a [StepDefinition],
        mut context: ExecutionContext,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            for step in steps {
                context = self.execute_boxed(step, context).await?;
            }
            Ok(context)
        })
    }

    fn execute_boxed<'a>(
        &'a self,
        step: &'a StepDefinition,
        context: ExecutionContext,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            let actual = step.config.kind();
            if step.kind != actual {
                return Err(StepError::KindMismatch {
                    step_id: step.id.clone(),
                    declared: step.kind,
                    actual,
                });
            }

            tracing::debug!(step_id = %step.id, kind = %step.kind, "executing step");

            match &step.config {
                StepConfig::Action {
                    action_type,
                    params,
                } => self.run_action(step, action_type, params, context).await,
                StepConfig::Condition {
                    expression,
                    then_steps,
                    else_steps,
                } => {
                    self.run_condition(step, expression, then_steps, else_steps, context)
                        .await
                }
                StepConfig::Loop {
                    items,
                    steps,
                    output_var,
                } => {
                    self.run_loop(step, items, steps, output_var.as_deref(), context)
                        .await
                }
                StepConfig::Parallel { branches } => self.run_parallel(step, branches, context).await,
            }
        })
    }

    async fn run_action(
        &self,
        step: &StepDefinition,
        action_type: &str,
        params: &ContextMap,
        mut context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        let inputs = resolve_inputs(&step.inputs, &context);
        let result = self
            .dispatcher
            .dispatch(action_type, &inputs, params)
            .await
            .map_err(|source| StepError::Action {
                step_id: step.id.clone(),
                source,
            })?;

        for (key, path) in &step.outputs {
            match lookup_path(&result, path) {
                Some(value) => {
                    context.insert(key.clone(), value.clone());
                }
                None => {
                    tracing::debug!(step_id = %step.id, output = %key, path = %path, "result field absent; binding skipped");
                }
            }
        }

        Ok(context)
    }

    async fn run_condition(
        &self,
        step: &StepDefinition,
        expression: &str,
        then_steps: &[StepDefinition],
        else_steps: &[StepDefinition],
        context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        if expression.trim().is_empty() {
            return Ok(context);
        }

        let branch_taken = match self.evaluator.evaluate_bool(expression, &context) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    step_id = %step.id,
                    expression,
                    error = %e,
                    "condition evaluation failed; taking else branch"
                );
                false
            }
        };

        let branch = if branch_taken { then_steps } else { else_steps };
        self.execute_steps_boxed(branch, context).await
    }

    async fn run_loop(
        &self,
        step: &StepDefinition,
        items: &ContextValue,
        steps: &[StepDefinition],
        output_var: Option<&str>,
        mut context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        let items = match resolve(items, &context) {
            Some(ContextValue::List(items)) => items,
            other => {
                tracing::debug!(
                    step_id = %step.id,
                    resolved = other.as_ref().map_or("undefined", |v| v.type_name()),
                    "loop items did not resolve to a list; skipping"
                );
                Vec::new()
            }
        };

        let mut iterations = Vec::with_capacity(items.len());
        for item in items {
            let mut iteration = context.clone();
            iteration.insert(LOOP_ITEM_KEY, item.clone());
            for nested in steps {
                iteration = self.execute_boxed(nested, iteration).await?;
                iteration.insert(LOOP_ITEM_KEY, item.clone());
            }
            iterations.push(iteration.to_value());
        }

        tracing::debug!(step_id = %step.id, iterations = iterations.len(), "loop finished");

        if let Some(var) = output_var {
            context.insert(var, ContextValue::List(iterations));
        }
        Ok(context)
    }

    async fn run_parallel(
        &self,
        step: &StepDefinition,
        branches: &[ParallelBranch],
        mut context: ExecutionContext,
    ) -> Result<ExecutionContext, StepError> {
        let snapshot = &context;
        let results = try_join_all(
            branches
                .iter()
                .map(|branch| self.execute_steps_boxed(&branch.steps, snapshot.clone())),
        )
        .await?;

        tracing::debug!(step_id = %step.id, branches = results.len(), "parallel branches joined");

        for (branch, result) in branches.iter().zip(results) {
            if let Some(var) = &branch.output_var {
                context.insert(var.clone(), result.to_value());
            }
        }
        Ok(context)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
