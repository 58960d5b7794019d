//! Workflow domain types for Flowline.
//!
//! `WorkflowDefinition` is the immutable template a user authors: a tree of
//! steps (actions, conditions, loops, parallel branches). `WorkflowRun` is a
//! single execution of a definition and the unit of audit.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ContextMap, ContextValue};

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A user-authored workflow template.
///
/// Never mutated by the engine; only explicit update calls change it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Owning user or tenant reference.
    pub owner_id: String,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Top-level steps, executed in order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Identifiers of the trigger sources that may start this workflow.
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

/// A definition as authored, before the service assigns identity and
/// timestamps. This is the shape of workflow files on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDefinition {
    /// Owner; may be left empty in files and supplied at registration.
    #[serde(default)]
    pub owner_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl NewDefinition {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            triggers: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_steps(mut self, steps: Vec<StepDefinition>) -> Self {
        self.steps = steps;
        self
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A node in the definition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step ID, unique within the whole definition tree.
    pub id: String,
    /// Display name.
    pub name: String,
    /// The kind of step. Must agree with the `config` variant.
    pub kind: StepKind,
    /// Kind-specific configuration.
    pub config: StepConfig,
    /// Local input name -> source expression (`$path` or literal).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, ContextValue>,
    /// Context key -> result field path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

/// The kind of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    Condition,
    Loop,
    Parallel,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Action => "action",
            StepKind::Condition => "condition",
            StepKind::Loop => "loop",
            StepKind::Parallel => "parallel",
        };
        f.write_str(s)
    }
}

/// Step-specific configuration, tagged by `kind`:
/// ```yaml
/// config:
///   kind: action
///   action_type: transform
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    /// Leaf work routed to an action handler.
    Action {
        /// One of `network`, `storage`, `messaging`, `transform`. Kept as a
        /// string so unknown types surface as a run failure, not a parse error.
        action_type: String,
        /// Handler-specific parameters.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: ContextMap,
    },
    /// If/else over a boolean expression.
    Condition {
        expression: String,
        #[serde(default, rename = "then", skip_serializing_if = "Vec::is_empty")]
        then_steps: Vec<StepDefinition>,
        #[serde(default, rename = "else", skip_serializing_if = "Vec::is_empty")]
        else_steps: Vec<StepDefinition>,
    },
    /// Sequential iteration over a resolved list.
    Loop {
        /// `$path` or literal list.
        items: ContextValue,
        #[serde(default)]
        steps: Vec<StepDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_var: Option<String>,
    },
    /// Concurrent branches joined all-or-nothing.
    Parallel { branches: Vec<ParallelBranch> },
}

impl StepConfig {
    /// The step kind this configuration belongs to.
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::Action { .. } => StepKind::Action,
            StepConfig::Condition { .. } => StepKind::Condition,
            StepConfig::Loop { .. } => StepKind::Loop,
            StepConfig::Parallel { .. } => StepKind::Parallel,
        }
    }
}

/// One independent branch of a parallel step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelBranch {
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Context key that receives the branch's final context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_var: Option<String>,
}

// ---------------------------------------------------------------------------
// Action types
// ---------------------------------------------------------------------------

/// The recognised action handler families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Network,
    Storage,
    Messaging,
    Transform,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Network,
        ActionType::Storage,
        ActionType::Messaging,
        ActionType::Transform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Network => "network",
            ActionType::Storage => "storage",
            ActionType::Messaging => "messaging",
            ActionType::Transform => "transform",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(ActionType::Network),
            "storage" => Ok(ActionType::Storage),
            "messaging" => Ok(ActionType::Messaging),
            "transform" => Ok(ActionType::Transform),
            other => Err(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    ///
    /// `pending -> running -> completed | failed`, plus `pending -> failed`
    /// for runs that could not begin.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// A single execution instance of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    /// ID of the definition being executed.
    pub workflow_id: Uuid,
    /// Name of the workflow (denormalized for display).
    pub workflow_name: String,
    pub status: RunStatus,
    /// How this run was started (e.g. "manual", "webhook", "schedule").
    pub trigger_type: String,
    /// Caller-supplied input the context started from.
    #[serde(default)]
    pub input: ContextMap,
    pub started_at: DateTime<Utc>,
    /// Set only on a terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Final context snapshot (completed runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ContextMap>,
    /// Error message (failed runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Partial update applied to a stored run. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ContextMap>,
    pub error: Option<String>,
}

impl RunUpdate {
    /// Apply this update to an in-memory run record.
    pub fn apply_to(&self, run: &mut WorkflowRun) {
        if let Some(status) = self.status {
            run.status = status;
        }
        if let Some(at) = self.completed_at {
            run.completed_at = Some(at);
        }
        if let Some(result) = &self.result {
            run.result = Some(result.clone());
        }
        if let Some(error) = &self.error {
            run.error = Some(error.clone());
        }
    }
}

/// Query filter for run lookups. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<RunStatus>,
    pub limit: Option<u32>,
}

impl RunFilter {
    pub fn for_workflow(workflow_id: Uuid) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a run satisfies the workflow and status criteria (limit aside).
    pub fn matches(&self, run: &WorkflowRun) -> bool {
        self.workflow_id.is_none_or(|id| run.workflow_id == id)
            && self.status.is_none_or(|s| run.status == s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
