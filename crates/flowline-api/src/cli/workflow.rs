//! CLI workflow management subcommands.
//!
//! Provides create, list, show, export, enable/disable, delete, run and stats
//! operations for workflow definitions.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use flowline_core::service::workflow::DefinitionUpdate;
use flowline_core::workflow::definition::{
    load_definition_file, serialize_definition_yaml, WorkflowError,
};
use flowline_types::context::{map_from_json, ContextMap};
use flowline_types::event::WorkflowEvent;
use flowline_types::workflow::{RunStatus, StepDefinition};

use super::output::{print_json, print_run, print_runs, short_id};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow from a YAML or JSON file.
    Create {
        /// Path to the workflow file (.yaml, .yml or .json).
        file: PathBuf,

        /// Owner to record on the definition (overrides the file).
        #[arg(long)]
        owner: Option<String>,
    },

    /// List registered workflows.
    #[command(alias = "ls")]
    List {
        /// Only workflows belonging to this owner.
        #[arg(long)]
        owner: Option<String>,

        /// Only enabled workflows.
        #[arg(long)]
        enabled: bool,
    },

    /// Show a workflow definition and its step tree.
    Show {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Print a stored workflow as YAML.
    Export {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Enable a workflow.
    Enable {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Disable a workflow.
    Disable {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Delete a workflow definition. Its run history is kept.
    #[command(alias = "rm")]
    Delete {
        /// Workflow UUID.
        id: Uuid,
    },

    /// Start a run and wait for it to finish.
    Run {
        /// Workflow UUID.
        id: Uuid,

        /// Initial context as a JSON object.
        #[arg(long)]
        input: Option<String>,

        /// Print bus events while the run executes.
        #[arg(long)]
        events: bool,
    },

    /// Run counts and success rate for a workflow.
    Stats {
        /// Workflow UUID.
        id: Uuid,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file, owner } => {
            handle_create(&file, owner, state, json).await
        }
        WorkflowCommand::List { owner, enabled } => {
            handle_list(owner.as_deref(), enabled, state, json).await
        }
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Export { id } => handle_export(&id, state).await,
        WorkflowCommand::Enable { id } => handle_set_enabled(&id, true, state, json).await,
        WorkflowCommand::Disable { id } => handle_set_enabled(&id, false, state, json).await,
        WorkflowCommand::Delete { id } => handle_delete(&id, state, json).await,
        WorkflowCommand::Run { id, input, events } => {
            handle_run(&id, input.as_deref(), events, state, json).await
        }
        WorkflowCommand::Stats { id } => handle_stats(&id, state, json).await,
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(
    file: &Path,
    owner: Option<String>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let mut new = load_definition_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow::anyhow!("Failed to parse workflow file: {msg}"),
        WorkflowError::ValidationError(msg) => anyhow::anyhow!("Workflow validation failed: {msg}"),
        other => anyhow::anyhow!("Failed to load workflow: {other}"),
    })?;
    if let Some(owner) = owner {
        new.owner_id = owner;
    }

    let def = state
        .workflow_service
        .create_definition(new)
        .await
        .context("Failed to save workflow")?;

    if json {
        return print_json(&serde_json::json!({
            "id": def.id.to_string(),
            "name": def.name,
            "owner": def.owner_id,
            "steps": def.steps.len(),
            "triggers": def.triggers,
            "enabled": def.enabled,
        }));
    }

    println!();
    println!(
        "  {} Created workflow '{}'",
        style("*").green().bold(),
        style(&def.name).cyan()
    );
    println!("  ID: {}", def.id);
    println!("  Steps: {}", count_steps(&def.steps));
    if !def.owner_id.is_empty() {
        println!("  Owner: {}", def.owner_id);
    }
    println!();
    println!(
        "  Run it with: {}",
        style(format!("flowline workflow run {}", def.id)).dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List / show / export
// ---------------------------------------------------------------------------

async fn handle_list(
    owner: Option<&str>,
    enabled_only: bool,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let defs = if enabled_only {
        state.workflow_service.list_enabled(owner).await?
    } else {
        state.workflow_service.list_definitions(owner).await?
    };

    if json {
        let out: Vec<_> = defs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id.to_string(),
                    "name": d.name,
                    "owner": d.owner_id,
                    "enabled": d.enabled,
                    "steps": count_steps(&d.steps),
                    "updated_at": d.updated_at.to_rfc3339(),
                })
            })
            .collect();
        return print_json(&serde_json::Value::Array(out));
    }

    if defs.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Create one with: {}",
            style("flowline workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Owner"),
            Cell::new("Steps"),
            Cell::new("Enabled"),
        ]);

    for d in &defs {
        let enabled = if d.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(d.id),
            Cell::new(if d.owner_id.is_empty() { "-" } else { d.owner_id.as_str() }),
            Cell::new(count_steps(&d.steps)),
            enabled,
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_show(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let def = state.workflow_service.get_definition(id).await?;

    if json {
        return print_json(&serde_json::to_value(&def)?);
    }

    println!();
    println!("  {} {}", style("Workflow").bold(), style(&def.name).cyan());
    println!("  ID: {}", def.id);
    if let Some(ref description) = def.description {
        println!("  Description: {description}");
    }
    if !def.owner_id.is_empty() {
        println!("  Owner: {}", def.owner_id);
    }
    println!("  Enabled: {}", if def.enabled { "yes" } else { "no" });
    if !def.triggers.is_empty() {
        println!("  Triggers: {}", def.triggers.join(", "));
    }
    println!("  Updated: {}", def.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("  {}", style("Steps:").bold());
    let mut lines = Vec::new();
    step_tree(&def.steps, 2, &mut lines);
    for line in lines {
        println!("{line}");
    }
    println!();

    Ok(())
}

async fn handle_export(id: &Uuid, state: &AppState) -> Result<()> {
    let def = state.workflow_service.get_definition(id).await?;
    print!("{}", serialize_definition_yaml(&def)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Enable / disable / delete
// ---------------------------------------------------------------------------

async fn handle_set_enabled(id: &Uuid, enabled: bool, state: &AppState, json: bool) -> Result<()> {
    let def = state
        .workflow_service
        .update_definition(
            id,
            DefinitionUpdate {
                enabled: Some(enabled),
                ..DefinitionUpdate::default()
            },
        )
        .await?;

    if json {
        return print_json(&serde_json::json!({
            "id": def.id.to_string(),
            "enabled": def.enabled,
        }));
    }

    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!();
    println!(
        "  {} {verb} workflow '{}'",
        style("*").green().bold(),
        style(&def.name).cyan()
    );
    println!();
    Ok(())
}

async fn handle_delete(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    state.workflow_service.delete_definition(id).await?;

    if json {
        return print_json(&serde_json::json!({ "id": id.to_string(), "deleted": true }));
    }

    println!();
    println!("  {} Deleted workflow {}", style("*").green().bold(), id);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

fn parse_input(raw: Option<&str>) -> Result<ContextMap> {
    let Some(raw) = raw else {
        return Ok(ContextMap::new());
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| "Invalid JSON input")?;
    match map_from_json(value) {
        Some(map) => Ok(map),
        None => bail!("Run input must be a JSON object"),
    }
}

fn describe_event(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::RunStarted {
            workflow_name,
            trigger_type,
            ..
        } => format!("run started: {workflow_name} ({trigger_type})"),
        WorkflowEvent::RunCompleted { duration_ms, .. } => {
            format!("run completed in {duration_ms} ms")
        }
        WorkflowEvent::RunFailed { error, .. } => format!("run failed: {error}"),
        WorkflowEvent::MessageSent {
            channel, payload, ..
        } => format!("message on '{channel}': {} field(s)", payload.len()),
    }
}

async fn handle_run(
    id: &Uuid,
    input: Option<&str>,
    show_events: bool,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let input = parse_input(input)?;

    // Subscribe before starting so no event is missed.
    let mut events = state.event_bus.subscribe();
    let handle = state.orchestrator.start(*id, input).await?;
    let run_id = handle.run_id();

    let printer = show_events.then(|| {
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if event.run_id().is_some_and(|r| r != run_id) {
                    continue;
                }
                if json {
                    if let Ok(text) = serde_json::to_string(&event) {
                        eprintln!("{text}");
                    }
                } else {
                    eprintln!("  {} {}", style(">").dim(), describe_event(&event));
                }
            }
        })
    });

    let run = handle.wait().await?;
    if let Some(printer) = printer {
        printer.abort();
    }

    print_run(&run, json)?;
    if run.status == RunStatus::Failed && !json {
        bail!("run {} failed", short_id(&run.id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

async fn handle_stats(id: &Uuid, state: &AppState, json: bool) -> Result<()> {
    let def = state.workflow_service.get_definition(id).await?;
    let stats = state.workflow_service.run_stats(id).await?;

    if json {
        return print_json(&serde_json::to_value(&stats)?);
    }

    println!();
    println!("  {} {}", style("Stats for").bold(), style(&def.name).cyan());
    println!("  Total runs: {}", stats.total);
    println!("  Completed: {}", style(stats.completed).green());
    println!("  Failed: {}", style(stats.failed).red());
    println!("  In progress: {}", stats.running);
    println!("  Success rate: {}%", stats.success_rate);

    let failed = state.workflow_service.failed_runs(id).await?;
    if !failed.is_empty() {
        print_runs(&def.name, &failed[..failed.len().min(5)], false)?;
    } else {
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Total number of steps including nested ones.
fn count_steps(steps: &[StepDefinition]) -> usize {
    use flowline_types::workflow::StepConfig;

    steps
        .iter()
        .map(|step| {
            1 + match &step.config {
                StepConfig::Action { .. } => 0,
                StepConfig::Condition {
                    then_steps,
                    else_steps,
                    ..
                } => count_steps(then_steps) + count_steps(else_steps),
                StepConfig::Loop { steps, .. } => count_steps(steps),
                StepConfig::Parallel { branches } => {
                    branches.iter().map(|b| count_steps(&b.steps)).sum()
                }
            }
        })
        .sum()
}

/// Indented one-line-per-step rendering of a step tree.
fn step_tree(steps: &[StepDefinition], indent: usize, out: &mut Vec<String>) {
    use flowline_types::workflow::StepConfig;

    let pad = " ".repeat(indent);
    for step in steps {
        match &step.config {
            StepConfig::Action { action_type, .. } => {
                out.push(format!("{pad}- {} [{}: {action_type}]", step.id, step.kind));
            }
            StepConfig::Condition {
                expression,
                then_steps,
                else_steps,
            } => {
                out.push(format!("{pad}- {} [condition: {expression}]", step.id));
                if !then_steps.is_empty() {
                    out.push(format!("{pad}  then:"));
                    step_tree(then_steps, indent + 4, out);
                }
                if !else_steps.is_empty() {
                    out.push(format!("{pad}  else:"));
                    step_tree(else_steps, indent + 4, out);
                }
            }
            StepConfig::Loop { steps, .. } => {
                out.push(format!("{pad}- {} [loop]", step.id));
                step_tree(steps, indent + 4, out);
            }
            StepConfig::Parallel { branches } => {
                out.push(format!("{pad}- {} [parallel x{}]", step.id, branches.len()));
                for (i, branch) in branches.iter().enumerate() {
                    let target = branch.output_var.as_deref().unwrap_or("-");
                    out.push(format!("{pad}  branch {i} -> {target}:"));
                    step_tree(&branch.steps, indent + 4, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::workflow::definition::parse_definition_yaml;
    use flowline_types::context::ContextValue;

    const NESTED: &str = r#"
name: nested
steps:
  - id: check
    name: Check
    kind: condition
    config:
      kind: condition
      expression: "flag == true"
      then:
        - id: each
          name: Each
          kind: loop
          config:
            kind: loop
            items: "$list"
            steps:
              - id: t
                name: T
                kind: action
                config:
                  kind: action
                  action_type: transform
      else:
        - id: fan
          name: Fan
          kind: parallel
          config:
            kind: parallel
            branches:
              - output_var: a
                steps:
                  - id: m
                    name: M
                    kind: action
                    config:
                      kind: action
                      action_type: messaging
"#;

    #[test]
    fn count_steps_includes_nested() {
        let def = parse_definition_yaml(NESTED).unwrap();
        assert_eq!(count_steps(&def.steps), 5);
    }

    #[test]
    fn step_tree_renders_branches() {
        let def = parse_definition_yaml(NESTED).unwrap();
        let mut lines = Vec::new();
        step_tree(&def.steps, 0, &mut lines);
        assert_eq!(lines[0], "- check [condition: flag == true]");
        assert!(lines.iter().any(|l| l.contains("- t [action: transform]")));
        assert!(lines.iter().any(|l| l.contains("branch 0 -> a:")));
    }

    #[test]
    fn parse_input_requires_object() {
        assert!(parse_input(None).unwrap().is_empty());
        let map = parse_input(Some(r#"{"seed": 42}"#)).unwrap();
        assert_eq!(map["seed"], ContextValue::Number(42.0));
        assert!(parse_input(Some("[1, 2]")).is_err());
        assert!(parse_input(Some("{not json")).is_err());
    }

    #[test]
    fn describe_event_summarises() {
        let event = WorkflowEvent::RunFailed {
            run_id: Uuid::nil(),
            workflow_name: "wf".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(describe_event(&event), "run failed: boom");
    }
}
