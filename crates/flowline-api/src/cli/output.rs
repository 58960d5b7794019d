//! Shared rendering helpers for CLI output.

use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use flowline_types::context::map_to_json;
use flowline_types::workflow::{RunStatus, WorkflowRun};

/// First eight characters of an id, for tables.
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn status_cell(status: RunStatus) -> Cell {
    match status {
        RunStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        RunStatus::Running => Cell::new("running").fg(Color::Blue),
        RunStatus::Completed => Cell::new("completed").fg(Color::Green),
        RunStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

fn styled_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style(status).yellow().to_string(),
        RunStatus::Running => style(status).blue().to_string(),
        RunStatus::Completed => style(status).green().to_string(),
        RunStatus::Failed => style(status).red().to_string(),
    }
}

pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON view of a run. Context maps render integral numbers as integers.
pub fn run_json(run: &WorkflowRun) -> serde_json::Value {
    serde_json::json!({
        "run_id": run.id.to_string(),
        "workflow_id": run.workflow_id.to_string(),
        "workflow_name": run.workflow_name,
        "status": run.status.as_str(),
        "trigger": run.trigger_type,
        "input": map_to_json(&run.input),
        "result": run.result.as_ref().map(map_to_json),
        "error": run.error,
        "started_at": run.started_at.to_rfc3339(),
        "completed_at": run.completed_at.map(|t| t.to_rfc3339()),
    })
}

/// Print one run in detail, including its final context.
pub fn print_run(run: &WorkflowRun, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&run_json(run));
    }

    println!();
    println!("  {} {}", style("Run").bold(), style(run.id).cyan());
    println!("  Workflow: {} ({})", style(&run.workflow_name).cyan(), run.workflow_id);
    println!("  Status: {}", styled_status(run.status));
    println!("  Trigger: {}", run.trigger_type);
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = run.completed_at {
        let elapsed = completed - run.started_at;
        println!(
            "  Completed: {} ({} ms)",
            completed.format("%Y-%m-%d %H:%M:%S"),
            elapsed.num_milliseconds()
        );
    }
    if let Some(ref err) = run.error {
        println!("  Error: {}", style(err).red());
    }
    if let Some(ref result) = run.result {
        println!();
        println!("  {}", style("Result context:").bold());
        let pretty = serde_json::to_string_pretty(&map_to_json(result))?;
        for line in pretty.lines() {
            println!("    {line}");
        }
    }
    println!();

    Ok(())
}

/// Print a list of runs as a table.
pub fn print_runs(title: &str, runs: &[WorkflowRun], json: bool) -> anyhow::Result<()> {
    if json {
        let out: Vec<_> = runs.iter().map(run_json).collect();
        return print_json(&serde_json::Value::Array(out));
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for workflow '{title}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Trigger"),
            Cell::new("Started"),
            Cell::new("Completed"),
            Cell::new("Error"),
        ]);

    for r in runs {
        let completed = r
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let error = r
            .error
            .as_deref()
            .map(|e| e.chars().take(60).collect::<String>())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            status_cell(r.status),
            Cell::new(&r.trigger_type),
            Cell::new(r.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(completed),
            Cell::new(error),
        ]);
    }

    println!();
    println!("  Runs for workflow '{}'", style(title).cyan());
    println!();
    println!("{table}");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowline_types::context::{ContextMap, ContextValue};
    use uuid::Uuid;

    #[test]
    fn run_json_renders_integral_numbers_as_integers() {
        let mut input = ContextMap::new();
        input.insert("seed".to_string(), ContextValue::Number(42.0));
        let run = WorkflowRun {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            workflow_name: "wf".to_string(),
            status: RunStatus::Failed,
            trigger_type: "manual".to_string(),
            input,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            result: None,
            error: Some("boom".to_string()),
        };

        let json = run_json(&run);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["input"]["seed"], serde_json::json!(42));
        assert!(json["result"].is_null());
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn short_id_takes_prefix() {
        let id = Uuid::parse_str("0195b3a0-1234-7000-8000-000000000000").unwrap();
        assert_eq!(short_id(&id), "0195b3a0");
    }
}
