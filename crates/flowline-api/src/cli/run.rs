//! CLI run inspection subcommands.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use uuid::Uuid;

use flowline_types::workflow::RunStatus;

use super::output::{print_run, print_runs};
use crate::state::AppState;

/// Run inspection subcommands.
#[derive(Subcommand)]
pub enum RunCommand {
    /// Show one run with its final context.
    Show {
        /// Run UUID.
        run_id: Uuid,
    },

    /// List recent runs of a workflow, newest first.
    #[command(alias = "ls")]
    List {
        /// Workflow UUID.
        workflow_id: Uuid,

        /// Maximum number of runs to display (defaults to the configured history limit).
        #[arg(long)]
        limit: Option<u32>,

        /// Only runs with this status (pending, running, completed, failed).
        #[arg(long)]
        status: Option<String>,
    },
}

/// Handle a run subcommand.
pub async fn handle_run_command(cmd: RunCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        RunCommand::Show { run_id } => {
            let run = state
                .workflow_service
                .get_run(&run_id)
                .await?
                .ok_or_else(|| anyhow!("Run '{run_id}' not found"))?;
            print_run(&run, json)
        }
        RunCommand::List {
            workflow_id,
            limit,
            status,
        } => {
            let def = state.workflow_service.get_definition(&workflow_id).await?;
            let status = status
                .as_deref()
                .map(str::parse::<RunStatus>)
                .transpose()
                .map_err(|s| anyhow!("Unknown run status '{s}'"))?;

            let runs = state
                .workflow_service
                .find_runs(&workflow_id, status, limit)
                .await?;
            print_runs(&def.name, &runs, json)
        }
    }
}
