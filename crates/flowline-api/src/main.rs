//! Flowline CLI entry point.
//!
//! Binary name: `flowline`
//!
//! Parses CLI arguments, loads configuration, initializes the database and
//! engine, then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use flowline_observe::tracing_setup::{
    filter_for_verbosity, init_tracing, shutdown_tracing, TracingOptions,
};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowline", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(flowline_infra::config::data_dir);
    let config = flowline_infra::config::load_config(&data_dir).await;

    init_tracing(&TracingOptions {
        filter: filter_for_verbosity(cli.verbose),
        json: config.telemetry.json_logs,
        otel: config.telemetry.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli, &data_dir, &config).await;
    shutdown_tracing();
    result
}

async fn run(
    cli: Cli,
    data_dir: &std::path::Path,
    config: &flowline_types::config::FlowlineConfig,
) -> anyhow::Result<()> {
    let state = AppState::init(data_dir, config).await?;

    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.json).await
        }
        Commands::Run { action } => cli::run::handle_run_command(action, &state, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    }
}
