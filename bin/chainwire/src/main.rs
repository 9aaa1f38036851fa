//! chainwire deploys a set of interdependent contracts and wires them together.

mod cli;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use chainwire_deploy::{OrchestrationError, ProjectConfig, RpcOrchestrator, records_table};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "chainwire", &mut std::io::stdout());
        return Ok(());
    }

    let config = ProjectConfig::load(&cli.config)?;
    let mut orchestrator = RpcOrchestrator::from_config(config, cli.network.as_deref())?;

    tracing::info!(
        config_path = %cli.config.display(),
        network = orchestrator.network_name(),
        "Loaded project"
    );

    if let Err(err) = execute(&mut orchestrator, cli.command).await {
        if let Some(failed) = err.target() {
            tracing::error!(failed = %failed, "Run aborted");
        }
        if let Some(receipt) = err.receipt() {
            eprintln!("Receipt of the failing transaction:");
            eprintln!("{}", serde_json::to_string_pretty(receipt)?);
        }
        return Err(err.into());
    }

    Ok(())
}

async fn execute(
    orchestrator: &mut RpcOrchestrator,
    command: Command,
) -> Result<(), OrchestrationError> {
    match command {
        Command::Deploy(args) => {
            let report = orchestrator.deploy(&args.tags, args.force).await?;
            print!("{}", report);
        }
        Command::Wire => {
            let report = orchestrator.wire().await?;
            print!("{}", report);
        }
        Command::Run(args) => {
            let report = orchestrator.run(&args.tags, args.force).await?;
            print!("{}", report);
        }
        Command::Plan(args) => {
            let plan = orchestrator.plan(&args.tags, args.force)?;
            print!("{}", plan);
        }
        Command::Status => {
            let records = orchestrator.records()?;
            if records.is_empty() {
                println!(
                    "No deployments recorded on network {}",
                    orchestrator.network_name()
                );
            } else {
                println!("{}", records_table(&records));
            }
        }
        Command::Completions { .. } => {}
    }

    Ok(())
}
