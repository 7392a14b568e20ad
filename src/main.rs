//! devcycle - incremental build and deploy cycles on Kubernetes
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use devcycle::cli::{commands, Cli, Commands};
use devcycle::config::ConfigManager;
use devcycle::error::{DevcycleError, DevcycleResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let result = tokio::select! {
        result = run() => result,
        _ = tokio::signal::ctrl_c() => Err(DevcycleError::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DevcycleResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("devcycle=warn"),
        1 => EnvFilter::new("devcycle=info"),
        _ => EnvFilter::new("devcycle=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cwd =
        std::env::current_dir().map_err(|e| DevcycleError::io("getting current directory", e))?;
    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(cwd.join(path)),
        None => ConfigManager::discover(&cwd)?,
    };

    let mut config = manager.load().await?;
    if let Some(context) = cli.context {
        config.cluster.context = Some(context);
    }
    if let Some(namespace) = cli.namespace {
        config.cluster.namespace = Some(namespace);
    }

    // Paths in the config are relative to the project directory
    let project_dir = manager.project_dir();
    debug!("Project directory: {}", project_dir.display());
    std::env::set_current_dir(&project_dir)
        .map_err(|e| DevcycleError::io(format!("entering {}", project_dir.display()), e))?;

    match cli.command {
        Commands::Build(args) => commands::build(args, &manager, config).await,
        Commands::Deploy(args) => commands::deploy(args, &manager, config).await,
        Commands::Render(args) => commands::render(args, &manager, config).await,
        Commands::Purge(args) => commands::purge(args, &manager, config).await,
        Commands::Status(args) => commands::status(args, &manager, config).await,
        Commands::Config(args) => commands::config(args, &manager, &config),
    }
}
