//! Status command - show the state of each deployment

use super::Workspace;
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cluster::ClusterClient;
use crate::config::{Config, ConfigManager};
use crate::deploy::{Controller, StatusResult};
use crate::error::DevcycleResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the status command
pub async fn execute(args: StatusArgs, manager: &ConfigManager, config: Config) -> DevcycleResult<()> {
    let workspace = Workspace::open(manager, config).await?;

    let factory = workspace.backends();
    let controller = Controller::new(&workspace.config, &factory);
    let results = controller.status(&args.deployments).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Table => {
            if results.is_empty() {
                ui::step_info(&workspace.ui, "No deployments configured");
                return Ok(());
            }
            ui::intro(
                &workspace.ui,
                &format!("Deployments on {}", workspace.cluster.current_context()),
            );
            print_table(&workspace.ui, &results);
        }
    }

    Ok(())
}

fn print_table(ctx: &UiContext, results: &[StatusResult]) {
    println!(
        "{:<20} {:<8} {:<24} {:<20}",
        style("NAME").bold(),
        style("TYPE").bold(),
        style("TARGET").bold(),
        style("STATUS").bold()
    );
    println!("{}", "-".repeat(72));

    for result in results {
        let status = match result.status.as_str() {
            "Deployed" => style(result.status.as_str()).green(),
            "Not deployed" => style(result.status.as_str()).dim(),
            _ => style(result.status.as_str()).yellow(),
        };
        println!(
            "{:<20} {:<8} {:<24} {:<20}",
            result.name, result.kind, result.target, status
        );
    }

    println!();
    ui::remark(ctx, &format!("{} deployment(s)", results.len()));
}
