//! Purge command - remove deployments from the cluster

use super::Workspace;
use crate::cli::args::PurgeArgs;
use crate::config::{Config, ConfigManager};
use crate::deploy::Controller;
use crate::error::DevcycleResult;
use crate::ui::{self, TaskSpinner};

/// Execute the purge command
pub async fn execute(args: PurgeArgs, manager: &ConfigManager, config: Config) -> DevcycleResult<()> {
    let mut workspace = Workspace::open(manager, config).await?;

    let factory = workspace.backends();
    let controller = Controller::new(&workspace.config, &factory);

    let mut spinner = TaskSpinner::new(&workspace.ui);
    spinner.start("Purging deployments...");
    let purged = match controller.purge(&args.deployments, &mut workspace.cache).await {
        Ok(purged) => purged,
        Err(e) => {
            spinner.stop_error("Purge failed");
            return Err(e);
        }
    };
    spinner.clear();

    if purged.is_empty() {
        ui::step_info(&workspace.ui, "Nothing to purge");
    }
    for name in &purged {
        ui::step_ok(&workspace.ui, &format!("Purged {}", name));
    }

    Ok(())
}
