//! Deploy command - build changed images, then deploy changed deployments

use super::Workspace;
use crate::build::{BuildOptions, BuiltImages};
use crate::cli::args::DeployArgs;
use crate::cluster::ClusterClient;
use crate::config::{Config, ConfigManager};
use crate::deploy::{Controller, DeployOptions};
use crate::error::DevcycleResult;
use crate::ui::{self, TaskSpinner};

/// Execute the deploy command
pub async fn execute(
    args: DeployArgs,
    manager: &ConfigManager,
    config: Config,
) -> DevcycleResult<()> {
    let mut workspace = Workspace::open(manager, config).await?;

    if workspace.config.deployments.is_empty() {
        ui::step_info(&workspace.ui, "No deployments configured");
        return Ok(());
    }

    let built_images = if args.skip_build {
        BuiltImages::new()
    } else {
        let options = BuildOptions {
            images: Vec::new(),
            force: args.force_build,
        };
        workspace.build_images(&options).await?
    };

    let factory = workspace.backends();
    let controller = Controller::new(&workspace.config, &factory);
    let options = DeployOptions {
        deployments: args.deployments,
        force_deploy: args.force_deploy,
        built_images,
    };

    let mut spinner = TaskSpinner::new(&workspace.ui);
    spinner.start(&format!(
        "Deploying to {}...",
        workspace.cluster.current_context()
    ));
    let results = match controller.deploy(&options, &mut workspace.cache).await {
        Ok(results) => results,
        Err(e) => {
            spinner.stop_error("Deployment failed");
            return Err(e);
        }
    };
    spinner.clear();

    for (name, deployed) in &results {
        if *deployed {
            ui::step_ok(&workspace.ui, &format!("Deployed {}", name));
        } else {
            ui::step_info(&workspace.ui, &format!("{} is up to date", name));
        }
    }

    Ok(())
}
