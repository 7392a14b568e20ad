//! Render command - print what a deploy would apply

use super::Workspace;
use crate::build::{BuildOptions, BuiltImages};
use crate::cli::args::RenderArgs;
use crate::config::{Config, ConfigManager};
use crate::deploy::{Controller, DeployOptions};
use crate::error::{DevcycleError, DevcycleResult};
use std::io::Write;

/// Execute the render command
pub async fn execute(
    args: RenderArgs,
    manager: &ConfigManager,
    config: Config,
) -> DevcycleResult<()> {
    let mut workspace = Workspace::open(manager, config).await?;

    let built_images = if args.build {
        workspace.build_images(&BuildOptions::default()).await?
    } else {
        BuiltImages::new()
    };

    let factory = workspace.backends();
    let controller = Controller::new(&workspace.config, &factory);
    let options = DeployOptions {
        deployments: args.deployments,
        built_images,
        ..Default::default()
    };

    let mut rendered = Vec::<u8>::new();
    controller
        .render(&options, &workspace.cache, &mut rendered)
        .await?;

    match args.output {
        Some(path) => tokio::fs::write(&path, &rendered)
            .await
            .map_err(|e| DevcycleError::io(format!("writing {}", path.display()), e))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&rendered)
                .and_then(|_| stdout.flush())
                .map_err(|e| DevcycleError::io("writing to stdout", e))?;
        }
    }

    Ok(())
}
