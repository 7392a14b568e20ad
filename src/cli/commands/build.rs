//! Build command - build images whose inputs changed

use super::Workspace;
use crate::build::BuildOptions;
use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::DevcycleResult;
use crate::ui;

/// Execute the build command
pub async fn execute(args: BuildArgs, manager: &ConfigManager, config: Config) -> DevcycleResult<()> {
    let mut workspace = Workspace::open(manager, config).await?;

    if workspace.config.images.is_empty() {
        ui::step_info(&workspace.ui, "No images configured");
        return Ok(());
    }

    let options = BuildOptions {
        images: args.images,
        force: args.force,
    };
    let built = workspace.build_images(&options).await?;

    for (name, tag) in &built {
        let image = &workspace.config.images[name].image;
        ui::step_ok_detail(&workspace.ui, name, &format!("{}:{}", image, tag));
    }

    Ok(())
}
