//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::DevcycleResult;

/// Execute the config command
pub fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> DevcycleResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
    }
    Ok(())
}

fn show_config(config: &Config) -> DevcycleResult<()> {
    let toml = toml::to_string_pretty(config)?;
    println!("{}", toml);
    Ok(())
}
