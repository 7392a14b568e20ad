//! Configuration management for devcycle

pub mod schema;

pub use schema::{
    ChartConfig, ClusterConfig, Config, DeploymentConfig, DeploymentMethod, HelmConfig,
    ImageConfig, KubectlConfig, RebuildStrategy,
};

use crate::error::{DevcycleError, DevcycleResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "devcycle.toml";

/// Directory (next to the config file) holding generated state
pub const STATE_DIR_NAME: &str = ".devcycle";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Locate `devcycle.toml` in `start` or one of its ancestors
    pub fn discover(start: &Path) -> DevcycleResult<Self> {
        let mut current = Some(start);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                debug!("Found config: {}", candidate.display());
                return Ok(Self::with_path(candidate));
            }
            current = dir.parent();
        }
        Err(DevcycleError::ConfigNotFound(start.join(CONFIG_FILE_NAME)))
    }

    /// Load and validate the configuration
    pub async fn load(&self) -> DevcycleResult<Config> {
        if !self.config_path.exists() {
            return Err(DevcycleError::ConfigNotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            DevcycleError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|e| DevcycleError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: e.to_string(),
            })?;

        config.validate().map_err(|e| match e {
            DevcycleError::ConfigInvalid { path, reason } => DevcycleError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })?;

        Ok(config)
    }

    /// Directory containing the config file; relative paths resolve against it
    pub fn project_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Path of the persisted cache store
    pub fn cache_path(&self) -> PathBuf {
        self.project_dir().join(STATE_DIR_NAME).join("cache.json")
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
