//! Error types for devcycle
//!
//! All modules use `DevcycleResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for devcycle operations
pub type DevcycleResult<T> = Result<T, DevcycleError>;

/// Batch operation a controller error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Render,
    Deploy,
    Purge,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Render => "render",
            Self::Deploy => "deploying",
            Self::Purge => "purging",
        };
        write!(f, "{}", name)
    }
}

/// All errors that can occur in devcycle
#[derive(Error, Debug)]
pub enum DevcycleError {
    // Configuration errors
    #[error("deployment {0} has no deployment method")]
    NoDeploymentMethod(String),

    #[error("deployment {0} declares both a helm and a kubectl deployment method")]
    ConflictingDeploymentMethods(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Unknown image config: {0}")]
    UnknownImage(String),

    #[error("Unknown deployment: {0}")]
    UnknownDeployment(String),

    // Build errors
    #[error("Dockerfile {path} missing: {source}")]
    DockerfileMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error hashing {path}: {reason}")]
    Hash { path: PathBuf, reason: String },

    #[error("Image build failed: {image}: {reason}")]
    ImageBuild { image: String, reason: String },

    // Deployment errors
    #[error("Unable to deploy helm chart for release {release}: {reason}")]
    ChartInstall { release: String, reason: String },

    #[error(
        "Release {deployment} is out of sync: cached revision {cached:?}, live revision {live:?}"
    )]
    StateInconsistency {
        deployment: String,
        cached: String,
        live: Option<String>,
    },

    #[error("error {op}: {source}")]
    Operation {
        op: Operation,
        #[source]
        source: Box<DevcycleError>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to create temporary file: {0}")]
    TempFile(#[source] std::io::Error),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error during '{command}': {stdout}{stderr}")]
    ExternalTool {
        command: String,
        stdout: String,
        stderr: String,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DevcycleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an error for a tool that ran but exited non-zero
    pub fn external_tool(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            command: command.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Wrap an error with the batch operation it aborted
    pub fn during(op: Operation, source: DevcycleError) -> Self {
        Self::Operation {
            op,
            source: Box::new(source),
        }
    }

    /// Whether the error comes from the configuration rather than the environment
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::NoDeploymentMethod(_)
            | Self::ConflictingDeploymentMethods(_)
            | Self::ConfigInvalid { .. }
            | Self::ConfigNotFound(_)
            | Self::UnknownImage(_)
            | Self::UnknownDeployment(_) => true,
            Self::Operation { source, .. } => source.is_config_error(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ChartInstall { release, .. } => Some(format!(
                "Run `devcycle purge -d {}` and `devcycle deploy` to recreate the chart",
                release
            )),
            Self::ConfigNotFound(_) => Some("Create a devcycle.toml in the project root".to_string()),
            Self::NoDeploymentMethod(_) => {
                Some("Add a [deployments.helm] or [deployments.kubectl] section".to_string())
            }
            Self::DockerfileMissing { .. } => {
                Some("Set `dockerfile` in the image config to an existing file".to_string())
            }
            Self::Operation { source, .. } => source.hint(),
            _ => None,
        }
    }
}
