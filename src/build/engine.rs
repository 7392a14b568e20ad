//! Container build engine abstraction
//!
//! The change-detector and the builder only need three things from an
//! engine: whether it is usable at all, which images exist locally, and a
//! way to build one. [`DockerEngine`] provides them by shelling out to the
//! docker CLI through the injected [`CommandExecutor`].

use crate::error::{DevcycleError, DevcycleResult};
use crate::exec::CommandExecutor;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Outcome of probing for a build engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineProbe {
    /// Engine answered
    Present,
    /// Engine binary is not installed
    NotInstalled,
    /// Engine is installed but failed to answer (daemon down, permissions, ...)
    Unusable(String),
}

/// Everything needed to build one image
#[derive(Debug, Clone)]
pub struct ImageBuildRequest<'a> {
    /// Repository name without tag
    pub image: &'a str,
    /// Tags to apply; the first one is recorded in the cache
    pub tags: &'a [String],
    pub dockerfile: &'a Path,
    pub context: &'a Path,
    pub build_args: &'a BTreeMap<String, String>,
    pub entrypoint: Option<&'a [String]>,
    pub cmd: Option<&'a [String]>,
}

/// Abstract container build engine
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Human-readable engine name for display
    fn name(&self) -> &'static str;

    /// Check whether the engine can be used
    async fn probe(&self) -> EngineProbe;

    /// List local images as `repository:tag`
    async fn list_images(&self) -> DevcycleResult<Vec<String>>;

    /// Build and tag an image
    async fn build(&self, request: &ImageBuildRequest<'_>) -> DevcycleResult<()>;
}

/// Docker CLI engine
pub struct DockerEngine {
    executor: Arc<dyn CommandExecutor>,
    path: String,
}

impl DockerEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            path: "docker".to_string(),
        }
    }

    /// Use a different docker binary
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    fn build_args(&self, request: &ImageBuildRequest<'_>, dockerfile: &Path) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        for tag in request.tags {
            args.push("-t".to_string());
            args.push(format!("{}:{}", request.image, tag));
        }
        args.push("-f".to_string());
        args.push(dockerfile.display().to_string());
        for (key, value) in request.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(request.context.display().to_string());
        args
    }
}

#[async_trait]
impl ImageEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn probe(&self) -> EngineProbe {
        let args = vec!["buildx".to_string(), "version".to_string()];
        match self.executor.run(&self.path, &args).await {
            Ok(_) => EngineProbe::Present,
            Err(DevcycleError::CommandFailed { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                EngineProbe::NotInstalled
            }
            Err(e) => EngineProbe::Unusable(e.to_string()),
        }
    }

    async fn list_images(&self) -> DevcycleResult<Vec<String>> {
        let args = vec![
            "images".to_string(),
            "--format".to_string(),
            "{{.Repository}}:{{.Tag}}".to_string(),
        ];
        let out = self.executor.run(&self.path, &args).await?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn build(&self, request: &ImageBuildRequest<'_>) -> DevcycleResult<()> {
        // Entrypoint/cmd overrides are appended to a temporary copy of the Dockerfile
        let patched = if request.entrypoint.is_some() || request.cmd.is_some() {
            let original = std::fs::read_to_string(request.dockerfile).map_err(|e| {
                DevcycleError::DockerfileMissing {
                    path: request.dockerfile.to_path_buf(),
                    source: e,
                }
            })?;
            let content = dockerfile_with_overrides(&original, request.entrypoint, request.cmd)?;
            let mut file = tempfile::Builder::new()
                .prefix("Dockerfile.")
                .tempfile()
                .map_err(DevcycleError::TempFile)?;
            file.write_all(content.as_bytes())
                .map_err(DevcycleError::TempFile)?;
            Some(file)
        } else {
            None
        };

        let dockerfile = patched
            .as_ref()
            .map(|f| f.path())
            .unwrap_or(request.dockerfile);
        let args = self.build_args(request, dockerfile);

        self.executor
            .command(&self.path, &args)
            .run(&[], &|line: String| debug!("[build] {}", line))
            .await
            .map_err(|e| DevcycleError::ImageBuild {
                image: request.image.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Append `ENTRYPOINT`/`CMD` instructions in exec form
fn dockerfile_with_overrides(
    original: &str,
    entrypoint: Option<&[String]>,
    cmd: Option<&[String]>,
) -> DevcycleResult<String> {
    let mut content = original.trim_end().to_string();
    content.push('\n');
    if let Some(entrypoint) = entrypoint {
        content.push_str(&format!("ENTRYPOINT {}\n", serde_json::to_string(entrypoint)?));
    }
    if let Some(cmd) = cmd {
        content.push_str(&format!("CMD {}\n", serde_json::to_string(cmd)?));
    }
    Ok(content)
}
