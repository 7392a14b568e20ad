//! Cache store persistence

use crate::error::{DevcycleError, DevcycleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Hashes of the inputs that produced the last build of an image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCache {
    /// Image repository name
    pub image_name: String,

    /// Tag of the last build; empty means never built
    pub tag: String,

    pub dockerfile_hash: String,
    pub image_config_hash: String,
    pub context_hash: String,
    pub entrypoint_hash: String,

    /// Kube context the last build was made for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_context: Option<String>,

    /// When the image was last built
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
}

impl ImageCache {
    /// Whether a build has ever completed for this image
    pub fn is_built(&self) -> bool {
        !self.tag.is_empty()
    }

    /// `name:tag` reference of the last build
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image_name, self.tag)
    }
}

/// Hashes and release revision of the last deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentCache {
    pub deployment_config_hash: String,
    pub helm_chart_hash: String,
    pub helm_overrides_hash: String,
    pub helm_release_revision: String,
    pub kubectl_manifests_hash: String,
}

/// Cluster context recorded at the last successful build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastContext {
    pub context: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub updated_at: DateTime<Utc>,
}

/// All cache records of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStore {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_context: Option<LastContext>,

    pub images: BTreeMap<String, ImageCache>,

    pub deployments: BTreeMap<String, DeploymentCache>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl CacheStore {
    /// An empty store that is never persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store from `path`; a missing file yields an empty store
    pub async fn load(path: &Path) -> DevcycleResult<Self> {
        if !path.exists() {
            debug!("No cache at {}, starting empty", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| DevcycleError::io(format!("reading cache file {}", path.display()), e))?;

        let mut store: CacheStore = serde_json::from_str(&content)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Persist the store (write to a sibling temp file, then rename)
    pub async fn save(&self) -> DevcycleResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DevcycleError::io("creating cache directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| DevcycleError::io(format!("writing cache file {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| DevcycleError::io(format!("replacing cache file {}", path.display()), e))?;

        debug!("Saved cache to {}", path.display());
        Ok(())
    }

    /// Get an image record without creating it
    pub fn image_cache(&self, name: &str) -> Option<&ImageCache> {
        self.images.get(name)
    }

    /// Get an image record, creating an empty one on first access
    pub fn image_cache_mut(&mut self, name: &str) -> &mut ImageCache {
        self.images.entry(name.to_string()).or_default()
    }

    /// Get a deployment record without creating it
    pub fn deployment_cache(&self, name: &str) -> Option<&DeploymentCache> {
        self.deployments.get(name)
    }

    /// Get a deployment record, creating an empty one on first access
    pub fn deployment_cache_mut(&mut self, name: &str) -> &mut DeploymentCache {
        self.deployments.entry(name.to_string()).or_default()
    }

    /// Drop a deployment record (purge)
    pub fn remove_deployment(&mut self, name: &str) -> Option<DeploymentCache> {
        self.deployments.remove(name)
    }

    /// Context recorded at the last successful build
    pub fn last_context(&self) -> Option<&LastContext> {
        self.last_context.as_ref()
    }

    /// Record the context a build just succeeded against
    pub fn set_last_context(&mut self, context: &str, namespace: Option<&str>) {
        self.last_context = Some(LastContext {
            context: context.to_string(),
            namespace: namespace.map(str::to_string),
            updated_at: Utc::now(),
        });
    }
}
