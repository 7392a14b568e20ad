//! Configuration schema for devcycle
//!
//! Configuration is stored at `devcycle.toml` in the project root.

use crate::error::{DevcycleError, DevcycleResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cluster targeting
    pub cluster: ClusterConfig,

    /// Images keyed by image config name
    pub images: BTreeMap<String, ImageConfig>,

    /// Deployments in declaration order
    pub deployments: Vec<DeploymentConfig>,
}

impl Config {
    /// Look up a deployment by name
    pub fn deployment(&self, name: &str) -> Option<&DeploymentConfig> {
        self.deployments.iter().find(|d| d.name == name)
    }

    /// Check cross-entry invariants not expressible in serde
    pub fn validate(&self) -> DevcycleResult<()> {
        let mut seen = std::collections::HashSet::new();
        for deployment in &self.deployments {
            if deployment.name.trim().is_empty() {
                return Err(DevcycleError::ConfigInvalid {
                    path: PathBuf::from("deployments"),
                    reason: "deployment without a name".to_string(),
                });
            }
            if !seen.insert(deployment.name.as_str()) {
                return Err(DevcycleError::ConfigInvalid {
                    path: PathBuf::from("deployments"),
                    reason: format!("duplicate deployment name '{}'", deployment.name),
                });
            }
        }

        for (name, image) in &self.images {
            if image.image.trim().is_empty() {
                return Err(DevcycleError::ConfigInvalid {
                    path: PathBuf::from(format!("images.{}", name)),
                    reason: "missing `image`".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Kube context to use instead of the current one
    pub context: Option<String>,

    /// Default namespace for deployments without their own
    pub namespace: Option<String>,

    /// Glob patterns for context names that point at a local cluster
    pub local_contexts: Vec<String>,

    /// Path to the kubectl binary
    pub kubectl_path: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            context: None,
            namespace: None,
            local_contexts: [
                "minikube",
                "docker-desktop",
                "docker-for-desktop",
                "kind-*",
                "k3d-*",
                "microk8s",
                "rancher-desktop",
                "orbstack",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            kubectl_path: "kubectl".to_string(),
        }
    }
}

/// Which inputs participate in the rebuild decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildStrategy {
    /// Always rebuild
    Always,
    /// Rebuild on Dockerfile, config, entrypoint or context changes
    #[default]
    Default,
    /// Like `Default` but never hash the build context
    IgnoreContextChanges,
}

/// Image build settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image repository name (e.g. "registry.example.com/team/api")
    pub image: String,

    /// Dockerfile path
    pub dockerfile: PathBuf,

    /// Build context directory
    pub context: PathBuf,

    /// Rebuild policy
    pub rebuild_strategy: RebuildStrategy,

    /// Entrypoint override
    pub entrypoint: Option<Vec<String>>,

    /// Cmd override
    pub cmd: Option<Vec<String>>,

    /// Build arguments
    pub build_args: BTreeMap<String, String>,

    /// Fixed tags; a random tag is generated when empty
    pub tags: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            dockerfile: PathBuf::from("./Dockerfile"),
            context: PathBuf::from("./"),
            rebuild_strategy: RebuildStrategy::Default,
            entrypoint: None,
            cmd: None,
            build_args: BTreeMap::new(),
            tags: Vec::new(),
        }
    }
}

/// A single deployment entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Deployment name, unique within the config
    pub name: String,

    /// Target namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Deploy with a helm chart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmConfig>,

    /// Deploy with kubectl manifests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubectl: Option<KubectlConfig>,
}

/// The backend a deployment uses
#[derive(Debug, Clone, Copy)]
pub enum DeploymentMethod<'a> {
    Helm(&'a HelmConfig),
    Kubectl(&'a KubectlConfig),
}

impl DeploymentConfig {
    /// Resolve the single backend this deployment declares
    pub fn method(&self) -> DevcycleResult<DeploymentMethod<'_>> {
        match (&self.helm, &self.kubectl) {
            (Some(helm), None) => Ok(DeploymentMethod::Helm(helm)),
            (None, Some(kubectl)) => Ok(DeploymentMethod::Kubectl(kubectl)),
            (None, None) => Err(DevcycleError::NoDeploymentMethod(self.name.clone())),
            (Some(_), Some(_)) => Err(DevcycleError::ConflictingDeploymentMethods(
                self.name.clone(),
            )),
        }
    }
}

/// Chart location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Local path or chart name in `repo`
    pub name: String,

    /// Chart version (remote charts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Chart repository URL; unset means `name` is a local path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Helm deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmConfig {
    pub chart: ChartConfig,

    /// Values files, later files override earlier ones
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<PathBuf>,

    /// Inline values, applied after the values files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_yaml::Mapping>,

    /// Rewrite image references to freshly built tags
    pub replace_image_tags: bool,

    /// Path to the helm binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Wait for resources to become ready
    pub wait: bool,

    /// Timeout in seconds for `--wait`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Extra arguments for `helm upgrade --install`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upgrade_args: Vec<String>,

    /// Extra arguments for `helm template`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_args: Vec<String>,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            chart: ChartConfig::default(),
            values_files: Vec::new(),
            values: None,
            replace_image_tags: true,
            path: None,
            wait: false,
            timeout: None,
            upgrade_args: Vec::new(),
            template_args: Vec::new(),
        }
    }
}

impl HelmConfig {
    /// Whether the chart lives on disk rather than in a repository
    pub fn is_local_chart(&self) -> bool {
        self.chart.repo.is_none()
    }
}

/// Kubectl deployment settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    /// Manifest files, directories or kustomize roots
    pub manifests: Vec<String>,

    /// Treat manifests as kustomize roots
    pub kustomize: bool,

    /// Extra arguments for `kubectl apply`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub apply_args: Vec<String>,

    /// Path to the kubectl binary for this deployment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_path: Option<String>,
}
