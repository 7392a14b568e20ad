//! Deployments
//!
//! Each deployment entry declares exactly one backend. The [`Controller`]
//! asks a [`DeployerFactory`] for the matching [`Deployer`] and drives it
//! through render, deploy, purge and status.
//!
//! | Backend | Deployer | External tool |
//! |---------|----------|---------------|
//! | `helm` | [`helm::HelmDeployer`] | `helm` |
//! | `kubectl` | [`kubectl::KubectlDeployer`] | `kubectl` |

pub mod controller;
pub mod helm;
pub mod images;
pub mod kubectl;

pub use controller::{Controller, DeployOptions};

use crate::build::BuiltImages;
use crate::cache::CacheStore;
use crate::cluster::ClusterClient;
use crate::config::{Config, DeploymentConfig, DeploymentMethod};
use crate::error::DevcycleResult;
use crate::exec::CommandExecutor;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;

/// Status row of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResult {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub status: String,
}

/// A deployment backend bound to one deployment entry
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploy if anything changed (or `force`); returns whether it deployed
    ///
    /// The deployment's cache record is updated only after the backend
    /// confirmed success.
    async fn deploy(
        &self,
        cache: &mut CacheStore,
        force: bool,
        built_images: &BuiltImages,
    ) -> DevcycleResult<bool>;

    /// Remove everything the deployment created
    async fn delete(&self) -> DevcycleResult<()>;

    /// Write what would be deployed to `out`
    async fn render(
        &self,
        cache: &CacheStore,
        built_images: &BuiltImages,
        out: &mut (dyn Write + Send),
    ) -> DevcycleResult<()>;

    /// Describe the deployment
    async fn status(&self) -> DevcycleResult<StatusResult>;
}

/// Creates the deployer for a deployment entry
pub trait DeployerFactory: Send + Sync {
    /// Fails when the entry declares no backend (or both)
    fn create(&self, deployment: &DeploymentConfig) -> DevcycleResult<Box<dyn Deployer>>;
}

/// Factory for the built-in helm and kubectl backends
pub struct BackendFactory {
    config: Arc<Config>,
    executor: Arc<dyn CommandExecutor>,
    context: String,
    namespace: Option<String>,
}

impl BackendFactory {
    pub fn new(
        config: Arc<Config>,
        executor: Arc<dyn CommandExecutor>,
        cluster: &dyn ClusterClient,
    ) -> Self {
        Self {
            config,
            executor,
            context: cluster.current_context().to_string(),
            namespace: cluster.namespace().map(str::to_string),
        }
    }
}

impl DeployerFactory for BackendFactory {
    fn create(&self, deployment: &DeploymentConfig) -> DevcycleResult<Box<dyn Deployer>> {
        let namespace = deployment
            .namespace
            .clone()
            .or_else(|| self.namespace.clone());

        let deployer: Box<dyn Deployer> = match deployment.method()? {
            DeploymentMethod::Helm(helm) => {
                let client = helm::HelmClient::new(
                    self.executor.clone(),
                    helm.path.clone(),
                    Some(self.context.clone()),
                );
                Box::new(helm::HelmDeployer::new(
                    deployment.clone(),
                    helm.clone(),
                    namespace,
                    self.config.images.clone(),
                    Arc::new(client),
                ))
            }
            DeploymentMethod::Kubectl(kubectl) => Box::new(kubectl::KubectlDeployer::new(
                deployment.clone(),
                kubectl.clone(),
                Some(self.context.clone()),
                namespace,
                self.config.cluster.kubectl_path.clone(),
                self.config.images.clone(),
                self.executor.clone(),
            )),
        };
        Ok(deployer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HelmConfig, KubectlConfig};
    use crate::error::DevcycleError;
    use crate::testing::{FakeCluster, ScriptedExecutor};

    fn factory() -> BackendFactory {
        BackendFactory::new(
            Arc::new(Config::default()),
            Arc::new(ScriptedExecutor::new()),
            &FakeCluster::new("minikube"),
        )
    }

    #[test]
    fn factory_rejects_entry_without_backend() {
        let deployment = DeploymentConfig {
            name: "web".to_string(),
            ..Default::default()
        };
        let err = factory().create(&deployment).err().unwrap();
        assert_eq!(err.to_string(), "deployment web has no deployment method");
    }

    #[test]
    fn factory_rejects_entry_with_both_backends() {
        let deployment = DeploymentConfig {
            name: "web".to_string(),
            helm: Some(HelmConfig::default()),
            kubectl: Some(KubectlConfig::default()),
            ..Default::default()
        };
        let err = factory().create(&deployment).err().unwrap();
        assert!(matches!(err, DevcycleError::ConflictingDeploymentMethods(_)));
    }

    #[test]
    fn status_serializes_kind_as_type() {
        let status = StatusResult {
            name: "web".to_string(),
            kind: "Manifests".to_string(),
            target: "k8s".to_string(),
            status: "N/A".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "Manifests");
    }
}
