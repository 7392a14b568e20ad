//! Deployment controller
//!
//! Drives the configured deployments in declaration order. Every deployer of
//! a run is created up front, so a deployment without a usable backend fails
//! the whole run before any external tool is invoked. The first failing
//! deployment stops the run.

use super::{Deployer, DeployerFactory, StatusResult};
use crate::build::BuiltImages;
use crate::cache::CacheStore;
use crate::config::{Config, DeploymentConfig};
use crate::error::{DevcycleError, DevcycleResult, Operation};
use std::io::Write;
use tracing::{info, info_span, warn, Instrument};

/// Options for render and deploy runs
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Deployment names to process; empty means all
    pub deployments: Vec<String>,
    /// Deploy even if nothing changed
    pub force_deploy: bool,
    /// Tags built earlier in this run
    pub built_images: BuiltImages,
}

/// Runs render, deploy, purge and status across deployments
pub struct Controller<'a> {
    config: &'a Config,
    factory: &'a dyn DeployerFactory,
}

impl<'a> Controller<'a> {
    pub fn new(config: &'a Config, factory: &'a dyn DeployerFactory) -> Self {
        Self { config, factory }
    }

    /// Deployments passing the allow-list, each with its deployer
    fn deployers(
        &self,
        allow: &[String],
    ) -> DevcycleResult<Vec<(&'a DeploymentConfig, Box<dyn Deployer>)>> {
        for name in allow {
            if self.config.deployment(name).is_none() {
                warn!("No deployment named {}", name);
            }
        }

        self.config
            .deployments
            .iter()
            .filter(|d| allow.is_empty() || allow.contains(&d.name))
            .map(|d| Ok((d, self.factory.create(d)?)))
            .collect()
    }

    /// Write the rendered output of every selected deployment to `out`
    pub async fn render(
        &self,
        options: &DeployOptions,
        cache: &CacheStore,
        out: &mut (dyn Write + Send),
    ) -> DevcycleResult<()> {
        let during = |e: DevcycleError| DevcycleError::during(Operation::Render, e);

        for (deployment, deployer) in self.deployers(&options.deployments).map_err(during)? {
            let span = info_span!("deployment", name = %deployment.name);
            deployer
                .render(cache, &options.built_images, out)
                .instrument(span)
                .await
                .map_err(during)?;
        }
        Ok(())
    }

    /// Deploy every selected deployment that needs it
    ///
    /// Returns `(name, deployed)` in declaration order.
    pub async fn deploy(
        &self,
        options: &DeployOptions,
        cache: &mut CacheStore,
    ) -> DevcycleResult<Vec<(String, bool)>> {
        let during = |e: DevcycleError| DevcycleError::during(Operation::Deploy, e);

        let mut results = Vec::new();
        for (deployment, deployer) in self.deployers(&options.deployments).map_err(during)? {
            let span = info_span!("deployment", name = %deployment.name);
            let deployed = deployer
                .deploy(cache, options.force_deploy, &options.built_images)
                .instrument(span)
                .await
                .map_err(during)?;
            results.push((deployment.name.clone(), deployed));
        }

        let count = results.iter().filter(|(_, deployed)| *deployed).count();
        info!("Deployed {} of {} deployments", count, results.len());
        Ok(results)
    }

    /// Delete the given deployments (all when empty) and drop their cache records
    pub async fn purge(
        &self,
        names: &[String],
        cache: &mut CacheStore,
    ) -> DevcycleResult<Vec<String>> {
        let during = |e: DevcycleError| DevcycleError::during(Operation::Purge, e);

        let mut purged = Vec::new();
        for (deployment, deployer) in self.deployers(names).map_err(during)? {
            let span = info_span!("deployment", name = %deployment.name);
            deployer.delete().instrument(span).await.map_err(during)?;

            cache.remove_deployment(&deployment.name);
            cache.save().await.map_err(during)?;
            info!("Purged {}", deployment.name);
            purged.push(deployment.name.clone());
        }
        Ok(purged)
    }

    /// Status of the given deployments (all when empty)
    pub async fn status(&self, names: &[String]) -> DevcycleResult<Vec<StatusResult>> {
        let mut results = Vec::new();
        for (_, deployer) in self.deployers(names)? {
            results.push(deployer.status().await?);
        }
        Ok(results)
    }
}
