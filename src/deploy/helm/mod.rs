//! Chart deployment engine
//!
//! Values are merged in this order, later sources winning:
//!
//! 1. `values.yaml` bundled with a local chart
//! 2. `values_files`, in the order given (unreadable files are skipped with a warning)
//! 3. inline `values`
//! 4. image references rewritten to the latest build (unless `replace_image_tags = false`)
//!
//! A release is redeployed when forced, when the chart, the values files or
//! the deployment entry hash differently than at the last deploy, when an
//! image referenced by the values was built in this run, or when the live
//! release list no longer shows the release at the cached revision.

mod client;
mod merge;

pub use client::{ChartClient, HelmClient, Release};
pub use merge::{merge_values, read_values_file};

use super::images::ImageReplacer;
use super::{Deployer, StatusResult};
use crate::build::BuiltImages;
use crate::cache::CacheStore;
use crate::config::{DeploymentConfig, HelmConfig, ImageConfig};
use crate::error::{DevcycleError, DevcycleResult};
use crate::hash::{hash_path, hash_serialized, hash_string};
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Values file bundled with a chart
const CHART_VALUES_FILE: &str = "values.yaml";

struct InputHashes {
    chart: String,
    overrides: String,
    config: String,
}

/// Deploys one deployment entry as a chart release named after it
pub struct HelmDeployer {
    deployment: DeploymentConfig,
    helm: HelmConfig,
    namespace: Option<String>,
    images: BTreeMap<String, ImageConfig>,
    client: Arc<dyn ChartClient>,
}

impl HelmDeployer {
    pub fn new(
        deployment: DeploymentConfig,
        helm: HelmConfig,
        namespace: Option<String>,
        images: BTreeMap<String, ImageConfig>,
        client: Arc<dyn ChartClient>,
    ) -> Self {
        Self {
            deployment,
            helm,
            namespace,
            images,
            client,
        }
    }

    fn release(&self) -> &str {
        &self.deployment.name
    }

    fn input_hashes(&self) -> DevcycleResult<InputHashes> {
        let chart_path = Path::new(&self.helm.chart.name);
        let chart = if self.helm.is_local_chart() && chart_path.exists() {
            hash_path(chart_path)?
        } else {
            String::new()
        };

        let mut overrides = String::new();
        for file in &self.helm.values_files {
            if !file.exists() {
                warn!("Values file {} does not exist", file.display());
                continue;
            }
            overrides.push_str(&hash_path(file)?);
        }

        Ok(InputHashes {
            chart,
            overrides: hash_string(&overrides),
            config: hash_serialized(&self.deployment)?,
        })
    }

    /// Merge all value sources; the flag tells whether a freshly built image was substituted
    fn values(
        &self,
        cache: &CacheStore,
        built_images: &BuiltImages,
    ) -> DevcycleResult<(Mapping, bool)> {
        let mut values = Mapping::new();

        if self.helm.is_local_chart() {
            let bundled = Path::new(&self.helm.chart.name).join(CHART_VALUES_FILE);
            if bundled.exists() {
                values = read_values_file(&bundled)?;
            }
        }

        for file in &self.helm.values_files {
            match read_values_file(file) {
                Ok(overlay) => merge_values(&mut values, overlay),
                Err(e) => warn!("Skipping values file {}: {}", file.display(), e),
            }
        }

        if let Some(inline) = &self.helm.values {
            merge_values(&mut values, inline.clone());
        }

        if !self.helm.replace_image_tags {
            return Ok((values, false));
        }

        let replacer = ImageReplacer::new(&self.images, cache, built_images);
        let mut tree = Value::Mapping(values);
        let redeploy = replacer.replace(&mut tree, None);
        match tree {
            Value::Mapping(values) => Ok((values, redeploy)),
            _ => Err(DevcycleError::Internal("values lost their mapping shape".to_string())),
        }
    }
}

#[async_trait]
impl Deployer for HelmDeployer {
    async fn deploy(
        &self,
        cache: &mut CacheStore,
        force: bool,
        built_images: &BuiltImages,
    ) -> DevcycleResult<bool> {
        let name = self.release();
        let hashes = self.input_hashes()?;
        let cached = cache.deployment_cache(name).cloned().unwrap_or_default();

        let mut redeploy = force;
        if hashes.chart != cached.helm_chart_hash {
            debug!("Chart of {} changed", name);
            redeploy = true;
        }
        if hashes.overrides != cached.helm_overrides_hash {
            debug!("Values files of {} changed", name);
            redeploy = true;
        }
        if hashes.config != cached.deployment_config_hash {
            debug!("Deployment config of {} changed", name);
            redeploy = true;
        }

        let (values, images_changed) = self.values(cache, built_images)?;
        if images_changed {
            debug!("Values of {} reference an image built in this run", name);
            redeploy = true;
        }

        if !redeploy {
            let releases = self
                .client
                .list_releases(self.namespace.as_deref(), &self.helm)
                .await?;
            let in_sync = releases
                .iter()
                .any(|r| r.name == name && r.revision == cached.helm_release_revision);
            if !in_sync {
                let drift = DevcycleError::StateInconsistency {
                    deployment: name.to_string(),
                    cached: cached.helm_release_revision.clone(),
                    live: releases
                        .iter()
                        .find(|r| r.name == name)
                        .map(|r| r.revision.clone()),
                };
                info!("{}, redeploying", drift);
                redeploy = true;
            }
        }

        if !redeploy {
            info!("Skip deployment {}", name);
            return Ok(false);
        }

        info!("Deploying chart {} as release {}", self.helm.chart.name, name);
        let release = self
            .client
            .install_chart(name, self.namespace.as_deref(), &values, &self.helm)
            .await
            .map_err(|e| DevcycleError::ChartInstall {
                release: name.to_string(),
                reason: e.to_string(),
            })?;

        let record = cache.deployment_cache_mut(name);
        record.deployment_config_hash = hashes.config;
        record.helm_chart_hash = hashes.chart;
        record.helm_overrides_hash = hashes.overrides;
        record.helm_release_revision = release.revision;
        cache.save().await?;

        info!("Deployed release {}", name);
        Ok(true)
    }

    async fn delete(&self) -> DevcycleResult<()> {
        self.client
            .delete_release(self.release(), self.namespace.as_deref(), &self.helm)
            .await
    }

    async fn render(
        &self,
        cache: &CacheStore,
        built_images: &BuiltImages,
        out: &mut (dyn Write + Send),
    ) -> DevcycleResult<()> {
        let (values, _) = self.values(cache, built_images)?;
        let rendered = self
            .client
            .template(self.release(), self.namespace.as_deref(), &values, &self.helm)
            .await?;
        write!(out, "\n{}\n", rendered)
            .map_err(|e| DevcycleError::io("writing rendered chart", e))
    }

    async fn status(&self) -> DevcycleResult<StatusResult> {
        let chart = &self.helm.chart;
        let target = match (&chart.version, chart.name.is_empty()) {
            (_, true) => "N/A".to_string(),
            (Some(version), false) => format!("{} ({})", chart.name, version),
            (None, false) => chart.name.clone(),
        };

        let releases = self
            .client
            .list_releases(self.namespace.as_deref(), &self.helm)
            .await?;
        let status = match releases.iter().find(|r| r.name == self.release()) {
            None => "Not deployed".to_string(),
            Some(r) if r.status.eq_ignore_ascii_case("deployed") => "Deployed".to_string(),
            Some(r) => format!("Status:{}", r.status),
        };

        Ok(StatusResult {
            name: self.release().to_string(),
            kind: "Helm".to_string(),
            target,
            status,
        })
    }
}
