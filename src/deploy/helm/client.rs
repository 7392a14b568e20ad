//! Chart tool client

use crate::config::HelmConfig;
use crate::error::{DevcycleError, DevcycleResult};
use crate::exec::CommandExecutor;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// An installed release as reported by the chart tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    #[serde(deserialize_with = "string_or_number")]
    pub revision: String,
    pub status: String,
    pub chart: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Operations on chart releases
#[async_trait]
pub trait ChartClient: Send + Sync {
    /// All releases in `namespace`, in any state
    async fn list_releases(
        &self,
        namespace: Option<&str>,
        helm: &HelmConfig,
    ) -> DevcycleResult<Vec<Release>>;

    /// Render the chart with `values` without touching the cluster
    async fn template(
        &self,
        release: &str,
        namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        helm: &HelmConfig,
    ) -> DevcycleResult<String>;

    /// Install or upgrade `release`, returning the resulting release
    async fn install_chart(
        &self,
        release: &str,
        namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        helm: &HelmConfig,
    ) -> DevcycleResult<Release>;

    /// Uninstall `release`; a missing release is not an error
    async fn delete_release(
        &self,
        release: &str,
        namespace: Option<&str>,
        helm: &HelmConfig,
    ) -> DevcycleResult<()>;
}

/// Release object printed by `helm upgrade --output json`
#[derive(Debug, Deserialize)]
struct UpgradeOutput {
    name: String,
    #[serde(default)]
    namespace: String,
    version: u64,
    #[serde(default)]
    info: UpgradeInfo,
    #[serde(default)]
    chart: UpgradeChart,
}

#[derive(Debug, Default, Deserialize)]
struct UpgradeInfo {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct UpgradeChart {
    #[serde(default)]
    metadata: ChartMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

/// Chart client driving the helm CLI
pub struct HelmClient {
    executor: Arc<dyn CommandExecutor>,
    path: String,
    kube_context: Option<String>,
}

impl HelmClient {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        path: Option<String>,
        kube_context: Option<String>,
    ) -> Self {
        Self {
            executor,
            path: path.unwrap_or_else(|| "helm".to_string()),
            kube_context,
        }
    }

    fn target_args(&self, namespace: Option<&str>, args: &mut Vec<String>) {
        if let Some(namespace) = namespace {
            args.push("--namespace".to_string());
            args.push(namespace.to_string());
        }
        if let Some(context) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.clone());
        }
    }

    fn chart_args(helm: &HelmConfig, args: &mut Vec<String>) {
        if let Some(repo) = &helm.chart.repo {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        if let Some(version) = &helm.chart.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
    }

    /// Write values to a temp file handed to `--values`
    fn values_file(values: &serde_yaml::Mapping) -> DevcycleResult<NamedTempFile> {
        let content = serde_yaml::to_string(values)?;
        let mut file = tempfile::Builder::new()
            .prefix("values-")
            .suffix(".yaml")
            .tempfile()
            .map_err(DevcycleError::TempFile)?;
        file.write_all(content.as_bytes())
            .map_err(DevcycleError::TempFile)?;
        Ok(file)
    }
}

#[async_trait]
impl ChartClient for HelmClient {
    async fn list_releases(
        &self,
        namespace: Option<&str>,
        _helm: &HelmConfig,
    ) -> DevcycleResult<Vec<Release>> {
        let mut args = vec!["list".to_string()];
        self.target_args(namespace, &mut args);
        args.extend(["--all".to_string(), "--output".to_string(), "json".to_string()]);

        let out = self.executor.run(&self.path, &args).await?;
        let out = String::from_utf8_lossy(&out);
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(out.trim())?)
    }

    async fn template(
        &self,
        release: &str,
        namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        helm: &HelmConfig,
    ) -> DevcycleResult<String> {
        let values_file = Self::values_file(values)?;

        let mut args = vec![
            "template".to_string(),
            release.to_string(),
            helm.chart.name.clone(),
            "--values".to_string(),
            values_file.path().display().to_string(),
        ];
        if let Some(namespace) = namespace {
            args.push("--namespace".to_string());
            args.push(namespace.to_string());
        }
        Self::chart_args(helm, &mut args);
        args.extend(helm.template_args.iter().cloned());

        let out = self.executor.run(&self.path, &args).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn install_chart(
        &self,
        release: &str,
        namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        helm: &HelmConfig,
    ) -> DevcycleResult<Release> {
        let values_file = Self::values_file(values)?;

        let mut args = vec![
            "upgrade".to_string(),
            release.to_string(),
            helm.chart.name.clone(),
            "--install".to_string(),
            "--values".to_string(),
            values_file.path().display().to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        self.target_args(namespace, &mut args);
        Self::chart_args(helm, &mut args);
        if helm.wait {
            args.push("--wait".to_string());
        }
        if let Some(timeout) = helm.timeout {
            args.push("--timeout".to_string());
            args.push(format!("{}s", timeout));
        }
        args.extend(helm.upgrade_args.iter().cloned());

        let out = self.executor.run(&self.path, &args).await?;
        let parsed: UpgradeOutput = serde_json::from_slice(&out)?;
        debug!(
            "Release {} now at revision {} ({})",
            parsed.name, parsed.version, parsed.info.status
        );

        let chart = if parsed.chart.metadata.version.is_empty() {
            parsed.chart.metadata.name
        } else {
            format!(
                "{}-{}",
                parsed.chart.metadata.name, parsed.chart.metadata.version
            )
        };
        Ok(Release {
            name: parsed.name,
            namespace: parsed.namespace,
            revision: parsed.version.to_string(),
            status: parsed.info.status,
            chart,
        })
    }

    async fn delete_release(
        &self,
        release: &str,
        namespace: Option<&str>,
        _helm: &HelmConfig,
    ) -> DevcycleResult<()> {
        let mut args = vec!["uninstall".to_string(), release.to_string()];
        self.target_args(namespace, &mut args);

        match self.executor.run(&self.path, &args).await {
            Ok(_) => Ok(()),
            Err(DevcycleError::ExternalTool { stderr, .. }) if stderr.contains("not found") => {
                debug!("Release {} already gone", release);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
