//! Manifest deployment engine
//!
//! Raw manifests have no native plan step, so every operation starts from a
//! client-side dry run of `kubectl create`, which prints the objects exactly
//! as they would be created. Image references in that output are rewritten
//! to the latest build and the result is piped into `apply`, `delete` or the
//! render stream.
//!
//! Manifests are reapplied when forced, when an image they reference was
//! built in this run, or when the manifest sources or the deployment entry
//! hash differently than at the last apply.

use super::images::ImageReplacer;
use super::{Deployer, StatusResult};
use crate::build::BuiltImages;
use crate::cache::CacheStore;
use crate::config::{DeploymentConfig, ImageConfig, KubectlConfig};
use crate::error::{DevcycleError, DevcycleResult};
use crate::exec::CommandExecutor;
use crate::hash::{hash_file, hash_path, hash_serialized, hash_string};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Max display width of the status target
const STATUS_TARGET_WIDTH: usize = 20;

const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Deploys one deployment entry by applying its manifests
pub struct KubectlDeployer {
    deployment: DeploymentConfig,
    kubectl: KubectlConfig,
    context: Option<String>,
    namespace: Option<String>,
    cmd_path: String,
    manifests: Vec<String>,
    images: BTreeMap<String, ImageConfig>,
    executor: Arc<dyn CommandExecutor>,
}

impl KubectlDeployer {
    pub fn new(
        deployment: DeploymentConfig,
        kubectl: KubectlConfig,
        context: Option<String>,
        namespace: Option<String>,
        default_path: String,
        images: BTreeMap<String, ImageConfig>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let manifests = kubectl
            .manifests
            .iter()
            .map(|m| normalize_manifest(m, kubectl.kustomize))
            .collect();
        let cmd_path = kubectl.cmd_path.clone().unwrap_or(default_path);
        Self {
            deployment,
            kubectl,
            context,
            namespace,
            cmd_path,
            manifests,
            images,
            executor,
        }
    }

    fn name(&self) -> &str {
        &self.deployment.name
    }

    /// `[--context c] [--namespace n] <method> <extra...>`
    fn cmd_args(&self, method: &str, extra: &[String]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args.push(method.to_string());
        args.extend(extra.iter().cloned());
        args
    }

    fn dry_run_args(&self, manifest: &str) -> Vec<String> {
        let mut args = vec!["create".to_string()];
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args.extend([
            "--dry-run".to_string(),
            "--output".to_string(),
            "yaml".to_string(),
            "--validate=false".to_string(),
        ]);
        if self.kubectl.kustomize {
            args.push("--kustomize".to_string());
        } else {
            args.push("--filename".to_string());
        }
        args.push(manifest.to_string());
        args
    }

    async fn dry_run(&self, manifest: &str) -> DevcycleResult<String> {
        let out = self
            .executor
            .run(&self.cmd_path, &self.dry_run_args(manifest))
            .await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Dry-run `manifest` and substitute image references
    ///
    /// Returns the substituted YAML and whether an image built in this run
    /// was substituted.
    async fn replaced_manifest(
        &self,
        manifest: &str,
        replacer: &ImageReplacer,
    ) -> DevcycleResult<(String, bool)> {
        let raw = self.dry_run(manifest).await?;
        replace_documents(&raw, replacer)
    }

    /// Hash of everything the manifest sources read from disk
    fn manifests_hash(&self) -> DevcycleResult<String> {
        let mut hashes = String::new();
        for manifest in &self.manifests {
            let path = Path::new(manifest);
            if manifest.starts_with("http://") || manifest.starts_with("https://") {
                hashes.push_str(&hash_string(manifest));
            } else if self.kubectl.kustomize {
                hashes.push_str(&hash_path(path)?);
            } else if path.is_dir() {
                // `--filename <dir>` only reads the directory's own manifest files
                for entry in WalkDir::new(path)
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                {
                    let entry = entry.map_err(|e| DevcycleError::Hash {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                    let is_manifest = entry
                        .path()
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| matches!(e, "yaml" | "yml" | "json"));
                    if entry.file_type().is_file() && is_manifest {
                        hashes.push_str(&hash_file(entry.path())?);
                    }
                }
            } else {
                hashes.push_str(&hash_path(path)?);
            }
        }
        Ok(hash_string(&hashes))
    }

    fn log_output(line: String) {
        debug!("[kubectl] {}", line);
    }
}

#[async_trait]
impl Deployer for KubectlDeployer {
    async fn deploy(
        &self,
        cache: &mut CacheStore,
        force: bool,
        built_images: &BuiltImages,
    ) -> DevcycleResult<bool> {
        let name = self.name();
        let config_hash = hash_serialized(&self.deployment)?;
        let manifests_hash = self.manifests_hash()?;
        let cached = cache.deployment_cache(name).cloned().unwrap_or_default();

        let mut stale = force;
        if config_hash != cached.deployment_config_hash {
            debug!("Deployment config of {} changed", name);
            stale = true;
        }
        if manifests_hash != cached.kubectl_manifests_hash {
            debug!("Manifests of {} changed", name);
            stale = true;
        }

        let replacer = ImageReplacer::new(&self.images, cache, built_images);
        let mut apply_args = vec!["--force".to_string(), "-f".to_string(), "-".to_string()];
        apply_args.extend(self.kubectl.apply_args.iter().cloned());

        let mut deployed = false;
        for manifest in &self.manifests {
            let (replaced, images_changed) = self.replaced_manifest(manifest, &replacer).await?;
            if !stale && !images_changed {
                debug!("Skip applying {}", manifest);
                continue;
            }

            info!("Applying manifests {}", manifest);
            self.executor
                .command(&self.cmd_path, &self.cmd_args("apply", &apply_args))
                .run(replaced.as_bytes(), &Self::log_output)
                .await?;
            deployed = true;
        }

        if !deployed {
            info!("Skip deployment {}", name);
            return Ok(false);
        }

        let record = cache.deployment_cache_mut(name);
        record.deployment_config_hash = config_hash;
        record.kubectl_manifests_hash = manifests_hash;
        cache.save().await?;

        info!("Deployed {}", name);
        Ok(true)
    }

    async fn delete(&self) -> DevcycleResult<()> {
        let delete_args = vec![
            "--ignore-not-found=true".to_string(),
            "-f".to_string(),
            "-".to_string(),
        ];
        for manifest in &self.manifests {
            let raw = self.dry_run(manifest).await?;
            info!("Deleting manifests {}", manifest);
            self.executor
                .command(&self.cmd_path, &self.cmd_args("delete", &delete_args))
                .run(raw.as_bytes(), &Self::log_output)
                .await?;
        }
        Ok(())
    }

    async fn render(
        &self,
        cache: &CacheStore,
        built_images: &BuiltImages,
        out: &mut (dyn Write + Send),
    ) -> DevcycleResult<()> {
        let replacer = ImageReplacer::new(&self.images, cache, built_images);
        for manifest in &self.manifests {
            let (replaced, _) = self.replaced_manifest(manifest, &replacer).await?;
            write!(out, "{}\n---\n", replaced)
                .map_err(|e| DevcycleError::io("writing rendered manifests", e))?;
        }
        Ok(())
    }

    async fn status(&self) -> DevcycleResult<StatusResult> {
        let joined = self.kubectl.manifests.join(",");
        let target = if joined.chars().count() > STATUS_TARGET_WIDTH {
            format!(
                "{}...",
                joined.chars().take(STATUS_TARGET_WIDTH).collect::<String>()
            )
        } else {
            joined
        };

        Ok(StatusResult {
            name: self.name().to_string(),
            kind: "Manifests".to_string(),
            target,
            status: "N/A".to_string(),
        })
    }
}

/// Reduce a manifest entry to what `kubectl --filename`/`--kustomize` accepts
///
/// A trailing glob segment (`k8s/*`, `k8s/*.yaml`) becomes its directory and
/// a kustomize root given as its `kustomization.yaml` becomes the directory.
fn normalize_manifest(manifest: &str, kustomize: bool) -> String {
    let mut manifest = manifest.trim().to_string();

    if let Some((dir, last)) = manifest.rsplit_once('/') {
        if last.contains('*') {
            manifest = format!("{}/", dir);
        }
    } else if manifest.contains('*') {
        manifest = ".".to_string();
    }

    if kustomize {
        if let Some(dir) = manifest.strip_suffix(KUSTOMIZATION_FILE) {
            manifest = if dir.is_empty() { ".".to_string() } else { dir.to_string() };
        }
    }

    manifest
}

/// Substitute image references in every YAML document of `raw`
fn replace_documents(raw: &str, replacer: &ImageReplacer) -> DevcycleResult<(String, bool)> {
    let mut changed = false;
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(raw) {
        let mut value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        changed |= replacer.replace(&mut value, Some("image"));
        documents.push(serde_yaml::to_string(&value)?);
    }
    Ok((documents.join("---\n"), changed))
}
