//! Build change detection
//!
//! Decides whether an image has to be rebuilt by comparing freshly computed
//! content hashes of its inputs against the cached record of its last build.
//!
//! # Decision
//!
//! | Input | Participates when |
//! |-------|-------------------|
//! | Dockerfile content | always (unless strategy is `always`) |
//! | Serialized image config | always |
//! | Entrypoint + cmd overrides | always |
//! | Build context tree (minus `.dockerignore`) | strategy is not `ignore-context-changes` |
//! | Last build context was a local cluster, now a different one | always |
//!
//! A record with an empty tag was never built and always rebuilds.

use super::engine::{EngineProbe, ImageEngine};
use super::ignore::read_ignore_patterns;
use crate::cache::{ImageCache, LastContext};
use crate::cluster::LocalClusterPredicate;
use crate::config::{ImageConfig, RebuildStrategy};
use crate::error::{DevcycleError, DevcycleResult};
use crate::hash::{hash_file, hash_path_excludes, hash_serialized, hash_string};
use tracing::{debug, info, warn};

/// Rebuild decision for images
pub struct BuildChangeDetector {
    current_context: Option<String>,
    local: Box<dyn LocalClusterPredicate>,
}

impl BuildChangeDetector {
    /// Create a detector for the given active kube context
    pub fn new(
        current_context: Option<String>,
        local: impl LocalClusterPredicate + 'static,
    ) -> Self {
        Self {
            current_context,
            local: Box::new(local),
        }
    }

    /// Decide whether `image` must be rebuilt
    ///
    /// On a positive decision the fresh hashes are written into `record`.
    /// Callers that must not persist before the build succeeds hand in a
    /// staged copy.
    pub fn should_rebuild(
        &self,
        name: &str,
        image: &ImageConfig,
        record: &mut ImageCache,
        last_context: Option<&LastContext>,
        force: bool,
    ) -> DevcycleResult<bool> {
        if image.rebuild_strategy == RebuildStrategy::Always {
            debug!("Image {} uses rebuild strategy always", name);
            return Ok(true);
        }

        let dockerfile_hash = match std::fs::metadata(&image.dockerfile) {
            Ok(_) => hash_file(&image.dockerfile)?,
            Err(source) => {
                return Err(DevcycleError::DockerfileMissing {
                    path: image.dockerfile.clone(),
                    source,
                })
            }
        };
        let image_config_hash = hash_serialized(image)?;
        let entrypoint_hash = entrypoint_hash(image);

        let mut rebuild = false;
        if !record.is_built() {
            debug!("Image {} was never built", name);
            rebuild = true;
        }
        if dockerfile_hash != record.dockerfile_hash {
            debug!("Dockerfile of {} changed", name);
            rebuild = true;
        }
        if image_config_hash != record.image_config_hash {
            debug!("Config of {} changed", name);
            rebuild = true;
        }
        if entrypoint_hash != record.entrypoint_hash {
            debug!("Entrypoint of {} changed", name);
            rebuild = true;
        }

        // Records written before per-image contexts fall back to the store-wide one
        let previous = record
            .built_context
            .as_deref()
            .or(last_context.map(|last| last.context.as_str()));
        if let (Some(previous), Some(current)) = (previous, self.current_context.as_deref()) {
            if previous != current && self.local.is_local(previous) {
                info!(
                    "Rebuilding {}: last build targeted local cluster {}, now {}",
                    name, previous, current
                );
                rebuild = true;
            }
        }

        if image.rebuild_strategy != RebuildStrategy::IgnoreContextChanges {
            let excludes = read_ignore_patterns(&image.context, &image.dockerfile)?;
            let context_hash = hash_path_excludes(&image.context, &excludes)?;
            if context_hash != record.context_hash {
                debug!("Build context of {} changed", name);
                rebuild = true;
            }
            if force || rebuild {
                record.context_hash = context_hash;
            }
        }

        if force || rebuild {
            record.dockerfile_hash = dockerfile_hash;
            record.image_config_hash = image_config_hash;
            record.entrypoint_hash = entrypoint_hash;
        }

        Ok(force || rebuild)
    }

    /// Whether the last build of `record` is still present in the local engine
    ///
    /// `probe` is the result of an earlier [`ImageEngine::probe`]. Without a
    /// usable engine there is nothing to check against, so the image counts
    /// as available.
    pub async fn is_available_locally(
        engine: &dyn ImageEngine,
        probe: &EngineProbe,
        record: &ImageCache,
    ) -> DevcycleResult<bool> {
        match probe {
            EngineProbe::Present => {}
            EngineProbe::NotInstalled => {
                debug!("No {} engine installed, skipping local image check", engine.name());
                return Ok(true);
            }
            EngineProbe::Unusable(reason) => {
                warn!(
                    "{} engine is installed but not usable ({}), skipping local image check",
                    engine.name(),
                    reason
                );
                return Ok(true);
            }
        }

        let reference = record.reference();
        let images = engine.list_images().await?;
        Ok(images.iter().any(|i| *i == reference))
    }
}

fn entrypoint_hash(image: &ImageConfig) -> String {
    if image.entrypoint.is_none() && image.cmd.is_none() {
        return String::new();
    }
    let tokens: String = image
        .entrypoint
        .iter()
        .chain(image.cmd.iter())
        .flatten()
        .map(String::as_str)
        .collect();
    hash_string(&tokens)
}
