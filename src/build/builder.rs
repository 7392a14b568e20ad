//! Image build pipeline
//!
//! Runs the change-detector for every selected image, builds the ones that
//! need it, and commits the cache record of an image only once its build has
//! succeeded.

use super::detector::BuildChangeDetector;
use super::engine::{EngineProbe, ImageBuildRequest, ImageEngine};
use super::BuiltImages;
use crate::cache::{CacheStore, LastContext};
use crate::cluster::{ClusterClient, ContextPatterns};
use crate::config::Config;
use crate::error::{DevcycleError, DevcycleResult};
use chrono::Utc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Length of generated image tags
const TAG_LENGTH: usize = 7;

/// Options for a build run
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Image config names to build; empty means all
    pub images: Vec<String>,
    /// Rebuild even if nothing changed
    pub force: bool,
}

/// Builds images that changed since their last build
pub struct ImageBuilder<'a> {
    config: &'a Config,
    engine: &'a dyn ImageEngine,
    cluster: &'a dyn ClusterClient,
    detector: BuildChangeDetector,
    probe: Option<EngineProbe>,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(
        config: &'a Config,
        engine: &'a dyn ImageEngine,
        cluster: &'a dyn ClusterClient,
    ) -> DevcycleResult<Self> {
        let patterns = ContextPatterns::new(&config.cluster.local_contexts)?;
        let detector =
            BuildChangeDetector::new(Some(cluster.current_context().to_string()), patterns);
        Ok(Self {
            config,
            engine,
            cluster,
            detector,
            probe: None,
        })
    }

    /// Reuse an engine probe made by the caller instead of probing again
    pub fn with_probe(mut self, probe: EngineProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build every selected image that needs it
    ///
    /// Returns the config names and tags of the images built in this run.
    pub async fn build_all(
        &self,
        cache: &mut CacheStore,
        options: &BuildOptions,
    ) -> DevcycleResult<BuiltImages> {
        if let Some(unknown) = options
            .images
            .iter()
            .find(|name| !self.config.images.contains_key(name.as_str()))
        {
            return Err(DevcycleError::UnknownImage(unknown.clone()));
        }

        let probe = match &self.probe {
            Some(probe) => probe.clone(),
            None => self.engine.probe().await,
        };
        // Every decision of this run sees the context as it was before the run
        let last_context = cache.last_context().cloned();

        let mut built = BuiltImages::new();
        for name in self.config.images.keys() {
            if !options.images.is_empty() && !options.images.contains(name) {
                continue;
            }

            let span = info_span!("image", name = %name);
            if let Some(tag) = self
                .build_one(name, cache, &probe, last_context.as_ref(), options.force)
                .instrument(span)
                .await?
            {
                built.insert(name.clone(), tag);
            }
        }

        if !built.is_empty() {
            cache.set_last_context(self.cluster.current_context(), self.cluster.namespace());
            cache.save().await?;
        }

        Ok(built)
    }

    async fn build_one(
        &self,
        name: &str,
        cache: &mut CacheStore,
        probe: &EngineProbe,
        last_context: Option<&LastContext>,
        force: bool,
    ) -> DevcycleResult<Option<String>> {
        let image = &self.config.images[name];
        let mut staged = cache.image_cache(name).cloned().unwrap_or_default();

        let mut rebuild =
            self.detector
                .should_rebuild(name, image, &mut staged, last_context, force)?;

        if !rebuild
            && !BuildChangeDetector::is_available_locally(self.engine, probe, &staged).await?
        {
            info!("Image {} not found locally, rebuilding", staged.reference());
            rebuild = true;
        }

        if !rebuild {
            info!("Skip building image {}", name);
            return Ok(None);
        }

        let tags = if image.tags.is_empty() {
            vec![random_tag()]
        } else {
            image.tags.clone()
        };

        info!("Building image {}:{}", image.image, tags[0]);
        let request = ImageBuildRequest {
            image: &image.image,
            tags: &tags,
            dockerfile: &image.dockerfile,
            context: &image.context,
            build_args: &image.build_args,
            entrypoint: image.entrypoint.as_deref(),
            cmd: image.cmd.as_deref(),
        };
        self.engine.build(&request).await?;

        staged.tag = tags[0].clone();
        staged.image_name = image.image.clone();
        staged.built_context = Some(self.cluster.current_context().to_string());
        staged.built_at = Some(Utc::now());
        *cache.image_cache_mut(name) = staged;
        cache.save().await?;

        info!("Built image {}:{}", image.image, tags[0]);
        Ok(Some(tags[0].clone()))
    }
}

/// Random lowercase alphanumeric tag
fn random_tag() -> String {
    Uuid::new_v4().simple().to_string()[..TAG_LENGTH].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageConfig, RebuildStrategy};
    use crate::testing::{FakeCluster, FakeEngine};
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> Config {
        std::fs::write(temp.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let mut config = Config::default();
        for name in ["api", "worker"] {
            config.images.insert(
                name.to_string(),
                ImageConfig {
                    image: format!("registry.local/{}", name),
                    dockerfile: temp.path().join("Dockerfile"),
                    context: temp.path().to_path_buf(),
                    rebuild_strategy: RebuildStrategy::IgnoreContextChanges,
                    ..Default::default()
                },
            );
        }
        config
    }

    #[test]
    fn random_tags_are_short_and_lowercase() {
        let tag = random_tag();
        assert_eq!(tag.len(), TAG_LENGTH);
        assert!(tag.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn second_run_is_noop() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let cluster = FakeCluster::new("minikube");
        let engine = FakeEngine::absent();
        let mut cache = CacheStore::in_memory();
        let builder = ImageBuilder::new(&config, &engine, &cluster).unwrap();

        let built = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(cache.image_cache("api").unwrap().tag, built["api"]);
        assert_eq!(cache.last_context().unwrap().context, "minikube");

        let built = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert!(built.is_empty());
        assert_eq!(engine.builds().len(), 2);
    }

    #[tokio::test]
    async fn leaving_local_cluster_rebuilds_every_image() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let engine = FakeEngine::absent();
        let mut cache = CacheStore::in_memory();

        let local = FakeCluster::new("minikube");
        ImageBuilder::new(&config, &engine, &local)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();

        let remote = FakeCluster::new("gke_prod");
        let builder = ImageBuilder::new(&config, &engine, &remote).unwrap();
        let built = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(built.keys().collect::<Vec<_>>(), vec!["api", "worker"]);
        assert_eq!(cache.last_context().unwrap().context, "gke_prod");
        assert_eq!(
            cache.image_cache("worker").unwrap().built_context.as_deref(),
            Some("gke_prod")
        );

        let built = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert!(built.is_empty());
    }

    #[tokio::test]
    async fn partial_build_keeps_other_images_stale() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let engine = FakeEngine::absent();
        let mut cache = CacheStore::in_memory();

        let local = FakeCluster::new("minikube");
        ImageBuilder::new(&config, &engine, &local)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();

        let remote = FakeCluster::new("gke_prod");
        let builder = ImageBuilder::new(&config, &engine, &remote).unwrap();
        let only_api = BuildOptions {
            images: vec!["api".to_string()],
            force: false,
        };
        let built = builder.build_all(&mut cache, &only_api).await.unwrap();
        assert_eq!(built.keys().collect::<Vec<_>>(), vec!["api"]);

        // worker was still built for minikube
        let built = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(built.keys().collect::<Vec<_>>(), vec!["worker"]);
    }

    #[tokio::test]
    async fn engine_availability_checked_once_per_run() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let cluster = FakeCluster::new("minikube");
        let mut cache = CacheStore::in_memory();

        ImageBuilder::new(&config, &FakeEngine::absent(), &cluster)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        let api = cache.image_cache("api").unwrap().reference();
        let worker = cache.image_cache("worker").unwrap().reference();

        let engine = FakeEngine::present(&[api.as_str(), worker.as_str()]);
        let built = ImageBuilder::new(&config, &engine, &cluster)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert!(built.is_empty());
        assert_eq!(engine.availability_checks(), 1);
        assert_eq!(engine.list_calls(), 2);

        let engine = FakeEngine::present(&[api.as_str(), worker.as_str()]);
        ImageBuilder::new(&config, &engine, &cluster)
            .unwrap()
            .with_probe(EngineProbe::Present)
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(engine.availability_checks(), 0);
    }

    #[tokio::test]
    async fn failed_build_leaves_cache_untouched() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let cluster = FakeCluster::new("minikube");
        let engine = FakeEngine::failing();
        let mut cache = CacheStore::in_memory();
        let builder = ImageBuilder::new(&config, &engine, &cluster).unwrap();

        let err = builder
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DevcycleError::ImageBuild { .. }));
        assert!(cache.image_cache("api").is_none());
        assert!(cache.last_context().is_none());
    }

    #[tokio::test]
    async fn missing_local_image_triggers_rebuild() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let cluster = FakeCluster::new("minikube");
        let mut cache = CacheStore::in_memory();

        let absent = FakeEngine::absent();
        ImageBuilder::new(&config, &absent, &cluster)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        let api = cache.image_cache("api").unwrap().reference();

        // Only the api image is still present in the engine
        let engine = FakeEngine::present(&[api.as_str()]);
        let built = ImageBuilder::new(&config, &engine, &cluster)
            .unwrap()
            .build_all(&mut cache, &BuildOptions::default())
            .await
            .unwrap();
        assert_eq!(built.keys().collect::<Vec<_>>(), vec!["worker"]);
    }

    #[tokio::test]
    async fn selection_and_fixed_tags() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.images.get_mut("api").unwrap().tags = vec!["dev".to_string(), "latest".to_string()];
        let cluster = FakeCluster::new("minikube");
        let engine = FakeEngine::absent();
        let mut cache = CacheStore::in_memory();
        let builder = ImageBuilder::new(&config, &engine, &cluster).unwrap();

        let options = BuildOptions {
            images: vec!["api".to_string()],
            force: false,
        };
        let built = builder.build_all(&mut cache, &options).await.unwrap();
        assert_eq!(built["api"], "dev");
        assert_eq!(
            engine.builds(),
            vec![(
                "registry.local/api".to_string(),
                vec!["dev".to_string(), "latest".to_string()]
            )]
        );
        assert!(cache.image_cache("worker").is_none());

        let options = BuildOptions {
            images: vec!["frontend".to_string()],
            force: false,
        };
        let err = builder.build_all(&mut cache, &options).await.unwrap_err();
        assert!(matches!(err, DevcycleError::UnknownImage(name) if name == "frontend"));
    }
}
