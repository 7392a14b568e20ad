//! CLI command implementations

pub mod build;
pub mod config;
pub mod deploy;
pub mod purge;
pub mod render;
pub mod status;

pub use build::execute as build;
pub use config::execute as config;
pub use deploy::execute as deploy;
pub use purge::execute as purge;
pub use render::execute as render;
pub use status::execute as status;

use crate::build::{BuildOptions, BuiltImages, DockerEngine, EngineProbe, ImageBuilder, ImageEngine};
use crate::cache::CacheStore;
use crate::cluster::{ClusterClient, KubeContext};
use crate::config::{Config, ConfigManager};
use crate::deploy::BackendFactory;
use crate::error::DevcycleResult;
use crate::exec::{CommandExecutor, ProcessExecutor};
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs to talk to the cluster and the build engine
pub struct Workspace {
    pub config: Arc<Config>,
    pub cache: CacheStore,
    pub executor: Arc<dyn CommandExecutor>,
    pub cluster: KubeContext,
    pub ui: UiContext,
}

impl Workspace {
    /// Resolve the cluster and load the cache for `config`
    pub async fn open(manager: &ConfigManager, config: Config) -> DevcycleResult<Self> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new());
        let cluster = KubeContext::resolve(executor.as_ref(), &config.cluster).await?;
        let cache = CacheStore::load(&manager.cache_path()).await?;
        debug!("Loaded cache from {}", manager.cache_path().display());

        Ok(Self {
            config: Arc::new(config),
            cache,
            executor,
            cluster,
            ui: UiContext::detect(),
        })
    }

    /// Factory creating a deployer for each deployment
    pub fn backends(&self) -> BackendFactory {
        BackendFactory::new(self.config.clone(), self.executor.clone(), &self.cluster)
    }

    /// Build the selected images, returning the tags built in this run
    pub async fn build_images(&mut self, options: &BuildOptions) -> DevcycleResult<BuiltImages> {
        if self.config.images.is_empty() {
            return Ok(BuiltImages::new());
        }

        let engine = DockerEngine::new(self.executor.clone());
        let probe = engine.probe().await;
        if probe == EngineProbe::NotInstalled {
            ui::step_warn_hint(
                &self.ui,
                &format!("{} was not found", engine.name()),
                "Images with changed inputs cannot be built",
            );
        }

        let builder = ImageBuilder::new(&self.config, &engine, &self.cluster)?.with_probe(probe);
        let mut spinner = TaskSpinner::new(&self.ui);
        spinner.start(&format!(
            "Building images for {}...",
            self.cluster.current_context()
        ));

        match builder.build_all(&mut self.cache, options).await {
            Ok(built) => {
                if built.is_empty() {
                    spinner.stop("All images up to date");
                } else {
                    spinner.stop(&format!("Built {} image(s)", built.len()));
                }
                Ok(built)
            }
            Err(e) => {
                spinner.stop_error("Image build failed");
                Err(e)
            }
        }
    }
}
