//! Cluster targeting
//!
//! Resolves the kube context and default namespace commands run against,
//! and decides whether a context name refers to a local development cluster.

use crate::config::ClusterConfig;
use crate::error::{DevcycleError, DevcycleResult};
use crate::exec::CommandExecutor;
use glob::Pattern;
use std::path::PathBuf;
use tracing::debug;

/// Read access to the cluster being targeted
pub trait ClusterClient: Send + Sync {
    /// Name of the active kube context
    fn current_context(&self) -> &str;

    /// Default namespace, if one is configured
    fn namespace(&self) -> Option<&str>;
}

/// Context and namespace resolved once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeContext {
    context: String,
    namespace: Option<String>,
}

impl KubeContext {
    /// Resolve from config overrides, falling back to the kubeconfig
    pub async fn resolve(
        executor: &dyn CommandExecutor,
        cluster: &ClusterConfig,
    ) -> DevcycleResult<Self> {
        let kubectl = cluster.kubectl_path.as_str();

        let context = match &cluster.context {
            Some(context) => context.clone(),
            None => {
                let args = vec!["config".to_string(), "current-context".to_string()];
                let out = executor.run(kubectl, &args).await?;
                String::from_utf8_lossy(&out).trim().to_string()
            }
        };

        let namespace = match &cluster.namespace {
            Some(namespace) => Some(namespace.clone()),
            None => {
                let args = vec![
                    "config".to_string(),
                    "view".to_string(),
                    "--minify".to_string(),
                    "--output".to_string(),
                    "jsonpath={..namespace}".to_string(),
                ];
                match executor.run(kubectl, &args).await {
                    Ok(out) => {
                        let ns = String::from_utf8_lossy(&out).trim().to_string();
                        (!ns.is_empty()).then_some(ns)
                    }
                    Err(e) => {
                        debug!("Could not read namespace from kubeconfig: {}", e);
                        None
                    }
                }
            }
        };

        debug!("Using kube context {} (namespace {:?})", context, namespace);
        Ok(Self { context, namespace })
    }
}

impl ClusterClient for KubeContext {
    fn current_context(&self) -> &str {
        &self.context
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

/// Decides whether a context name points at a local-only cluster
///
/// Images built for a local cluster are usually never pushed, so a build
/// recorded against one cannot be reused once a remote cluster is targeted.
pub trait LocalClusterPredicate: Send + Sync {
    fn is_local(&self, context: &str) -> bool;
}

impl<F> LocalClusterPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_local(&self, context: &str) -> bool {
        self(context)
    }
}

/// Glob patterns matched against the context name
#[derive(Debug, Clone)]
pub struct ContextPatterns {
    patterns: Vec<Pattern>,
}

impl ContextPatterns {
    pub fn new(patterns: &[String]) -> DevcycleResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| DevcycleError::ConfigInvalid {
                    path: PathBuf::from("cluster.local_contexts"),
                    reason: format!("invalid pattern '{}': {}", p, e),
                })
            })
            .collect::<DevcycleResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl LocalClusterPredicate for ContextPatterns {
    fn is_local(&self, context: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(context))
    }
}
