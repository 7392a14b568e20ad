//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// devcycle - incremental build and deploy for Kubernetes workloads
///
/// Rebuilds only the images whose inputs changed and redeploys only the
/// deployments whose configuration, values or images changed.
#[derive(Parser, Debug)]
#[command(name = "devcycle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path (defaults to the nearest devcycle.toml)
    #[arg(short, long, global = true, env = "DEVCYCLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kube context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Default namespace for deployments without their own
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build images whose inputs changed
    Build(BuildArgs),

    /// Build changed images and deploy changed deployments
    Deploy(DeployArgs),

    /// Print the manifests a deploy would apply
    Render(RenderArgs),

    /// Remove deployments from the cluster
    Purge(PurgeArgs),

    /// Show the state of each deployment
    Status(StatusArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Image config names to build (defaults to all)
    pub images: Vec<String>,

    /// Rebuild even if nothing changed
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the deploy command
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Deployments to deploy (comma-separated, defaults to all)
    #[arg(short, long, value_delimiter = ',')]
    pub deployments: Vec<String>,

    /// Rebuild all images even if nothing changed
    #[arg(long, conflicts_with = "skip_build")]
    pub force_build: bool,

    /// Redeploy even if nothing changed
    #[arg(long)]
    pub force_deploy: bool,

    /// Deploy with the tags already in the cache
    #[arg(long)]
    pub skip_build: bool,
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Deployments to render (comma-separated, defaults to all)
    #[arg(short, long, value_delimiter = ',')]
    pub deployments: Vec<String>,

    /// Build changed images first so fresh tags are substituted
    #[arg(long)]
    pub build: bool,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the purge command
#[derive(Parser, Debug)]
pub struct PurgeArgs {
    /// Deployments to purge (comma-separated, defaults to all)
    #[arg(short, long, value_delimiter = ',')]
    pub deployments: Vec<String>,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Deployments to show (comma-separated, defaults to all)
    #[arg(short, long, value_delimiter = ',')]
    pub deployments: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for the status command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_build() {
        let cli = Cli::parse_from(["devcycle", "build", "api", "worker", "--force"]);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.images, vec!["api", "worker"]);
                assert!(args.force);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_parses_deploy_list() {
        let cli = Cli::parse_from(["devcycle", "deploy", "-d", "web,db", "--force-deploy"]);
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.deployments, vec!["web", "db"]);
                assert!(args.force_deploy);
                assert!(!args.force_build);
                assert!(!args.skip_build);
            }
            _ => panic!("expected Deploy command"),
        }
    }

    #[test]
    fn cli_rejects_force_build_with_skip_build() {
        let result =
            Cli::try_parse_from(["devcycle", "deploy", "--force-build", "--skip-build"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_global_cluster_overrides() {
        let cli = Cli::parse_from([
            "devcycle",
            "status",
            "--context",
            "kind-dev",
            "-n",
            "team",
            "-vv",
        ]);
        assert_eq!(cli.context.as_deref(), Some("kind-dev"));
        assert_eq!(cli.namespace.as_deref(), Some("team"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Status(args) => {
                assert!(args.deployments.is_empty());
                assert!(matches!(args.format, OutputFormat::Table));
            }
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn cli_parses_render_output() {
        let cli = Cli::parse_from(["devcycle", "render", "-o", "out.yaml", "--build"]);
        match cli.command {
            Commands::Render(args) => {
                assert_eq!(args.output, Some(PathBuf::from("out.yaml")));
                assert!(args.build);
            }
            _ => panic!("expected Render command"),
        }
    }

    #[test]
    fn cli_parses_config_path() {
        let cli = Cli::parse_from(["devcycle", "config", "path"]);
        match cli.command {
            Commands::Config(args) => assert!(matches!(args.action, Some(ConfigAction::Path))),
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn cli_parses_purge() {
        let cli = Cli::parse_from(["devcycle", "purge", "--deployments", "web"]);
        assert!(matches!(cli.command, Commands::Purge(ref a) if a.deployments == ["web"]));
    }
}
