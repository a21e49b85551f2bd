use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::problems::Tolerance;

/// Planstore - configuration cache for work item graphs
///
/// Planstore configures a build from its plan manifest once, stores the
/// resulting work item graph, and reuses it on later builds until one of the
/// inputs that shaped the graph changes.
#[derive(Parser, Debug)]
#[command(name = "planstore")]
#[command(author = "Tuist Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configuration cache for work item graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Arguments that decide which configuration file applies
    pub fn common(&self) -> &CommonConfigArgs {
        match &self.command {
            Commands::Run(args) => &args.common,
            Commands::Cache(args) => &args.common,
            Commands::Config(args) => &args.common,
        }
    }
}

/// Common configuration arguments shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonConfigArgs {
    /// Project directory (defaults to the current directory)
    #[arg(short = 'p', long, env = "PLANSTORE_PROJECT_DIR")]
    pub project: Option<PathBuf>,

    /// Config file path (defaults to planstore.toml discovery)
    #[arg(short = 'c', long, env = "PLANSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides cache.dir)
    #[arg(long, env = "PLANSTORE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configure (or restore) and execute work items
    Run(RunArgs),

    /// Manage stored plans
    Cache(CacheArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Work items to run (e.g. ":app:build"); defaults to every item
    pub items: Vec<String>,

    /// Plan manifest (defaults to plan.kdl in the project directory)
    #[arg(short = 'm', long, env = "PLANSTORE_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Work item to leave out of the build (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "ITEM")]
    pub exclude: Vec<String>,

    /// Configure from scratch and do not store the plan
    #[arg(long)]
    pub no_configuration_cache: bool,

    /// What capability problems do to the build
    #[arg(long, value_enum, env = "PLANSTORE_PROBLEMS")]
    pub problems: Option<Tolerance>,

    /// Worker threads (0 = one per CPU)
    #[arg(short = 'j', long, env = "PLANSTORE_WORKERS")]
    pub workers: Option<u32>,

    /// Report whether the stored plan would be reused, without running
    #[arg(long)]
    pub dry_run: bool,

    /// Discard the stored plan for this build before running
    #[arg(long)]
    pub refresh: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// List stored plans
    List {
        /// Show the stored fingerprint of each plan
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove stored plans
    Clean {
        /// Cache key to remove (omit to remove every plan)
        key: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,

    #[command(flatten)]
    pub common: CommonConfigArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print an example planstore.toml
    Example,

    /// Validate a configuration file
    Validate {
        /// Path to the config file
        path: PathBuf,
    },

    /// Show the effective configuration for the project
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "planstore",
            "run",
            ":app:build",
            "-x",
            ":app:lint",
            "--exclude",
            ":app:docs",
            "--problems",
            "fail",
            "--workers",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.items, vec![":app:build"]);
                assert_eq!(args.exclude, vec![":app:lint", ":app:docs"]);
                assert_eq!(args.problems, Some(Tolerance::Fail));
                assert_eq!(args.workers, Some(2));
                assert!(!args.no_configuration_cache);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_clean() {
        let cli = Cli::try_parse_from(["planstore", "cache", "clean", "plan-abc"]).unwrap();
        match cli.command {
            Commands::Cache(CacheArgs {
                command: CacheCommands::Clean { key },
                ..
            }) => assert_eq!(key.as_deref(), Some("plan-abc")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_problems_mode() {
        assert!(Cli::try_parse_from(["planstore", "run", "--problems", "ignore"]).is_err());
    }
}
