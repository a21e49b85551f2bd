use anyhow::Result;
use clap::Parser;

use planstore::cli::{Cli, Commands};
use planstore::commands::{self, Workspace};
use planstore::logging;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // The config file carries logging defaults, so it is loaded first
    let workspace = Workspace::load(cli.common());
    match &workspace {
        Ok(workspace) => logging::init_with(
            &workspace.config.observability.log_level,
            workspace.config.log_format(),
        ),
        Err(_) => logging::init(),
    }
    let workspace = workspace?;

    // Dispatch to appropriate command handler
    match &cli.command {
        Commands::Run(args) => commands::run::run(args, &workspace),
        Commands::Cache(args) => commands::cache::cache(args, &workspace),
        Commands::Config(args) => commands::config::run(&args.command, &workspace),
    }
}
