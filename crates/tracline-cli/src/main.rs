use anyhow::Result;
use clap::Parser;
use tracing::debug;

use tracline_cli::{
    cli::{Cli, Commands},
    commands, config, logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref(), cli.db_path.as_deref())?;
    logging::init(cli.requested_level(), &config.logging.level);
    debug!(database = %config.storage.database_path.display(), "Configuration loaded");

    let ctx = config::CliContext::open(config)?;
    match cli.command {
        Commands::Monitor(cmd) => commands::monitor::handle(ctx, cmd, cli.config).await,
        Commands::Trace(cmd) => commands::trace::handle(ctx, cmd).await,
    }
}
