mod commands;
mod config;
mod logging;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use logging::init_logging;

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "/etc/ipguard.yaml", env = "IPGUARD_CONFIG")]
    config: PathBuf,

    /// Raise log verbosity, may be repeated
    #[clap(long, short, action=clap::ArgAction::Count)]
    debug: u8,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Run the HTTP server and the maintenance loop
    Run,
    /// Validate config file
    Check,
    /// Print the JSON schema of the config file
    ConfigSchema,
    /// Lift automatic bans on an IP and forget its failed attempts
    Unban { ip: IpAddr },
    /// Run a single maintenance pass and print what was removed
    Sweep,
    /// Ask a running server whether it is healthy
    Healthcheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    match &cli.command {
        Commands::Run => crate::commands::run::command(&cli).await,
        Commands::Check => crate::commands::check::command(&cli).await,
        Commands::ConfigSchema => crate::commands::config_schema::command(),
        Commands::Unban { ip } => crate::commands::unban::command(&cli, *ip).await,
        Commands::Sweep => crate::commands::sweep::command(&cli).await,
        Commands::Healthcheck => crate::commands::healthcheck::command(&cli).await,
    }
}
