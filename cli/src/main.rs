mod commands;
mod provision;

use clap::{Parser, Subcommand};
use commands::{DomainXmlArgs, InjectArgs, ProvisionArgs};
use gegen_core::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gegen")]
#[command(about = "Provision libvirt domains and extend their initial ramdisks")]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a disk volume and start a domain on it
    Provision(ProvisionArgs),
    /// Print the domain descriptor that would be created
    DomainXml(DomainXmlArgs),
    /// Append files to an initial ramdisk
    Inject(InjectArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from {:?}", path);
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Provision(args) => commands::provision(&config, args).await?,
        Commands::DomainXml(args) => commands::domain_xml(args).await?,
        Commands::Inject(args) => commands::inject(args).await?,
    }

    Ok(())
}
