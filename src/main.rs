mod demo;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flux_core::config::AppConfig;
use flux_core::FluxError;

#[derive(Parser)]
#[command(name = "fluxsolver", version, about = "Flowchart solver with truth maintenance")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "fluxsolver.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,
    /// Run the demonstration flows and print the active nodes per cycle
    Demo {
        /// Value answered for `X`
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        answer: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, defaulted) = match AppConfig::load(&cli.config) {
        Ok(config) => (config, false),
        Err(FluxError::ConfigNotFound(_)) => (AppConfig::default(), true),
        Err(e) => return Err(e.into()),
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(config.log.with_target)
        .init();

    if defaulted {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    } else {
        info!(path = %cli.config.display(), "Config loaded");
    }

    match cli.command {
        Commands::Config => println!("{}", config.to_toml()?),
        Commands::Demo { answer } => demo::run_demo(&config, answer)?,
    }
    Ok(())
}
