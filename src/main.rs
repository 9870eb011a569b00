use anyhow::Result;
use clap::{Parser, Subcommand};
use node_watcher::commands::{check, run};
use node_watcher::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "node-watcher")]
#[command(about = "Fleet watcher: restarts lagging or failing nodes and alerts on stagnation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the fleet until interrupted
    Run {
        /// Path to the configuration file (JSON, or TOML by extension)
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Log level when RUST_LOG is not set
        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Validate the configuration and print the effective settings
    Check {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, log_level } => {
            logging::init(&log_level)?;
            run::execute(&config)
        }
        Commands::Check { config } => {
            logging::init("warn")?;
            check::execute(&config)
        }
    }
}
