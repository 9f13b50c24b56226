use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod context;
mod logging;

use logging::LogFormat;

#[derive(Parser)]
#[command(name = "vizor")]
#[command(about = "vizor - ephemeral visualization session orchestrator", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/vizor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service and the periodic reaper
    Serve {
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create one session from a JSON request file and print the outcome
    Create {
        /// Path to a VisualizationRequest JSON document
        request: PathBuf,
    },
    /// Run a single reaper sweep
    Reap,
    /// List proxy routes
    Routes {
        /// Only routes without traffic for this many seconds
        #[arg(long)]
        inactive_secs: Option<u64>,
    },
    /// Print the registry record of a session
    Session {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format);

    let config = context::load_config(cli.config)?;

    match cli.command {
        Commands::Serve { bind } => commands::serve::run(config, bind).await?,
        Commands::Create { request } => commands::create::run(config, &request).await?,
        Commands::Reap => commands::reap::run(config).await?,
        Commands::Routes { inactive_secs } => commands::routes::run(config, inactive_secs).await?,
        Commands::Session { name } => commands::session::run(config, &name).await?,
    }

    Ok(())
}
