//! cortex - a step-budgeted reasoning agent

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ask_command, capabilities_command, init_command, status_command, turns_command};

/// cortex - reasoning agent for your terminal
#[derive(Parser)]
#[command(name = "cortex")]
#[command(about = "◆ A step-budgeted reasoning agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and data directory
    Init,
    /// Ask the agent a question
    Ask {
        /// Question to answer; starts an interactive session when omitted
        #[arg(short, long)]
        message: Option<String>,
        /// Skip the answer history lookup
        #[arg(long)]
        no_history: bool,
    },
    /// Show system status
    Status,
    /// List capability groups and capabilities
    Capabilities,
    /// List archived turns, or show one
    Turns {
        /// Session id to show
        id: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await.map_err(|e| ("Init", e)),
        Commands::Ask {
            message,
            no_history,
        } => ask_command(message, no_history)
            .await
            .map_err(|e| ("Ask", e)),
        Commands::Status => status_command().await.map_err(|e| ("Status", e)),
        Commands::Capabilities => capabilities_command().await.map_err(|e| ("Capabilities", e)),
        Commands::Turns { id } => turns_command(id).await.map_err(|e| ("Turns", e)),
    };

    if let Err((command, e)) = result {
        error!("{} failed: {:#}", command, e);
        std::process::exit(1);
    }
}
