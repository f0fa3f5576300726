//! Fireside CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write a default config file
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Show configuration, storage, and engine state
//! - `cleanup` — Run the retention pass now

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "fireside",
    about = "Fireside — local-first conversational AI assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show configuration, storage, and engine state
    Status,

    /// Run the retention pass now
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Cleanup => commands::cleanup::run().await?,
    }

    Ok(())
}
