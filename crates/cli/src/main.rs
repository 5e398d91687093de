//! Memoria CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: initialize the config directory and config.toml
//! - `chat`: interactive or single-message conversation
//! - `memory`: inspect, export or clear a user's memory
//! - `status`: show configuration and storage status

use clap::{Args, Parser, Subcommand};
use memoria_config::{AppConfig, ConfigError, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "memoria",
    about = "Memoria: a companion agent with two-tier long-term memory",
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

/// Whose memory to use.
#[derive(Args, Debug, Clone)]
struct UserArg {
    /// User id
    #[arg(short, long, env = "MEMORIA_USER", default_value = "default")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat with the companion
    Chat {
        #[command(flatten)]
        user: UserArg,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Override the configured provider
        #[arg(long)]
        provider: Option<String>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage a user's memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show system status
    Status {
        /// Also probe the default provider
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show backend details and per-tier counts
    Stats {
        #[command(flatten)]
        user: UserArg,
    },

    /// Print long-term memory and the short-term window
    Show {
        #[command(flatten)]
        user: UserArg,
    },

    /// List recent memory updates
    History {
        #[command(flatten)]
        user: UserArg,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Export both tiers as JSON
    Export {
        #[command(flatten)]
        user: UserArg,

        /// Output file (defaults to memory_export_<user>_<timestamp>.json)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Delete memory
    Clear {
        #[command(flatten)]
        user: UserArg,

        /// Only clear the short-term window
        #[arg(long)]
        short_term_only: bool,

        /// Actually delete
        #[arg(long)]
        confirm: bool,
    },
}

/// `onboard` works without a valid config; every other command needs one.
fn loaded(config: Result<AppConfig, ConfigError>) -> Result<AppConfig, String> {
    config.map_err(|e| format!("Failed to load config: {e}"))
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let fallback = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let logging = config.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            user,
            message,
            provider,
            model,
        } => commands::chat::run(loaded(config)?, &user.user, message, provider, model).await?,
        Commands::Memory { action } => {
            let config = loaded(config)?;
            match action {
                MemoryAction::Stats { user } => commands::memory::stats(&config, &user.user).await?,
                MemoryAction::Show { user } => commands::memory::show(&config, &user.user).await?,
                MemoryAction::History { user, limit } => {
                    commands::memory::history(&config, &user.user, limit).await?
                }
                MemoryAction::Export { user, output } => {
                    commands::memory::export(&config, &user.user, output.as_deref()).await?
                }
                MemoryAction::Clear {
                    user,
                    short_term_only,
                    confirm,
                } => commands::memory::clear(&config, &user.user, short_term_only, confirm).await?,
            }
        }
        Commands::Status { check } => commands::status::run(&loaded(config)?, check).await?,
    }

    Ok(())
}
