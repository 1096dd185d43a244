//! MicroClaw CLI: the main entry point.
//!
//! Commands:
//! - `run`: scheduled loop, one cycle every `agent.interval_seconds`
//! - `once`: Run a single cycle and exit
//! - `chat`: Interactive session with persistent history
//! - `event`: Feed one external event to the agent
//! - `config`: Print, locate, or validate configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "microclaw",
    about = "MicroClaw: an autonomous agent for microcontroller boards",
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
    /// Run the scheduled agent loop until Ctrl+C
    Run,

    /// Run a single cycle
    Once {
        /// Prompt to use instead of the configured recurring prompt
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Chat with the agent interactively
    Chat,

    /// Handle one external event (e.g. a button press)
    Event {
        /// Event type, such as `button_press` or `sensor_alert`
        event_type: String,

        /// Free-form event payload
        data: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a default config file
    Default,

    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Load and validate the configuration
    Validate,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Once { prompt } => commands::once::run(prompt).await?,
        Commands::Chat => commands::chat::run().await?,
        Commands::Event { event_type, data } => commands::event::run(&event_type, &data).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::default_toml(),
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}
