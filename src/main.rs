//! Trade Sentinel - guarded multi-venue trading orchestrator
//!
//! # WARNING
//! - Every order is simulated unless the guardrail flags say otherwise.
//! - Arming `allow_live_exchange` or `allow_defi_actions` lets orders reach
//!   real venues once real adapters are registered.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use trade_sentinel::cli::commands;
use trade_sentinel::config::Config;

/// Trade Sentinel - signal-to-execution pipeline behind a mode guardrail
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sentinel.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "SENTINEL_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler (or run a fixed number of cycles)
    Run {
        /// Run this many sequential cycles and exit
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Show guardrail flags, routing table and risk state
    Status,

    /// Resolve where an intent would be routed
    Resolve {
        /// Intent category: spot, sniper, fiat, custody, defi
        #[arg(long)]
        intent: String,

        /// Chain for DeFi intents (ethereum, base, solana, ...)
        #[arg(long)]
        chain: Option<String>,

        /// Requested mode: simulated, sandbox, live
        #[arg(long, default_value = "simulated")]
        mode: String,
    },

    /// Run one risk assessment and print the snapshot
    Assess,

    /// Probe venue health
    Health,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive("trade_sentinel=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    startup_checks(&config);

    let result = match cli.command {
        Commands::Run { cycles } => commands::run(&config, cycles).await,
        Commands::Status => commands::status(&config).await,
        Commands::Resolve { intent, chain, mode } => commands::resolve(&config, &intent, chain.as_deref(), &mode),
        Commands::Assess => commands::assess(&config).await,
        Commands::Health => commands::health(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log the guardrail posture before any component starts
fn startup_checks(config: &Config) {
    let flags = config.guardrail;
    if flags.kill_switch {
        warn!("Kill switch engaged: all routes are simulated");
    } else if flags.allow_live_exchange || flags.allow_defi_actions {
        warn!(
            allow_live_exchange = flags.allow_live_exchange,
            allow_defi_actions = flags.allow_defi_actions,
            "Guardrail armed for real venues"
        );
    } else {
        info!("Guardrail in simulation posture");
    }
}
