//! AEON Chat Reference Runtime: Demo CLI
//!
//! Runs one or all of the chat scenarios. Each scenario builds a real AEON
//! runtime (journal, dispatch table, mailbox bus) over scripted backends.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- prompt-config
//!   cargo run -p demo -- backend-failover
//!   cargo run -p demo -- event-fanout
//!   cargo run -p demo -- replay --journal-dir ./journal
//!   cargo run -p demo -- --config my.toml run-all

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use aeon_config::RuntimeConfig;
use aeon_contracts::error::AeonResult;
use aeon_ref_chat::scenarios::{backend_failover, event_fanout, prompt_config, replay};

// ── CLI definition ────────────────────────────────────────────────────────────

/// AEON: event-sourced virtual agents, chat reference demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "AEON chat reference runtime demo",
    long_about = "Runs AEON chat scenarios showing propose / confirm turns, bus fan-out,\n\
                  backend circuit breaking with timed recovery, and durable replay."
)]
struct Cli {
    /// Runtime configuration file. Defaults to the embedded reference config.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenario 1: configuration agent, failed confirm, bus request, replay.
    PromptConfig,
    /// Scenario 2: circuit breaker trip, failover and timed recovery.
    BackendFailover,
    /// Scenario 3: wildcard and typed subscribers, duplicate delivery.
    EventFanout,
    /// Scenario 4: file journal, shutdown and restore.
    Replay {
        /// Directory for the event logs. Defaults to a fresh temp directory.
        #[arg(long, value_name = "DIR")]
        journal_dir: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_target(false)
        .compact()
        .init();
    debug!(config = ?cli.config, "configuration loaded");

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(&config).await,
        Command::PromptConfig => prompt_config::run_scenario(&config).await,
        Command::BackendFailover => backend_failover::run_scenario(&config).await,
        Command::EventFanout => event_fanout::run_scenario(&config).await,
        Command::Replay { journal_dir } => run_replay(&config, journal_dir).await,
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> AeonResult<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => aeon_ref_chat::reference_config(),
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

async fn run_all(config: &RuntimeConfig) -> AeonResult<()> {
    prompt_config::run_scenario(config).await?;
    backend_failover::run_scenario(config).await?;
    event_fanout::run_scenario(config).await?;
    run_replay(config, None).await?;
    Ok(())
}

async fn run_replay(config: &RuntimeConfig, journal_dir: Option<PathBuf>) -> AeonResult<()> {
    let dir = journal_dir
        .unwrap_or_else(|| std::env::temp_dir().join(format!("aeon-journal-{}", uuid::Uuid::new_v4())));
    replay::run_scenario(config, &dir).await
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("AEON: Event-sourced Virtual Agents");
    println!("Chat Reference Demo");
    println!("==================================");
    println!();
    println!("Write path per agent turn:");
    println!("  [1] External calls (backends, other agents) happen first");
    println!("  [2] propose() buffers events; malformed payloads are rejected here");
    println!("  [3] confirm() appends the batch to the hash-chained log");
    println!("  [4] Only after a durable append are events folded into state");
    println!("  [5] Published messages fan out to subscribers, ordered per origin");
    println!();
}
