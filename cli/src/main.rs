// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Arena CLI
//!
//! The `arena` binary runs rounds of coding agents against a repository.
//!
//! ## Commands
//!
//! - `arena run` - Run arena or autopilot rounds until the task file is done
//! - `arena config show|validate|generate` - Configuration management
//! - `arena replay` - Print the canonical messages parsed from an agent log

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use arena_core::domain::config::ArenaConfig;
use arena_orchestrator::commands::{self, ConfigCommand, ReplayArgs, RunArgs};

/// Arena - parallel coding agents with a supervising judge
#[derive(Parser)]
#[command(name = "arena")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ARENA_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true, env = "ARENA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json); defaults to the config file
    #[arg(long, global = true, env = "ARENA_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rounds of workers and a supervisor
    #[command(name = "run")]
    Run(RunArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Parse an existing agent log and print canonical messages
    #[command(name = "replay")]
    Replay(ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logging comes up before the command runs, so a broken config file
    // falls back to defaults here and is reported by the command itself.
    let observability = ArenaConfig::load_or_default(cli.config.clone())
        .map(|config| config.spec.observability)
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&observability.log_level),
        cli.log_format.as_deref().unwrap_or(&observability.log_format),
    )?;

    match cli.command {
        Some(Commands::Run(args)) => commands::run::execute(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Replay(args)) => commands::replay::execute(args).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
