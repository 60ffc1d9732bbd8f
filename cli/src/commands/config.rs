// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arena_core::domain::adapter::AgentProfile;
use arena_core::domain::config::ArenaConfig;

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./arena-config.yaml)
        #[arg(short, long, default_value = "./arena-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate {
            output,
            examples,
            force,
        } => generate(output, examples, force).await,
    }
}

fn describe(profile: &AgentProfile) -> String {
    let mut text = profile.vendor.to_string();
    if let Some(model) = &profile.model {
        text.push_str(&format!(" ({})", model));
    }
    if let Some(command) = &profile.command {
        text.push_str(&format!(" → {} {}", command.program, command.args.join(" ")));
    }
    text
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, yaml: bool) -> Result<()> {
    let config = ArenaConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. ARENA_CONFIG_PATH: {}",
            std::env::var("ARENA_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./arena-config.yaml");
        println!("  4. ~/.arena/config.yaml");
        println!("  5. /etc/arena/config.yaml");
        println!();
    }

    if yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Rounds:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Mode: {}", spec.mode);
    println!("  Max rounds: {}", spec.max_rounds);
    println!("  Repository: {}", spec.repository.display());
    println!("  Task file: {}", spec.task_file);
    println!("  State dir: {}", config.state_dir().display());
    println!();

    println!("{}", "Agents:".bold());
    println!("  Workers: {} × {}", spec.workers.count, describe(&spec.workers.profile));
    println!("  Supervisor: {}", describe(&spec.supervisor.profile));
    println!();

    println!("{}", "Timing:".bold());
    println!("  Phase: {:?}", spec.timing.phase_duration);
    println!("  Supervisor timeout: {:?}", spec.timing.supervisor_timeout);
    println!("  Poll interval: {:?}", spec.timing.poll_interval);
    println!("  Closing summary wait: {:?}", spec.timing.closing_summary_wait);
    if let Some(time_box) = spec.timing.autopilot_time_box {
        println!("  Autopilot time box: {:?}", time_box);
    }
    println!();

    println!("{}", "Liveness:".bold());
    println!("  Worker heartbeat: {:?}", spec.liveness.worker_heartbeat);
    println!("  Supervisor heartbeat: {:?}", spec.liveness.supervisor_heartbeat);
    match spec.liveness.max_restarts {
        Some(max) => println!("  Max restarts: {}", max),
        None => println!("  Max restarts: {}", "unbounded".dimmed()),
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ArenaConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
