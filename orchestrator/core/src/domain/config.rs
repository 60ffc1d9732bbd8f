// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Arena Configuration Types
//
// Defines the configuration schema for an arena run, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Round mode and limits
// - Worker and supervisor CLI profiles
// - Phase timing and liveness settings
// - Observability settings

use crate::domain::adapter::{AgentProfile, Vendor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const API_VERSION: &str = "arena/v1";
pub const KIND: &str = "ArenaConfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoundMode {
    /// Timed competitive rounds with supervisor evaluation and merge.
    #[default]
    Arena,
    /// Workers run to completion and open their own pull requests.
    Autopilot,
}

impl fmt::Display for RoundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundMode::Arena => write!(f, "arena"),
            RoundMode::Autopilot => write!(f, "autopilot"),
        }
    }
}

impl FromStr for RoundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arena" => Ok(RoundMode::Arena),
            "autopilot" => Ok(RoundMode::Autopilot),
            other => Err(format!(
                "unknown mode '{}'. Supported: arena, autopilot",
                other
            )),
        }
    }
}

/// Top-level Kubernetes-style arena configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// API version (must be "arena/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ArenaConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ArenaSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaSpec {
    #[serde(default)]
    pub mode: RoundMode,

    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Main checkout the worktrees are created from
    #[serde(default = "default_repository")]
    pub repository: PathBuf,

    /// Markdown task list, relative to the repository
    #[serde(default = "default_task_file")]
    pub task_file: String,

    /// Logs, worktrees and shared notes; relative paths resolve against the repository
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,

    #[serde(default)]
    pub profile: AgentProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_supervisor_profile")]
    pub profile: AgentProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Length of the Arena working phase
    #[serde(default = "default_phase_duration", with = "humantime_serde")]
    pub phase_duration: Duration,

    /// How long the supervisor may evaluate and merge after workers stop
    #[serde(default = "default_supervisor_timeout", with = "humantime_serde")]
    pub supervisor_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Autopilot: wait for the supervisor's closing summary
    #[serde(default = "default_closing_summary_wait", with = "humantime_serde")]
    pub closing_summary_wait: Duration,

    /// Autopilot: optional upper bound on the single phase
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub autopilot_time_box: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    #[serde(default = "default_worker_heartbeat", with = "humantime_serde")]
    pub worker_heartbeat: Duration,

    #[serde(default = "default_supervisor_heartbeat", with = "humantime_serde")]
    pub supervisor_heartbeat: Duration,

    /// Restart cap per agent; absent means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_max_rounds() -> u32 {
    3
}

fn default_repository() -> PathBuf {
    PathBuf::from(".")
}

fn default_task_file() -> String {
    "TODO.md".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".arena")
}

fn default_worker_count() -> usize {
    2
}

fn default_supervisor_profile() -> AgentProfile {
    AgentProfile::new(Vendor::Claude).with_model("haiku")
}

fn default_phase_duration() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_supervisor_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_closing_summary_wait() -> Duration {
    Duration::from_secs(120)
}

fn default_worker_heartbeat() -> Duration {
    Duration::from_secs(180)
}

fn default_supervisor_heartbeat() -> Duration {
    Duration::from_secs(60)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            profile: AgentProfile::default(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            profile: default_supervisor_profile(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            phase_duration: default_phase_duration(),
            supervisor_timeout: default_supervisor_timeout(),
            poll_interval: default_poll_interval(),
            closing_summary_wait: default_closing_summary_wait(),
            autopilot_time_box: None,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            worker_heartbeat: default_worker_heartbeat(),
            supervisor_heartbeat: default_supervisor_heartbeat(),
            max_restarts: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ArenaSpec {
    fn default() -> Self {
        Self {
            mode: RoundMode::default(),
            max_rounds: default_max_rounds(),
            repository: default_repository(),
            task_file: default_task_file(),
            state_dir: default_state_dir(),
            workers: WorkersConfig::default(),
            supervisor: SupervisorConfig::default(),
            timing: TimingConfig::default(),
            liveness: LivenessConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "arena".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: ArenaSpec::default(),
        }
    }
}

impl ArenaConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ARENA_CONFIG_PATH environment variable
    /// 2. ./arena-config.yaml (working directory)
    /// 3. ~/.arena/config.yaml (user home)
    /// 4. /etc/arena/config.yaml (system, Unix) or C:\ProgramData\Arena\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ARENA_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./arena-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".arena").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/arena/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Arena\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; `apply_env_overrides` passes
    /// the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ARENA_MODE") {
            match val.parse::<RoundMode>() {
                Ok(mode) => {
                    tracing::info!("Environment override: ARENA_MODE={}", mode);
                    self.spec.mode = mode;
                }
                Err(e) => tracing::warn!("Invalid value for ARENA_MODE: {}. Ignoring.", e),
            }
        }

        if let Some(val) = lookup("ARENA_WORKERS") {
            match val.trim().parse::<usize>() {
                Ok(count) => {
                    tracing::info!("Environment override: ARENA_WORKERS={}", count);
                    self.spec.workers.count = count;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for ARENA_WORKERS: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("ARENA_WORKER_VENDOR") {
            match val.parse::<Vendor>() {
                Ok(vendor) => {
                    tracing::info!("Environment override: ARENA_WORKER_VENDOR={}", vendor);
                    switch_vendor(&mut self.spec.workers.profile, vendor);
                }
                Err(e) => tracing::warn!("Invalid value for ARENA_WORKER_VENDOR: {}. Ignoring.", e),
            }
        }

        if let Some(val) = lookup("ARENA_SUPERVISOR_VENDOR") {
            match val.parse::<Vendor>() {
                Ok(vendor) => {
                    tracing::info!("Environment override: ARENA_SUPERVISOR_VENDOR={}", vendor);
                    switch_vendor(&mut self.spec.supervisor.profile, vendor);
                }
                Err(e) => {
                    tracing::warn!("Invalid value for ARENA_SUPERVISOR_VENDOR: {}. Ignoring.", e)
                }
            }
        }

        if let Some(val) = lookup("ARENA_MAX_ROUNDS") {
            match val.trim().parse::<u32>() {
                Ok(rounds) => {
                    tracing::info!("Environment override: ARENA_MAX_ROUNDS={}", rounds);
                    self.spec.max_rounds = rounds;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for ARENA_MAX_ROUNDS: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("ARENA_MAX_RESTARTS") {
            match val.trim().to_lowercase().as_str() {
                "" | "none" | "unbounded" => {
                    tracing::info!("Environment override: ARENA_MAX_RESTARTS=unbounded");
                    self.spec.liveness.max_restarts = None;
                }
                n => match n.parse::<u32>() {
                    Ok(max) => {
                        tracing::info!("Environment override: ARENA_MAX_RESTARTS={}", max);
                        self.spec.liveness.max_restarts = Some(max);
                    }
                    Err(_) => tracing::warn!(
                        "Invalid value for ARENA_MAX_RESTARTS: '{}'. Expected a number. Ignoring.",
                        val
                    ),
                },
            }
        }
    }

    /// State directory resolved against the repository.
    pub fn state_dir(&self) -> PathBuf {
        if self.spec.state_dir.is_absolute() {
            self.spec.state_dir.clone()
        } else {
            self.spec.repository.join(&self.spec.state_dir)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.workers.count == 0 {
            anyhow::bail!("spec.workers.count must be at least 1");
        }

        if self.spec.max_rounds == 0 {
            anyhow::bail!("spec.max_rounds must be at least 1");
        }

        if self.spec.task_file.trim().is_empty() {
            anyhow::bail!("spec.task_file cannot be empty");
        }

        for (role, profile) in [
            ("workers", &self.spec.workers.profile),
            ("supervisor", &self.spec.supervisor.profile),
        ] {
            if profile.vendor == Vendor::Custom {
                match &profile.command {
                    None => anyhow::bail!(
                        "spec.{}.profile.command is required for the custom vendor",
                        role
                    ),
                    Some(cmd) if cmd.program.trim().is_empty() => anyhow::bail!(
                        "spec.{}.profile.command.program cannot be empty",
                        role
                    ),
                    Some(_) => {}
                }
            }
        }

        if self.spec.timing.poll_interval.is_zero() {
            anyhow::bail!("spec.timing.poll_interval must be greater than zero");
        }

        if !matches!(self.spec.observability.log_format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "Invalid observability.log_format: '{}'. Must be 'compact' or 'json'",
                self.spec.observability.log_format
            );
        }

        Ok(())
    }
}

/// A model name rarely carries across vendors, so it is dropped on switch.
fn switch_vendor(profile: &mut AgentProfile, vendor: Vendor) {
    if profile.vendor != vendor {
        profile.vendor = vendor;
        profile.model = None;
    }
}
