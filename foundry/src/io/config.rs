//! Orchestrator configuration stored in `foundry.toml` at the workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Configuration file name, relative to the workspace root.
pub const CONFIG_FILE_NAME: &str = "foundry.toml";

/// Orchestrator configuration (TOML).
///
/// This file is intended to be edited by humans. Missing sections and fields
/// fall back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FoundryConfig {
    pub paths: PathsConfig,
    pub queue: QueueConfig,
    pub workers: WorkersConfig,
    pub execution: ExecutionConfig,
    pub safety: SafetyConfig,
    pub generator: GeneratorConfig,
    pub planner: PlannerConfig,
    pub interactive: InteractiveConfig,
}

/// Workspace layout. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub queue_dir: PathBuf,
    pub bugs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub manifest_file: PathBuf,
    pub project_map_file: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("workspace/output"),
            queue_dir: PathBuf::from("workspace/queue"),
            bugs_dir: PathBuf::from("workspace/bugs"),
            reports_dir: PathBuf::from("workspace/reports"),
            manifest_file: PathBuf::from("workspace/manifest.json"),
            project_map_file: PathBuf::from("workspace/project_map.md"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Only consume plans whose `.ready` marker exists.
    pub require_ready_marker: bool,

    /// Project ids used by autonomous maintenance plans. These are never
    /// registered in the manifest nor reported as orphans.
    pub housekeeping_projects: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            require_ready_marker: true,
            housekeeping_projects: vec![
                "system_maintenance".to_string(),
                "housekeeping".to_string(),
            ],
        }
    }
}

impl QueueConfig {
    pub fn is_housekeeping(&self, project_id: &str) -> bool {
        self.housekeeping_projects
            .iter()
            .any(|id| id == project_id)
    }

    /// Project id assigned to plans synthesized from bug tickets.
    pub fn maintenance_project(&self) -> &str {
        self.housekeeping_projects
            .first()
            .map_or("system_maintenance", String::as_str)
    }
}

/// Background worker cadence, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkersConfig {
    /// Start background workers in `foundry run`.
    pub enabled: bool,
    pub stale_scan_interval_secs: u64,
    pub orphan_scan_interval_secs: u64,
    pub map_refresh_interval_secs: u64,
    pub planner_interval_secs: u64,
    /// Queued plans older than this are reported as stale.
    pub stale_after_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_scan_interval_secs: 15,
            orphan_scan_interval_secs: 30,
            map_refresh_interval_secs: 60,
            planner_interval_secs: 20,
            stale_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock limit for a single shell command.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Push after each successful version-control commit.
    pub git_push: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 600,
            output_limit_bytes: 100_000,
            git_push: false,
        }
    }
}

impl ExecutionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SafetyConfig {
    /// Extra destructive patterns appended to the built-in set.
    pub extra_patterns: Vec<String>,
}

/// External command that turns a prompt on stdin into generated content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Prompts larger than this drop optional context sections.
    pub prompt_budget_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            timeout_secs: 600,
            prompt_budget_bytes: 60_000,
        }
    }
}

/// External command that turns a request prompt into a plan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub prompt_budget_bytes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            timeout_secs: 300,
            prompt_budget_bytes: 30_000,
        }
    }
}

fn default_llm_command() -> Vec<String> {
    ["codex", "exec", "--skip-git-repo-check", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InteractiveConfig {
    /// Sleep between main-loop ticks.
    pub tick_millis: u64,

    /// Maximum wait for background workers on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for InteractiveConfig {
    fn default() -> Self {
        Self {
            tick_millis: 100,
            shutdown_timeout_secs: 5,
        }
    }
}

impl FoundryConfig {
    pub fn validate(&self) -> Result<()> {
        let workers = &self.workers;
        for (name, value) in [
            ("workers.stale_scan_interval_secs", workers.stale_scan_interval_secs),
            ("workers.orphan_scan_interval_secs", workers.orphan_scan_interval_secs),
            ("workers.map_refresh_interval_secs", workers.map_refresh_interval_secs),
            ("workers.planner_interval_secs", workers.planner_interval_secs),
            ("workers.stale_after_secs", workers.stale_after_secs),
            ("execution.command_timeout_secs", self.execution.command_timeout_secs),
            ("generator.timeout_secs", self.generator.timeout_secs),
            ("planner.timeout_secs", self.planner.timeout_secs),
            ("interactive.tick_millis", self.interactive.tick_millis),
        ] {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        for (name, value) in [
            ("execution.output_limit_bytes", self.execution.output_limit_bytes),
            ("generator.prompt_budget_bytes", self.generator.prompt_budget_bytes),
            ("planner.prompt_budget_bytes", self.planner.prompt_budget_bytes),
        ] {
            if value == 0 {
                return Err(anyhow!("{name} must be > 0"));
            }
        }
        if !is_usable_command(&self.generator.command) {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if !is_usable_command(&self.planner.command) {
            return Err(anyhow!("planner.command must be a non-empty array"));
        }
        Ok(())
    }
}

fn is_usable_command(command: &[String]) -> bool {
    command.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FoundryConfig::default()`.
pub fn load_config(path: &Path) -> Result<FoundryConfig> {
    if !path.exists() {
        let cfg = FoundryConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FoundryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FoundryConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
