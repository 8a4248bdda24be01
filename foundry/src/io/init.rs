//! Workspace layout resolution and `foundry init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{CONFIG_FILE_NAME, FoundryConfig, PathsConfig, write_config};

/// Absolute locations of every directory and file the orchestrator owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub queue_dir: PathBuf,
    pub bugs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub project_map_path: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkspacePaths {
    /// Resolve `paths` against `root`; absolute entries are kept as-is.
    pub fn resolve(root: impl Into<PathBuf>, paths: &PathsConfig) -> Self {
        let root = root.into();
        let join = |path: &Path| root.join(path);
        Self {
            config_path: root.join(CONFIG_FILE_NAME),
            output_dir: join(&paths.output_dir),
            queue_dir: join(&paths.queue_dir),
            bugs_dir: join(&paths.bugs_dir),
            reports_dir: join(&paths.reports_dir),
            manifest_path: join(&paths.manifest_file),
            project_map_path: join(&paths.project_map_file),
            log_dir: join(&paths.log_dir),
            root,
        }
    }

    /// Directories that must exist before the orchestrator runs.
    pub fn directories(&self) -> [&Path; 5] {
        [
            &self.output_dir,
            &self.queue_dir,
            &self.bugs_dir,
            &self.reports_dir,
            &self.log_dir,
        ]
    }

    /// Create every directory (idempotent).
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in self.directories() {
            create_dir(dir)?;
        }
        if let Some(parent) = self.manifest_path.parent() {
            create_dir(parent)?;
        }
        Ok(())
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing `foundry.toml`.
    pub force: bool,
}

/// Create the workspace layout and a default `foundry.toml` in `root`.
///
/// Fails if `foundry.toml` already exists unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<WorkspacePaths> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() && !options.force {
        return Err(anyhow!(
            "foundry init: {CONFIG_FILE_NAME} already exists (use --force to overwrite)"
        ));
    }
    if config_path.is_dir() {
        return Err(anyhow!("foundry init: {CONFIG_FILE_NAME} is a directory"));
    }

    let config = FoundryConfig::default();
    let paths = WorkspacePaths::resolve(root, &config.paths);
    paths.ensure_layout()?;
    write_config(&paths.config_path, &config)?;
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
