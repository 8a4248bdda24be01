//! Guarded store for the project manifest (`manifest.json`).
//!
//! Every read-modify-write holds an in-process mutex and an advisory
//! exclusive lock on `manifest.json.lock`, and replaces the document via
//! temp file + rename.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, info};

use crate::core::types::{Manifest, ManifestRecord, ProjectStatus};

pub struct ManifestStore {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Mutex<()>,
}

/// Holds the advisory lock until dropped.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("open lock file {}", path.display()))?;
        fs2::FileExt::lock_exclusive(&file)
            .with_context(|| format!("lock {}", path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self {
            path,
            lock_path,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the manifest. A missing file is an empty manifest.
    pub fn load(&self) -> Result<Manifest> {
        self.with_lock(|| read_manifest(&self.path))
    }

    pub fn get(&self, project_id: &str) -> Result<Option<ManifestRecord>> {
        Ok(self.load()?.remove(project_id))
    }

    /// Apply `change` to the manifest under both locks and persist the result.
    pub fn update<T>(&self, change: impl FnOnce(&mut Manifest) -> T) -> Result<T> {
        self.with_lock(|| {
            let mut manifest = read_manifest(&self.path)?;
            let result = change(&mut manifest);
            write_manifest(&self.path, &manifest)?;
            Ok(result)
        })
    }

    /// Add or overwrite `project_id` as `ACTIVE`, keeping its original creation time.
    pub fn register_active(&self, project_id: &str, path: &Path, description: &str) -> Result<()> {
        let now = Utc::now();
        self.update(|manifest| {
            let created_at = manifest
                .get(project_id)
                .map_or(now, |existing| existing.created_at);
            manifest.insert(
                project_id.to_string(),
                ManifestRecord {
                    path: path.display().to_string(),
                    description: description.to_string(),
                    status: ProjectStatus::Active,
                    created_at,
                    last_accessed: now,
                },
            );
        })?;
        info!(project_id, "project registered");
        Ok(())
    }

    /// Mark the given entries `MISSING`. Returns how many changed.
    pub fn mark_missing(&self, project_ids: &[String]) -> Result<usize> {
        if project_ids.is_empty() {
            return Ok(0);
        }
        let changed = self.update(|manifest| {
            let mut changed = 0;
            for id in project_ids {
                if let Some(record) = manifest.get_mut(id)
                    && record.status != ProjectStatus::Missing
                {
                    record.status = ProjectStatus::Missing;
                    changed += 1;
                }
            }
            changed
        })?;
        debug!(changed, "manifest entries marked missing");
        Ok(changed)
    }

    fn with_lock<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| anyhow!("manifest mutex poisoned"))?;
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let _file_lock = FileLock::acquire(&self.lock_path)?;
        body()
    }
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Manifest::new()),
        Err(err) => return Err(err).with_context(|| format!("read manifest {}", path.display())),
    };
    if contents.trim().is_empty() {
        return Ok(Manifest::new());
    }
    serde_json::from_str(&contents).with_context(|| format!("parse manifest {}", path.display()))
}

fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(manifest).context("serialize manifest")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp manifest {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace manifest {}", path.display()))
}
