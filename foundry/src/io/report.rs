//! Per-plan execution reports under the reports directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{PlanStatus, TaskOutcome};

/// Outcome of one task, as recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub index: usize,
    pub agent: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// Everything known about one processed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanReport {
    pub plan: String,
    /// Absent when the plan file could not be parsed.
    pub project_id: Option<String>,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tasks: Vec<TaskRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PlanReport {
    pub fn failed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.outcome.is_failure())
            .count()
    }

    /// One line for console output.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} [{}] project={} tasks={} failed={}",
            self.plan,
            self.status.as_str(),
            self.project_id.as_deref().unwrap_or("-"),
            self.tasks.len(),
            self.failed_tasks()
        );
        if let Some(error) = &self.error {
            line.push_str(&format!(" error: {error}"));
        }
        line
    }
}

/// Write `<reports_dir>/<stem>.json` atomically. Returns the path.
pub fn write_report(reports_dir: &Path, stem: &str, report: &PlanReport) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;
    let path = reports_dir.join(format!("{stem}.json"));
    let tmp_path = reports_dir.join(format!(".{stem}.json.tmp"));
    let mut buf = serde_json::to_string_pretty(report).context("serialize report")?;
    buf.push('\n');
    fs::write(&tmp_path, buf).with_context(|| format!("write temp report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("publish report {}", path.display()))?;
    Ok(path)
}

pub fn read_report(path: &Path) -> Result<PlanReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
}
