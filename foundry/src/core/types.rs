//! Shared plan, task and manifest types.
//!
//! These types define the on-disk contracts for plan files and the manifest.
//! Field names are part of the file format and must stay stable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder substituted with the plan's project id in task commands.
pub const PROJECT_ID_PLACEHOLDER: &str = "{project_id}";

/// A queued build plan: an ordered list of tasks for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub project_id: String,
    #[serde(default)]
    pub description: String,
    pub action_plan: Vec<Task>,
}

/// One unit of work within a plan, assigned to a named agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub agent: String,
    #[serde(default)]
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Task {
    /// Target file, treating blank strings as absent.
    pub fn target_file(&self) -> Option<&str> {
        non_blank(self.target_file.as_deref())
    }

    /// Raw command template, treating blank strings as absent.
    pub fn command(&self) -> Option<&str> {
        non_blank(self.command.as_deref())
    }

    /// Command with every `{project_id}` placeholder substituted.
    pub fn render_command(&self, project_id: &str) -> Option<String> {
        self.command()
            .map(|command| command.replace(PROJECT_ID_PLACEHOLDER, project_id))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Lifecycle of a plan inside the executor. A plan that is still in the
/// queue is pending and has no status yet.
///
/// `Completed` and `Failed` are terminal; both are followed by removal of the
/// plan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Running,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Running => "RUNNING",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Failed => "FAILED",
        }
    }
}

/// Result of dispatching a single task to its agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TaskOutcome {
    /// The agent finished the task.
    Completed { summary: String },
    /// The task was informational or had nothing to do.
    Skipped { reason: String },
    /// The task ran but did not succeed. The plan is marked failed but later
    /// tasks still run.
    Failed { reason: String },
}

impl TaskOutcome {
    pub fn completed(summary: impl Into<String>) -> Self {
        TaskOutcome::Completed {
            summary: summary.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        TaskOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Status of a project registered in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    /// Built by a completed plan and present on disk.
    Active,
    /// Registered, but its directory is no longer present.
    Missing,
}

/// Manifest entry for one output project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub path: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Registry of known output projects keyed by project id.
pub type Manifest = BTreeMap<String, ManifestRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    fn task(command: Option<&str>, target: Option<&str>) -> Task {
        Task {
            agent: "executor".to_string(),
            task: "do it".to_string(),
            target_file: target.map(str::to_string),
            command: command.map(str::to_string),
        }
    }

    #[test]
    fn render_command_substitutes_every_placeholder() {
        let task = task(Some("cd {project_id} && ls {project_id}"), None);
        assert_eq!(
            task.render_command("demo").as_deref(),
            Some("cd demo && ls demo")
        );
    }

    #[test]
    fn only_finished_plans_are_terminal() {
        assert!(!PlanStatus::Running.is_terminal());
        assert!(PlanStatus::Completed.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
    }

    #[test]
    fn blank_fields_are_treated_as_absent() {
        let task = task(Some("   "), Some(""));
        assert_eq!(task.command(), None);
        assert_eq!(task.target_file(), None);
        assert_eq!(task.render_command("demo"), None);
    }

    #[test]
    fn plan_parses_with_optional_fields_missing() {
        let raw = r#"{
            "project_id": "demo",
            "action_plan": [{"agent": "backend_dev", "target_file": "main.py"}]
        }"#;
        let plan: Plan = serde_json::from_str(raw).expect("parse plan");
        assert_eq!(plan.description, "");
        assert_eq!(plan.action_plan[0].task, "");
        assert_eq!(plan.action_plan[0].target_file(), Some("main.py"));
    }

    #[test]
    fn project_status_uses_screaming_case() {
        let json = serde_json::to_string(&ProjectStatus::Active).expect("serialize");
        assert_eq!(json, "\"ACTIVE\"");
    }

    #[test]
    fn task_outcome_is_tagged() {
        let json = serde_json::to_value(TaskOutcome::skipped("no target")).expect("serialize");
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "no target");
    }
}
