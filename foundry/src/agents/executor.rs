//! Executor agent: runs the task's shell command in the project root.

use anyhow::Result;
use tracing::{info, instrument, warn};

use super::{Agent, TaskContext};
use crate::core::types::{Task, TaskOutcome};
use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorAgent;

impl Agent for ExecutorAgent {
    fn role(&self) -> &str {
        "runs a shell command in the project directory (requires command; {project_id} is substituted)"
    }

    #[instrument(skip_all, fields(project_id = %ctx.project_id, task_index = ctx.task_index))]
    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        let Some(command) = task.render_command(ctx.project_id) else {
            return Err(ConfigurationError {
                task_index: ctx.task_index,
                agent: task.agent.clone(),
                message: "executor task has no command".to_string(),
            }
            .into());
        };

        let report = ctx
            .runner
            .execute_confirmed(&command, &ctx.project_root(), ctx.confirmer)?;
        let summary = report.summary();
        if report.success {
            info!(%summary, "command succeeded");
            Ok(TaskOutcome::completed(summary))
        } else {
            warn!(%summary, stderr = %report.stderr.trim(), "command failed");
            Ok(TaskOutcome::failed(summary))
        }
    }
}
