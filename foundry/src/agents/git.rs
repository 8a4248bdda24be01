//! Version-control agent: commits everything in the project directory.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::{Agent, TaskContext};
use crate::core::types::{Task, TaskOutcome};
use crate::io::git::{CommitOutcome, Git};

#[derive(Debug, Clone, Copy, Default)]
pub struct GitAgent;

impl Agent for GitAgent {
    fn role(&self) -> &str {
        "stages and commits all project changes, using the task text as commit message"
    }

    #[instrument(skip_all, fields(project_id = %ctx.project_id, task_index = ctx.task_index))]
    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        let root = ctx.project_root();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create project root {}", root.display()))?;
        let message = match task.task.trim() {
            "" => format!("Update {}", ctx.project_id),
            text => text.to_string(),
        };
        commit(&Git::new(root), &message, ctx.git_push)
    }
}

/// Commit all changes in `git`'s work tree, initializing it if needed.
///
/// Git errors are task failures, not plan aborts.
pub fn commit(git: &Git, message: &str, push: bool) -> Result<TaskOutcome> {
    if let Err(err) = git.ensure_repository() {
        return Ok(TaskOutcome::failed(format!("{err:#}")));
    }
    let outcome = match git.commit_all(message) {
        Ok(outcome) => outcome,
        Err(err) => return Ok(TaskOutcome::failed(format!("{err:#}"))),
    };
    let summary = match outcome {
        CommitOutcome::NothingToCommit => {
            info!("nothing to commit");
            return Ok(TaskOutcome::skipped("nothing to commit"));
        }
        CommitOutcome::Committed { summary } => summary,
    };
    if push && let Err(err) = git.push() {
        return Ok(TaskOutcome::failed(format!("committed ({summary}) but push failed: {err:#}")));
    }
    info!(%summary, pushed = push, "committed changes");
    Ok(TaskOutcome::completed(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    #[test]
    fn commit_reports_nothing_to_commit_as_skipped() {
        if which::which("git").is_err() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.ensure_repository().expect("init");
        for (key, value) in [("user.name", "Foundry Test"), ("user.email", "foundry@example.com")] {
            Command::new("git")
                .args(["config", key, value])
                .current_dir(temp.path())
                .status()
                .expect("git config");
        }

        fs::write(temp.path().join("README.md"), "# demo\n").expect("write");
        let outcome = commit(&git, "Initial commit", false).expect("commit");
        assert!(matches!(outcome, TaskOutcome::Completed { .. }));

        let outcome = commit(&git, "Again", false).expect("commit");
        assert_eq!(outcome, TaskOutcome::skipped("nothing to commit"));
    }

    #[test]
    fn push_without_remote_is_a_failed_task() {
        if which::which("git").is_err() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.ensure_repository().expect("init");
        for (key, value) in [("user.name", "Foundry Test"), ("user.email", "foundry@example.com")] {
            Command::new("git")
                .args(["config", key, value])
                .current_dir(temp.path())
                .status()
                .expect("git config");
        }
        fs::write(temp.path().join("a.txt"), "a").expect("write");
        let outcome = commit(&git, "add a", true).expect("commit");
        assert!(outcome.is_failure());
    }
}
