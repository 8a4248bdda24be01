//! Action agent: applies a generated list of file-system actions.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{Agent, TaskContext};
use crate::core::action::{Action, action_list, normalize};
use crate::core::path::resolve_within;
use crate::core::reply::{is_failure_sentinel, json_from_reply};
use crate::core::types::{Task, TaskOutcome};
use crate::core::workdir::WorkdirTracker;
use crate::error::GeneratorFailure;
use crate::io::generator::{GenerateKind, GenerateRequest};

/// Asks the generator for a JSON action list and applies it under the project
/// root, in order.
///
/// Unrecognized actions are skipped. A failing shell action marks the task
/// failed but the remaining actions still run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionAgent;

impl Agent for ActionAgent {
    fn role(&self) -> &str {
        "sets up project structure and tooling through create_directory, create_file, append_to_file and execute_shell actions"
    }

    #[instrument(skip_all, fields(project_id = %ctx.project_id, task_index = ctx.task_index))]
    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        let reply = ctx.generator.generate(&GenerateRequest {
            kind: GenerateKind::Actions,
            agent: task.agent.clone(),
            project_id: ctx.project_id.to_string(),
            description: ctx.description.to_string(),
            task: task.task.clone(),
            target_file: task.target_file().map(str::to_string),
            existing_content: None,
            project_map: ctx.project_map.map(str::to_string),
        })?;
        let raw_actions = parse_actions(&reply)?;

        let project_root = ctx.project_root();
        fs::create_dir_all(&project_root)
            .with_context(|| format!("create project root {}", project_root.display()))?;
        let mut tracker = WorkdirTracker::new(&project_root);
        let mut applied = 0usize;
        let mut skipped = 0usize;
        let mut failures = Vec::new();

        for (index, raw) in raw_actions.iter().enumerate() {
            let Some(normalized) = normalize(raw) else {
                warn!(index, action = %raw, "unrecognized action, skipping");
                skipped += 1;
                continue;
            };
            let action = match Action::try_from(normalized) {
                Ok(action) => action,
                Err(err) => {
                    warn!(index, error = %err, "invalid action, skipping");
                    skipped += 1;
                    continue;
                }
            };
            if let Some(failure) = apply(&action, &mut tracker, ctx)? {
                failures.push(failure);
            }
            applied += 1;
        }

        info!(applied, skipped, failed = failures.len(), "actions applied");
        if failures.is_empty() {
            Ok(TaskOutcome::completed(format!(
                "applied {applied} action(s), skipped {skipped}"
            )))
        } else {
            Ok(TaskOutcome::failed(failures.join("; ")))
        }
    }
}

fn parse_actions(reply: &str) -> Result<Vec<Value>> {
    if is_failure_sentinel(reply) {
        return Err(GeneratorFailure::new(reply.trim()).into());
    }
    let json = json_from_reply(reply)
        .ok_or_else(|| anyhow::Error::new(GeneratorFailure::new("action reply contains no JSON")))?;
    let document: Value = serde_json::from_str(json).map_err(|err| {
        anyhow::Error::new(GeneratorFailure::new(format!(
            "action reply is not valid JSON: {err}"
        )))
    })?;
    action_list(&document).ok_or_else(|| {
        anyhow::Error::new(GeneratorFailure::new("action reply is not an action list"))
    })
}

/// Apply one action. Returns a failure description for a shell command that
/// did not succeed.
fn apply(action: &Action, tracker: &mut WorkdirTracker, ctx: &TaskContext<'_>) -> Result<Option<String>> {
    let root = tracker.project_root().to_path_buf();
    match action {
        Action::CreateDirectory { path } => {
            let dir = resolve_within(&root, path);
            fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
            tracker.note_directory(path);
            debug!(dir = %dir.display(), "created directory");
        }
        Action::CreateFile { path, content } => {
            let file = resolve_within(&root, path);
            ensure_parent(&file)?;
            fs::write(&file, content).with_context(|| format!("write {}", file.display()))?;
            tracker.note_file(path);
            debug!(file = %file.display(), "created file");
        }
        Action::AppendToFile { path, content } => {
            let file = resolve_within(&root, path);
            ensure_parent(&file)?;
            let mut handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file)
                .with_context(|| format!("open {}", file.display()))?;
            handle
                .write_all(content.as_bytes())
                .with_context(|| format!("append to {}", file.display()))?;
            tracker.note_file(path);
            debug!(file = %file.display(), "appended to file");
        }
        Action::ExecuteShell { command_line } => {
            let workdir = tracker.workdir_for(command_line);
            let report = ctx
                .runner
                .execute_confirmed(command_line, &workdir, ctx.confirmer)?;
            if !report.success {
                warn!(summary = %report.summary(), "shell action failed");
                return Ok(Some(report.summary()));
            }
        }
    }
    Ok(None)
}

fn ensure_parent(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::PathResolver;
    use crate::io::command_runner::CommandRunner;
    use crate::io::config::FoundryConfig;
    use crate::io::confirm::DenyAll;
    use crate::test_support::ScriptedGenerator;

    fn run(root: &Path, reply: &str) -> Result<TaskOutcome> {
        let resolver = PathResolver::new(root);
        let runner = CommandRunner::from_config(&FoundryConfig::default());
        let generator = ScriptedGenerator::new([reply]);
        let ctx = TaskContext {
            project_id: "demo",
            description: "",
            task_index: 0,
            resolver: &resolver,
            runner: &runner,
            confirmer: &DenyAll,
            generator: &generator,
            project_map: None,
            git_push: false,
        };
        let task = Task {
            agent: "devops".to_string(),
            task: "scaffold".to_string(),
            target_file: None,
            command: None,
        };
        ActionAgent.execute(&task, &ctx)
    }

    #[test]
    fn applies_mixed_shapes_and_skips_unknown() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = r#"```json
[
  {"command": "create_directory", "args": {"path": "backend"}},
  {"action": "create_file", "parameters": {"path": "/backend/app.py", "content": "a\n"}},
  {"append_to_file": {"path": "backend/app.py", "content": "b\n"}},
  {"teleport": {"to": "mars"}},
  {"create_file": {"content": "no path"}}
]
```"#;
        let outcome = run(temp.path(), reply).expect("execute");
        assert_eq!(
            outcome,
            TaskOutcome::completed("applied 3 action(s), skipped 2")
        );
        let written = fs::read_to_string(temp.path().join("demo/backend/app.py")).expect("read");
        assert_eq!(written, "a\nb\n");
    }

    #[test]
    fn escaping_paths_stay_inside_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = r#"[{"create_file": {"path": "../../etc/passwd", "content": "x"}}]"#;
        run(temp.path(), reply).expect("execute");
        assert!(temp.path().join("demo/etc/passwd").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn other_commands_run_at_project_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = r#"{"actions": [
  {"create_file": {"path": "web/package.json", "content": "{}"}},
  {"execute_shell": {"cmd": "pwd > where.txt"}}
]}"#;
        run(temp.path(), reply).expect("execute");
        assert!(temp.path().join("demo/where.txt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn failing_shell_action_fails_task_but_later_actions_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = r#"[
  {"execute_shell": {"command_line": "false"}},
  {"create_file": {"path": "after.txt", "content": "x"}}
]"#;
        let outcome = run(temp.path(), reply).expect("execute");
        assert!(outcome.is_failure());
        assert!(temp.path().join("demo/after.txt").is_file());
    }

    #[test]
    fn reply_without_json_is_a_generator_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run(temp.path(), "I would rather not").unwrap_err();
        assert!(err.downcast_ref::<GeneratorFailure>().is_some());
    }
}
