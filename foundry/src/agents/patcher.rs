//! Patch agent: edits one existing file by applying a generated unified diff.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use super::{Agent, TaskContext};
use crate::core::reply::{extract_fenced_block, is_failure_sentinel};
use crate::core::types::{Task, TaskOutcome};
use crate::error::{ConfigurationError, GeneratorFailure};
use crate::io::generator::{GenerateKind, GenerateRequest};

/// Side files `patch` may leave next to the target on a failed apply.
const LEFTOVER_SUFFIXES: &[&str] = &["rej", "orig"];

/// Asks the generator for a diff against `target_file` and applies it with
/// `patch`. A diff that does not apply leaves the file as it was.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatcherAgent;

impl Agent for PatcherAgent {
    fn role(&self) -> &str {
        "changes one existing file by applying a unified diff (requires target_file that already exists)"
    }

    #[instrument(skip_all, fields(project_id = %ctx.project_id, task_index = ctx.task_index))]
    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        let Some(target_file) = task.target_file() else {
            return Err(ConfigurationError {
                task_index: ctx.task_index,
                agent: task.agent.clone(),
                message: "patch task has no target_file".to_string(),
            }
            .into());
        };
        let path = ctx.resolve(target_file);
        let shown = ctx.relative_to_root(&path).display().to_string();
        if !path.is_file() {
            warn!(file = %shown, "patch target does not exist");
            return Ok(TaskOutcome::failed(format!(
                "cannot patch {shown}: file does not exist"
            )));
        }
        let original = fs::read(&path).with_context(|| format!("read {}", path.display()))?;

        let reply = ctx.generator.generate(&GenerateRequest {
            kind: GenerateKind::Patch,
            agent: task.agent.clone(),
            project_id: ctx.project_id.to_string(),
            description: ctx.description.to_string(),
            task: task.task.clone(),
            target_file: Some(target_file.to_string()),
            existing_content: Some(String::from_utf8_lossy(&original).into_owned()),
            project_map: ctx.project_map.map(str::to_string),
        })?;
        if is_failure_sentinel(&reply) {
            return Err(GeneratorFailure::new(reply.trim()).into());
        }
        let Some(diff) = diff_from_reply(&reply) else {
            warn!(file = %shown, "generator returned an empty patch");
            return Ok(TaskOutcome::failed(format!("empty patch for {shown}")));
        };

        let leftovers_before = existing_leftovers(&path);
        let Some(workdir) = path.parent() else {
            return Ok(TaskOutcome::failed(format!("cannot patch {shown}: no parent directory")));
        };
        let target = path.to_string_lossy();
        let report = ctx.runner.execute_program(
            "patch",
            &["--batch", "--forward", "--silent", &target],
            Some(diff.as_bytes()),
            workdir,
        );
        if report.success {
            info!(file = %shown, "patch applied");
            return Ok(TaskOutcome::completed(format!("patched {shown}")));
        }

        fs::write(&path, &original).with_context(|| format!("restore {}", path.display()))?;
        remove_new_leftovers(&path, &leftovers_before);
        let detail = [report.stderr.trim(), report.stdout.trim()]
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        warn!(file = %shown, summary = %report.summary(), %detail, "patch rejected, file restored");
        Ok(TaskOutcome::failed(if detail.is_empty() {
            format!("patch did not apply to {shown}: {}", report.summary())
        } else {
            format!("patch did not apply to {shown}: {detail}")
        }))
    }
}

/// The diff body of a reply, newline-terminated, or `None` when blank.
fn diff_from_reply(reply: &str) -> Option<String> {
    let body = extract_fenced_block(reply).unwrap_or_else(|| reply.trim());
    if body.trim().is_empty() {
        return None;
    }
    let mut diff = body.to_string();
    if !diff.ends_with('\n') {
        diff.push('\n');
    }
    Some(diff)
}

fn leftover_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn existing_leftovers(path: &Path) -> Vec<PathBuf> {
    LEFTOVER_SUFFIXES
        .iter()
        .map(|suffix| leftover_path(path, suffix))
        .filter(|candidate| candidate.exists())
        .collect()
}

fn remove_new_leftovers(path: &Path, before: &[PathBuf]) {
    for suffix in LEFTOVER_SUFFIXES {
        let candidate = leftover_path(path, suffix);
        if candidate.exists()
            && !before.contains(&candidate)
            && let Err(err) = fs::remove_file(&candidate)
        {
            warn!(file = %candidate.display(), %err, "failed to remove patch leftover");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::PathResolver;
    use crate::io::command_runner::CommandRunner;
    use crate::io::config::FoundryConfig;
    use crate::io::confirm::DenyAll;
    use crate::test_support::ScriptedGenerator;

    const ORIGINAL: &str = "def greet():\n    return 'hello'\n\nprint(greet())\n";

    const GOOD_DIFF: &str = "```diff\n--- a/main.py\n+++ b/main.py\n@@ -1,4 +1,4 @@\n def greet():\n-    return 'hello'\n+    return 'hello, world'\n \n print(greet())\n```";

    const STALE_DIFF: &str = "```diff\n--- a/main.py\n+++ b/main.py\n@@ -1,4 +1,4 @@\n def salute():\n-    return 'hi'\n+    return 'hey'\n \n print(salute())\n```";

    fn patch_available() -> bool {
        which::which("patch").is_ok()
    }

    fn task(target_file: Option<&str>) -> Task {
        Task {
            agent: "patcher".to_string(),
            task: "greet the world".to_string(),
            target_file: target_file.map(str::to_string),
            command: None,
        }
    }

    fn run(root: &Path, generator: &ScriptedGenerator, task: &Task) -> Result<TaskOutcome> {
        let resolver = PathResolver::new(root);
        let runner = CommandRunner::from_config(&FoundryConfig::default());
        let ctx = TaskContext {
            project_id: "demo",
            description: "",
            task_index: 1,
            resolver: &resolver,
            runner: &runner,
            confirmer: &DenyAll,
            generator,
            project_map: None,
            git_push: false,
        };
        PatcherAgent.execute(task, &ctx)
    }

    fn seed(root: &Path) -> PathBuf {
        let dir = root.join("demo");
        fs::create_dir_all(&dir).expect("mkdir");
        let file = dir.join("main.py");
        fs::write(&file, ORIGINAL).expect("write");
        file
    }

    #[test]
    fn diff_is_applied_to_existing_file() {
        if !patch_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let file = seed(temp.path());
        let generator = ScriptedGenerator::new([GOOD_DIFF]);

        let outcome = run(temp.path(), &generator, &task(Some("main.py"))).expect("execute");

        assert!(matches!(outcome, TaskOutcome::Completed { .. }), "{outcome:?}");
        let patched = fs::read_to_string(&file).expect("read");
        assert!(patched.contains("return 'hello, world'"));
        let requests = generator.requests();
        assert_eq!(requests[0].kind, GenerateKind::Patch);
        assert_eq!(requests[0].existing_content.as_deref(), Some(ORIGINAL));
    }

    #[test]
    fn rejected_diff_restores_file_and_fails() {
        if !patch_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let file = seed(temp.path());
        let generator = ScriptedGenerator::new([STALE_DIFF]);

        let outcome = run(temp.path(), &generator, &task(Some("main.py"))).expect("execute");

        let TaskOutcome::Failed { reason } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("patch did not apply to demo/main.py"), "{reason}");
        assert_eq!(fs::read_to_string(&file).expect("read"), ORIGINAL);
        assert!(!temp.path().join("demo/main.py.rej").exists());
        assert!(!temp.path().join("demo/main.py.orig").exists());
    }

    #[test]
    fn missing_file_fails_without_generating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let outcome = run(temp.path(), &generator, &task(Some("absent.py"))).expect("execute");
        assert!(outcome.is_failure());
        assert!(generator.requests().is_empty());
        assert!(!temp.path().join("demo").exists());
    }

    #[test]
    fn missing_target_file_is_a_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let err = run(temp.path(), &generator, &task(None)).unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn blank_reply_is_a_failed_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = seed(temp.path());
        let generator = ScriptedGenerator::new(["```diff\n```"]);
        let outcome = run(temp.path(), &generator, &task(Some("main.py"))).expect("execute");
        assert!(outcome.is_failure());
        assert_eq!(fs::read_to_string(&file).expect("read"), ORIGINAL);
    }

    #[test]
    fn diff_body_is_newline_terminated() {
        assert_eq!(
            diff_from_reply("```diff\n--- a/x\n+++ b/x\n```").as_deref(),
            Some("--- a/x\n+++ b/x\n")
        );
        assert_eq!(diff_from_reply("   "), None);
    }
}
