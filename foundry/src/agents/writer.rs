//! Code-writing agent: one generated file per task.

use std::fs;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::{Agent, TaskContext};
use crate::core::reply::{code_from_reply, is_failure_sentinel};
use crate::core::types::{Task, TaskOutcome};
use crate::error::GeneratorFailure;
use crate::io::generator::{GenerateKind, GenerateRequest};

/// Asks the generator for the full contents of `target_file` and writes it.
#[derive(Debug, Clone)]
pub struct WriterAgent {
    role: String,
}

impl WriterAgent {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Agent for WriterAgent {
    fn role(&self) -> &str {
        &self.role
    }

    #[instrument(skip_all, fields(project_id = %ctx.project_id, task_index = ctx.task_index))]
    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome> {
        let Some(target_file) = task.target_file() else {
            info!(agent = %task.agent, "no target_file, treating task as informational");
            return Ok(TaskOutcome::skipped("no target_file; informational task"));
        };
        let path = ctx.resolve(target_file);
        let existing_content = if path.is_file() {
            Some(fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?)
        } else {
            None
        };

        let reply = ctx.generator.generate(&GenerateRequest {
            kind: GenerateKind::Code,
            agent: task.agent.clone(),
            project_id: ctx.project_id.to_string(),
            description: ctx.description.to_string(),
            task: task.task.clone(),
            target_file: Some(target_file.to_string()),
            existing_content,
            project_map: ctx.project_map.map(str::to_string),
        })?;
        if is_failure_sentinel(&reply) {
            return Err(GeneratorFailure::new(reply.trim()).into());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut code = code_from_reply(&reply).to_string();
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        fs::write(&path, &code).with_context(|| format!("write {}", path.display()))?;
        let shown = ctx.relative_to_root(&path).display().to_string();
        info!(file = %shown, bytes = code.len(), "wrote generated file");
        Ok(TaskOutcome::completed(format!("wrote {shown}")))
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

    fn task(target_file: Option<&str>) -> Task {
        Task {
            agent: "backend_dev".to_string(),
            task: "hello world".to_string(),
            target_file: target_file.map(str::to_string),
            command: None,
        }
    }

    fn run(generator: &ScriptedGenerator, resolver: &PathResolver, task: &Task) -> Result<TaskOutcome> {
        let runner = CommandRunner::from_config(&FoundryConfig::default());
        let ctx = TaskContext {
            project_id: "demo",
            description: "",
            task_index: 0,
            resolver,
            runner: &runner,
            confirmer: &DenyAll,
            generator,
            project_map: None,
            git_push: false,
        };
        WriterAgent::new("writes files").execute(task, &ctx)
    }

    #[test]
    fn writes_fenced_code_under_project_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = PathResolver::new(temp.path());
        let generator = ScriptedGenerator::new(["```python\nprint('hi')\n```"]);
        let outcome = run(&generator, &resolver, &task(Some("../src/main.py"))).expect("execute");
        assert!(matches!(outcome, TaskOutcome::Completed { .. }));
        let written = fs::read_to_string(temp.path().join("demo/src/main.py")).expect("read");
        assert_eq!(written, "print('hi')\n");
    }

    #[test]
    fn existing_content_is_sent_to_generator() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = PathResolver::new(temp.path());
        fs::create_dir_all(temp.path().join("demo")).expect("mkdir");
        fs::write(temp.path().join("demo/main.py"), "old").expect("write");
        let generator = ScriptedGenerator::new(["new"]);
        run(&generator, &resolver, &task(Some("main.py"))).expect("execute");
        let requests = generator.requests();
        assert_eq!(requests[0].existing_content.as_deref(), Some("old"));
    }

    #[test]
    fn missing_target_file_is_skipped_without_generating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = PathResolver::new(temp.path());
        let generator = ScriptedGenerator::new(Vec::<String>::new());
        let outcome = run(&generator, &resolver, &task(None)).expect("execute");
        assert!(matches!(outcome, TaskOutcome::Skipped { .. }));
        assert!(generator.requests().is_empty());
    }

    #[test]
    fn sentinel_reply_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolver = PathResolver::new(temp.path());
        let generator = ScriptedGenerator::new(["Erro: limite"]);
        let err = run(&generator, &resolver, &task(Some("main.py"))).unwrap_err();
        assert!(err.downcast_ref::<GeneratorFailure>().is_some());
        assert!(!temp.path().join("demo/main.py").exists());
    }
}
