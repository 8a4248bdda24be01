//! Generator and Planner seams, plus adapters backed by an external command.
//!
//! The orchestrator never talks to a model API. [`CommandGenerator`] and
//! [`CommandPlanner`] render a prompt, pipe it to a configured command (for
//! example an LLM CLI) and read its stdout.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::config::{GeneratorConfig, PlannerConfig};
use super::process::{CommandOutput, run_command_with_timeout};
use super::prompt::PromptBuilder;
use crate::core::reply::{is_failure_sentinel, json_from_reply};
use crate::core::types::Plan;
use crate::error::GeneratorFailure;

/// What the generator is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateKind {
    /// The full contents of one file.
    Code,
    /// A JSON array of file-system actions.
    Actions,
    /// A unified diff against the current contents of one file.
    Patch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub kind: GenerateKind,
    pub agent: String,
    pub project_id: String,
    pub description: String,
    pub task: String,
    pub target_file: Option<String>,
    pub existing_content: Option<String>,
    pub project_map: Option<String>,
}

/// An agent name and a one-line description, shown to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRole {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub request: String,
    pub agents: Vec<AgentRole>,
    pub project_map: Option<String>,
    /// Set for ticket-driven maintenance requests.
    pub housekeeping_project: Option<String>,
}

/// Produces code or action lists for a task.
pub trait Generator: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

/// Turns a natural-language request into a plan.
pub trait Planner: Send + Sync {
    fn create_plan(&self, request: &PlanRequest) -> Result<PlannerReply>;
}

/// A planner answer: either an already structured plan or raw text to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerReply {
    Structured(Plan),
    Text(String),
}

impl PlannerReply {
    /// The plan as a JSON document, ready for queue validation.
    pub fn into_document(self) -> Result<Value> {
        match self {
            PlannerReply::Structured(plan) => {
                serde_json::to_value(plan).context("serialize planner plan")
            }
            PlannerReply::Text(text) => {
                if is_failure_sentinel(&text) {
                    return Err(GeneratorFailure::new(text.trim()).into());
                }
                let json = json_from_reply(&text).ok_or_else(|| {
                    anyhow::Error::new(GeneratorFailure::new("planner reply contains no JSON"))
                })?;
                serde_json::from_str(json).map_err(|err| {
                    anyhow::Error::new(GeneratorFailure::new(format!(
                        "planner reply is not valid JSON: {err}"
                    )))
                })
            }
        }
    }
}

/// External command invocation shared by both adapters.
#[derive(Debug, Clone)]
struct ExternalCommand {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    workdir: PathBuf,
}

impl ExternalCommand {
    fn run(&self, prompt: &str) -> Result<String> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("external command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);

        let output =
            run_command_with_timeout(cmd, Some(prompt.as_bytes()), self.timeout, self.output_limit_bytes)
                .map_err(|err| GeneratorFailure::new(format!("{program}: {err:#}")))?;
        check_output(program, &output)?;

        let text = output.stdout_text();
        if is_failure_sentinel(&text) {
            return Err(GeneratorFailure::new(first_line(&text)).into());
        }
        Ok(text)
    }
}

fn check_output(program: &str, output: &CommandOutput) -> Result<()> {
    if output.timed_out {
        return Err(GeneratorFailure::new(format!("{program} timed out")).into());
    }
    if !output.status.success() {
        let stderr = output.stderr_text();
        return Err(GeneratorFailure::new(format!(
            "{program} exited with {:?}: {}",
            output.status.code(),
            first_line(&stderr)
        ))
        .into());
    }
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default()
}

/// Generator backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: ExternalCommand,
    prompts: PromptBuilder,
}

impl CommandGenerator {
    pub fn new(config: &GeneratorConfig, workdir: impl Into<PathBuf>, output_limit_bytes: usize) -> Self {
        Self {
            command: ExternalCommand {
                argv: config.command.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
                output_limit_bytes,
                workdir: workdir.into(),
            },
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
        }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(agent = %request.agent, kind = ?request.kind))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let prompt = self.prompts.build_generate(request)?;
        debug!(prompt_bytes = prompt.len(), "invoking generator command");
        let reply = self.command.run(&prompt)?;
        info!(reply_bytes = reply.len(), "generator replied");
        Ok(reply)
    }
}

/// Planner backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    command: ExternalCommand,
    prompts: PromptBuilder,
}

impl CommandPlanner {
    pub fn new(config: &PlannerConfig, workdir: impl Into<PathBuf>, output_limit_bytes: usize) -> Self {
        Self {
            command: ExternalCommand {
                argv: config.command.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
                output_limit_bytes,
                workdir: workdir.into(),
            },
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
        }
    }
}

impl Planner for CommandPlanner {
    #[instrument(skip_all)]
    fn create_plan(&self, request: &PlanRequest) -> Result<PlannerReply> {
        let prompt = self.prompts.build_plan(request)?;
        debug!(prompt_bytes = prompt.len(), "invoking planner command");
        let reply = self.command.run(&prompt)?;
        Ok(PlannerReply::Text(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerateRequest {
        GenerateRequest {
            kind: GenerateKind::Code,
            agent: "backend_dev".to_string(),
            project_id: "demo".to_string(),
            description: String::new(),
            task: "hello".to_string(),
            target_file: Some("main.py".to_string()),
            existing_content: None,
            project_map: None,
        }
    }

    fn generator(dir: &std::path::Path, argv: &[&str]) -> CommandGenerator {
        let config = GeneratorConfig {
            command: argv.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            prompt_budget_bytes: 10_000,
        };
        CommandGenerator::new(&config, dir, 10_000)
    }

    #[test]
    fn text_reply_is_parsed_from_fence() {
        let reply = PlannerReply::Text(
            "Sure:\n```json\n{\"project_id\": \"demo\", \"action_plan\": []}\n```".to_string(),
        );
        let doc = reply.into_document().expect("document");
        assert_eq!(doc["project_id"], "demo");
    }

    #[test]
    fn sentinel_reply_is_a_generator_failure() {
        let err = PlannerReply::Text("Error: model overloaded".to_string())
            .into_document()
            .unwrap_err();
        let failure = err.downcast_ref::<GeneratorFailure>().expect("typed");
        assert_eq!(failure.message, "Error: model overloaded");
    }

    #[test]
    fn text_without_json_is_a_generator_failure() {
        let err = PlannerReply::Text("I cannot help".to_string())
            .into_document()
            .unwrap_err();
        assert!(err.downcast_ref::<GeneratorFailure>().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_pipes_prompt_through_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = generator(temp.path(), &["cat"])
            .generate(&request())
            .expect("generate");
        assert!(reply.contains("Target file: `main.py`"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_generator_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = generator(temp.path(), &["sh", "-c", "cat >/dev/null; echo nope >&2; exit 4"])
            .generate(&request())
            .unwrap_err();
        let failure = err.downcast_ref::<GeneratorFailure>().expect("typed");
        assert!(failure.message.contains("nope"), "{}", failure.message);
    }

    #[cfg(unix)]
    #[test]
    fn sentinel_stdout_is_a_generator_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = generator(temp.path(), &["sh", "-c", "cat >/dev/null; echo 'Erro: sem cota'"])
            .generate(&request())
            .unwrap_err();
        let failure = err.downcast_ref::<GeneratorFailure>().expect("typed");
        assert_eq!(failure.message, "Erro: sem cota");
    }
}
