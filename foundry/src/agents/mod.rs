//! Agents and the name-keyed registry the plan executor dispatches through.
//!
//! Every agent implements [`Agent::execute`]. A returned `Ok(TaskOutcome)`
//! lets the plan continue (a `Failed` outcome only marks the plan failed);
//! an `Err` aborts the remaining tasks of the plan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::path::PathResolver;
use crate::core::types::{Task, TaskOutcome};
use crate::io::command_runner::CommandRunner;
use crate::io::confirm::Confirmer;
use crate::io::generator::{AgentRole, Generator};

pub mod actions;
pub mod executor;
pub mod git;
pub mod patcher;
pub mod writer;

pub use actions::ActionAgent;
pub use executor::ExecutorAgent;
pub use git::GitAgent;
pub use patcher::PatcherAgent;
pub use writer::WriterAgent;

/// Everything an agent may touch while running one task.
pub struct TaskContext<'a> {
    pub project_id: &'a str,
    pub description: &'a str,
    pub task_index: usize,
    pub resolver: &'a PathResolver,
    pub runner: &'a CommandRunner,
    pub confirmer: &'a dyn Confirmer,
    pub generator: &'a dyn Generator,
    pub project_map: Option<&'a str>,
    pub git_push: bool,
}

impl TaskContext<'_> {
    /// `<output_root>/<project_id>`.
    pub fn project_root(&self) -> PathBuf {
        self.resolver.project_root(self.project_id)
    }

    /// Resolve a plan-supplied relative path inside the project root.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.resolver.resolve(self.project_id, relative_path)
    }

    pub fn relative_to_root<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(self.resolver.output_root()).unwrap_or(path)
    }
}

/// A named capability the plan executor can dispatch a task to.
pub trait Agent: Send + Sync {
    /// One-line description shown to the planner.
    fn role(&self) -> &str;

    fn execute(&self, task: &Task, ctx: &TaskContext<'_>) -> Result<TaskOutcome>;
}

/// Agents keyed by the name plans refer to them with.
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Box<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in agent set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            "backend_dev",
            WriterAgent::new("writes one backend source file (requires target_file)"),
        );
        registry.register(
            "frontend_dev",
            WriterAgent::new("writes one frontend source file (requires target_file)"),
        );
        registry.register("executor", ExecutorAgent);
        registry.register("devops", ActionAgent);
        registry.register("git", GitAgent);
        registry.register("patcher", PatcherAgent);
        registry
    }

    /// Add or replace the agent called `name`.
    pub fn register(&mut self, name: &str, agent: impl Agent + 'static) {
        self.agents.insert(name.to_string(), Box::new(agent));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Agent> {
        self.agents.get(name).map(|agent| agent.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.agents
            .iter()
            .map(|(name, agent)| AgentRole {
                name: name.clone(),
                role: agent.role().to_string(),
            })
            .collect()
    }
}
