//! Test-only fakes for the Generator, Planner and Confirmer seams, plus a
//! throwaway workspace.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{Plan, Task};
use crate::io::config::FoundryConfig;
use crate::io::confirm::Confirmer;
use crate::io::generator::{GenerateRequest, Generator, PlanRequest, Planner, PlannerReply};
use crate::workspace::Workspace;

/// Returns canned replies in order; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator has no reply left"))
    }
}

/// Returns canned planner replies in order; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    replies: Mutex<VecDeque<PlannerReply>>,
    requests: Mutex<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn new(replies: impl IntoIterator<Item = PlannerReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Planner for ScriptedPlanner {
    fn create_plan(&self, request: &PlanRequest) -> Result<PlannerReply> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow!("scripted planner has no reply left"))
    }
}

/// Answers confirmations from a fixed list, then declines.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Commands that were put up for confirmation.
    pub fn asked(&self) -> Vec<String> {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, command: &str, _reason: &str) -> bool {
        self.asked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(false)
    }
}

/// Build a plan with `project_id` and the given tasks.
pub fn plan(project_id: &str, tasks: Vec<Task>) -> Plan {
    Plan {
        project_id: project_id.to_string(),
        description: format!("{project_id} description"),
        action_plan: tasks,
    }
}

/// Build a task for `agent`.
pub fn task(agent: &str, text: &str, target_file: Option<&str>, command: Option<&str>) -> Task {
    Task {
        agent: agent.to_string(),
        task: text.to_string(),
        target_file: target_file.map(str::to_string),
        command: command.map(str::to_string),
    }
}

/// A workspace rooted in a temporary directory with scripted collaborators.
pub struct TestWorkspace {
    pub workspace: Arc<Workspace>,
    pub generator: Arc<ScriptedGenerator>,
    pub planner: Arc<ScriptedPlanner>,
    _dir: TempDir,
}

impl TestWorkspace {
    pub fn new(generator: ScriptedGenerator, planner: ScriptedPlanner) -> Result<Self> {
        Self::with_config(FoundryConfig::default(), generator, planner)
    }

    pub fn with_config(
        config: FoundryConfig,
        generator: ScriptedGenerator,
        planner: ScriptedPlanner,
    ) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let generator = Arc::new(generator);
        let planner = Arc::new(planner);
        let workspace = Workspace::with_services(
            dir.path(),
            config,
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::clone(&planner) as Arc<dyn Planner>,
        )?;
        Ok(Self {
            workspace: Arc::new(workspace),
            generator,
            planner,
            _dir: dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.workspace.paths.root
    }
}
