//! The shared services bundle every orchestration entry point works against.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::agents::AgentRegistry;
use crate::core::path::PathResolver;
use crate::core::selector::ticket_kind;
use crate::io::command_runner::CommandRunner;
use crate::io::config::{CONFIG_FILE_NAME, FoundryConfig, load_config};
use crate::io::generator::{CommandGenerator, CommandPlanner, Generator, PlanRequest, Planner};
use crate::io::init::WorkspacePaths;
use crate::io::manifest::ManifestStore;
use crate::io::plan_queue::PlanQueue;
use crate::io::prompt::ticket_request;
use crate::io::tickets::{Ticket, TicketBoard};

/// Config, stores and collaborators for one workspace root.
///
/// Shared across threads behind an `Arc`; every store serializes its own
/// access.
pub struct Workspace {
    pub config: FoundryConfig,
    pub paths: WorkspacePaths,
    pub queue: PlanQueue,
    pub manifest: ManifestStore,
    pub tickets: TicketBoard,
    pub runner: CommandRunner,
    pub resolver: PathResolver,
    pub registry: AgentRegistry,
    pub generator: Arc<dyn Generator>,
    pub planner: Arc<dyn Planner>,
}

/// Snapshot for the `status` verb and CLI command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub queued_plans: usize,
    pub ready_plans: usize,
    pub projects: usize,
    pub tickets: Vec<String>,
}

impl Workspace {
    /// Load `foundry.toml` (or `config_path`) and wire the command-backed
    /// generator and planner.
    pub fn open(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path.map_or_else(|| root.join(CONFIG_FILE_NAME), Path::to_path_buf);
        let config = load_config(&config_path)?;
        let output_limit = config.execution.output_limit_bytes;
        let generator = CommandGenerator::new(&config.generator, root, output_limit);
        let planner = CommandPlanner::new(&config.planner, root, output_limit);
        let mut workspace =
            Self::with_services(root, config, Arc::new(generator), Arc::new(planner))?;
        workspace.paths.config_path = config_path;
        Ok(workspace)
    }

    /// Build a workspace around explicit collaborators. Creates the layout.
    pub fn with_services(
        root: &Path,
        config: FoundryConfig,
        generator: Arc<dyn Generator>,
        planner: Arc<dyn Planner>,
    ) -> Result<Self> {
        config.validate()?;
        let paths = WorkspacePaths::resolve(root, &config.paths);
        paths
            .ensure_layout()
            .with_context(|| format!("prepare workspace {}", root.display()))?;
        Ok(Self {
            queue: PlanQueue::new(&paths.queue_dir, config.queue.require_ready_marker)?,
            manifest: ManifestStore::new(&paths.manifest_path),
            tickets: TicketBoard::new(&paths.bugs_dir),
            runner: CommandRunner::from_config(&config),
            resolver: PathResolver::new(&paths.output_dir),
            registry: AgentRegistry::standard(),
            generator,
            planner,
            paths,
            config,
        })
    }

    pub fn is_housekeeping(&self, project_id: &str) -> bool {
        self.config.queue.is_housekeeping(project_id)
    }

    /// Last written project map, if any.
    pub fn project_map_text(&self) -> Option<String> {
        fs::read_to_string(&self.paths.project_map_path)
            .ok()
            .filter(|text| !text.trim().is_empty())
    }

    /// Names of the directories directly under the output root.
    pub fn output_projects(&self) -> Result<Vec<String>> {
        list_directories(&self.paths.output_dir)
    }

    /// Ask the planner for a plan for `request` and queue it.
    #[instrument(skip_all)]
    pub fn submit_request(&self, request: &str) -> Result<String> {
        self.plan_and_enqueue(request, None)
    }

    /// Turn a bug ticket into a housekeeping plan and queue it.
    ///
    /// The plan's project id is forced to the maintenance project so it is
    /// never registered in the manifest.
    #[instrument(skip_all, fields(ticket = %ticket.name))]
    pub fn submit_ticket(&self, ticket: &Ticket) -> Result<String> {
        let request = ticket_request(ticket_kind(&ticket.name), &ticket.name, &ticket.body)?;
        let maintenance = self.config.queue.maintenance_project().to_string();
        self.plan_and_enqueue(&request, Some(maintenance))
    }

    fn plan_and_enqueue(&self, request: &str, housekeeping: Option<String>) -> Result<String> {
        let plan_request = PlanRequest {
            request: request.to_string(),
            agents: self.registry.roles(),
            project_map: self.project_map_text(),
            housekeeping_project: housekeeping.clone(),
        };
        let document = self.planner.create_plan(&plan_request)?.into_document()?;
        let mut plan = self.queue.validate_value(&document)?;
        if let Some(project_id) = housekeeping {
            plan.project_id = project_id;
        }
        let name = self.queue.enqueue_plan(&plan)?;
        info!(plan = %name, project_id = %plan.project_id, tasks = plan.action_plan.len(), "plan queued");
        Ok(name)
    }

    pub fn status(&self) -> Result<WorkspaceStatus> {
        let queued = self.queue.list()?;
        let ready_plans = queued.iter().filter(|name| self.queue.is_ready(name)).count();
        Ok(WorkspaceStatus {
            queued_plans: queued.len(),
            ready_plans,
            projects: self.manifest.load()?.len(),
            tickets: self.tickets.list_names()?,
        })
    }
}

fn list_directories(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read directory {}", dir.display())),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && !name.starts_with('.')
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::STALE_PLAN_TICKET;
    use crate::error::PlanRejected;
    use crate::io::generator::PlannerReply;
    use crate::test_support::{ScriptedGenerator, ScriptedPlanner, TestWorkspace, plan, task};

    #[test]
    fn submit_request_queues_a_ready_plan() {
        let demo = plan("demo", vec![task("backend_dev", "hello", Some("main.py"), None)]);
        let ws = TestWorkspace::new(
            ScriptedGenerator::default(),
            ScriptedPlanner::new([PlannerReply::Structured(demo.clone())]),
        )
        .expect("workspace");

        let name = ws.workspace.submit_request("build a demo").expect("submit");
        assert!(ws.workspace.queue.is_ready(&name));
        let queued = ws.workspace.queue.peek_oldest().expect("peek").expect("plan");
        assert_eq!(ws.workspace.queue.load(&queued).expect("load"), demo);

        let requests = ws.planner.requests();
        assert_eq!(requests[0].request, "build a demo");
        assert!(requests[0].agents.iter().any(|role| role.name == "executor"));
        assert!(requests[0].housekeeping_project.is_none());
    }

    #[test]
    fn empty_plan_from_planner_is_rejected_and_not_queued() {
        let reply = PlannerReply::Text(r#"{"project_id": "demo", "action_plan": []}"#.to_string());
        let ws = TestWorkspace::new(ScriptedGenerator::default(), ScriptedPlanner::new([reply]))
            .expect("workspace");
        let err = ws.workspace.submit_request("nothing").unwrap_err();
        assert!(err.downcast_ref::<PlanRejected>().is_some());
        assert!(ws.workspace.queue.list().expect("list").is_empty());
    }

    #[test]
    fn ticket_plans_use_the_maintenance_project() {
        let fix = plan("whatever", vec![task("executor", "clean", None, Some("true"))]);
        let ws = TestWorkspace::new(
            ScriptedGenerator::default(),
            ScriptedPlanner::new([PlannerReply::Structured(fix)]),
        )
        .expect("workspace");
        let ticket = Ticket {
            name: STALE_PLAN_TICKET.to_string(),
            body: "- plan_1.json\n".to_string(),
        };
        ws.workspace.submit_ticket(&ticket).expect("submit");

        let queued = ws.workspace.queue.peek_oldest().expect("peek").expect("plan");
        let loaded = ws.workspace.queue.load(&queued).expect("load");
        assert_eq!(loaded.project_id, "system_maintenance");
        let requests = ws.planner.requests();
        assert!(requests[0].request.contains("plan_1.json"));
        assert_eq!(
            requests[0].housekeeping_project.as_deref(),
            Some("system_maintenance")
        );
    }

    #[test]
    fn status_counts_queue_manifest_and_tickets() {
        let ws = TestWorkspace::new(ScriptedGenerator::default(), ScriptedPlanner::default())
            .expect("workspace");
        let workspace = &ws.workspace;
        workspace
            .queue
            .enqueue_plan(&plan("a", vec![task("executor", "x", None, Some("true"))]))
            .expect("enqueue");
        workspace
            .manifest
            .register_active("a", &ws.root().join("workspace/output/a"), "")
            .expect("register");
        workspace.tickets.create(STALE_PLAN_TICKET, "body").expect("ticket");

        let status = workspace.status().expect("status");
        assert_eq!(
            status,
            WorkspaceStatus {
                queued_plans: 1,
                ready_plans: 1,
                projects: 1,
                tickets: vec![STALE_PLAN_TICKET.to_string()],
            }
        );
    }

    #[test]
    fn output_projects_lists_visible_directories() {
        let ws = TestWorkspace::new(ScriptedGenerator::default(), ScriptedPlanner::default())
            .expect("workspace");
        let output = &ws.workspace.paths.output_dir;
        fs::create_dir_all(output.join("b")).expect("mkdir");
        fs::create_dir_all(output.join("a")).expect("mkdir");
        fs::create_dir_all(output.join(".git")).expect("mkdir");
        fs::write(output.join("notes.txt"), "x").expect("write");
        assert_eq!(ws.workspace.output_projects().expect("list"), vec!["a", "b"]);
    }
}
