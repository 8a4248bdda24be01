//! Consumes queued plans one at a time and dispatches their tasks to agents.
//!
//! Per plan: queued -> `Running` -> `Completed` or `Failed`, then always:
//! 1. remove the plan file (and its marker),
//! 2. register the project in the manifest (completed, non-housekeeping only),
//! 3. write the plan report.

use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::agents::TaskContext;
use crate::core::types::{Plan, PlanStatus, TaskOutcome};
use crate::error::{ConfigurationError, GeneratorFailure};
use crate::io::confirm::Confirmer;
use crate::io::plan_queue::QueuedPlan;
use crate::io::report::{PlanReport, TaskRecord, write_report};
use crate::workspace::Workspace;

/// Executes queued plans against a workspace.
pub struct PlanExecutor<'a> {
    workspace: &'a Workspace,
    confirmer: &'a dyn Confirmer,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(workspace: &'a Workspace, confirmer: &'a dyn Confirmer) -> Self {
        Self {
            workspace,
            confirmer,
        }
    }

    /// Process the oldest eligible plan, if any.
    pub fn drain_one(&self) -> Result<Option<PlanReport>> {
        let Some(queued) = self.workspace.queue.peek_oldest()? else {
            return Ok(None);
        };
        self.process(&queued).map(Some)
    }

    /// Process plans until the queue has no eligible plan left.
    pub fn drain_all(&self) -> Result<Vec<PlanReport>> {
        let mut reports = Vec::new();
        while let Some(report) = self.drain_one()? {
            reports.push(report);
        }
        Ok(reports)
    }

    #[instrument(skip_all, fields(plan = %queued.name))]
    fn process(&self, queued: &QueuedPlan) -> Result<PlanReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (mut report, description) = match self.workspace.queue.load(queued) {
            Ok(plan) => (self.run_plan(&queued.name, &plan), plan.description),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "malformed plan, discarding");
                let report = PlanReport {
                    plan: queued.name.clone(),
                    project_id: None,
                    status: PlanStatus::Failed,
                    error: Some(format!("{err:#}")),
                    tasks: Vec::new(),
                    started_at,
                    duration_ms: 0,
                };
                (report, String::new())
            }
        };
        report.started_at = started_at;

        self.workspace.queue.remove(&queued.name)?;

        if report.status == PlanStatus::Completed
            && let Some(project_id) = report.project_id.as_deref()
        {
            if self.workspace.is_housekeeping(project_id) {
                info!(project_id, "housekeeping plan, not registering");
            } else {
                let root = self.workspace.resolver.project_root(project_id);
                self.workspace
                    .manifest
                    .register_active(project_id, &root, &description)?;
            }
        }

        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        write_report(&self.workspace.paths.reports_dir, queued.stem(), &report)?;
        info!(
            status = report.status.as_str(),
            failed_tasks = report.failed_tasks(),
            duration_ms = report.duration_ms,
            "plan finished"
        );
        Ok(report)
    }

    fn run_plan(&self, name: &str, plan: &Plan) -> PlanReport {
        let mut status = PlanStatus::Running;
        let mut error_message = None;
        let mut tasks = Vec::with_capacity(plan.action_plan.len());
        let project_map = self.workspace.project_map_text();
        info!(project_id = %plan.project_id, tasks = plan.action_plan.len(), "plan started");

        for (index, task) in plan.action_plan.iter().enumerate() {
            let Some(agent) = self.workspace.registry.get(&task.agent) else {
                warn!(index, agent = %task.agent, "unknown agent");
                status = PlanStatus::Failed;
                tasks.push(TaskRecord {
                    index,
                    agent: task.agent.clone(),
                    outcome: TaskOutcome::failed(format!("unknown agent '{}'", task.agent)),
                });
                continue;
            };

            let ctx = TaskContext {
                project_id: &plan.project_id,
                description: &plan.description,
                task_index: index,
                resolver: &self.workspace.resolver,
                runner: &self.workspace.runner,
                confirmer: self.confirmer,
                generator: self.workspace.generator.as_ref(),
                project_map: project_map.as_deref(),
                git_push: self.workspace.config.execution.git_push,
            };
            match agent.execute(task, &ctx) {
                Ok(outcome) => {
                    if outcome.is_failure() {
                        status = PlanStatus::Failed;
                    }
                    tasks.push(TaskRecord {
                        index,
                        agent: task.agent.clone(),
                        outcome,
                    });
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    if err.downcast_ref::<ConfigurationError>().is_some() {
                        error!(index, %message, "configuration error, aborting plan");
                    } else if err.downcast_ref::<GeneratorFailure>().is_some() {
                        error!(index, %message, "generator failure, aborting plan");
                    } else {
                        error!(index, %message, "unexpected error, aborting plan");
                    }
                    status = PlanStatus::Failed;
                    tasks.push(TaskRecord {
                        index,
                        agent: task.agent.clone(),
                        outcome: TaskOutcome::failed(message.clone()),
                    });
                    error_message = Some(message);
                    break;
                }
            }
        }

        if !status.is_terminal() {
            status = PlanStatus::Completed;
        }
        PlanReport {
            plan: name.to_string(),
            project_id: Some(plan.project_id.clone()),
            status,
            error: error_message,
            tasks,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }
}
