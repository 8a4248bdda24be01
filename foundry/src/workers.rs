//! The standard background workers and the one-shot scans they run.
//!
//! Audit workers only write tickets; the autonomous planner is the only
//! consumer of tickets.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::core::audit::{
    find_orphans, orphan_projects_ticket, stale_plan_ticket, stale_plans, vanished_projects,
};
use crate::io::project_map::write_project_map;
use crate::io::tickets::{ORPHAN_PROJECTS_TICKET, STALE_PLAN_TICKET};
use crate::supervisor::{BackgroundSupervisor, Worker};
use crate::workspace::Workspace;

/// Result of one stale-plan scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleScan {
    pub stale: Vec<String>,
    pub ticket_created: bool,
}

/// Result of one orphan scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanScan {
    pub orphans: Vec<String>,
    pub ticket_created: bool,
    pub marked_missing: usize,
}

/// Raise `stale_plan.md` for queued plans older than `stale_after_secs`.
#[instrument(skip_all)]
pub fn scan_stale_plans(workspace: &Workspace, now: SystemTime) -> Result<StaleScan> {
    let stale_after = Duration::from_secs(workspace.config.workers.stale_after_secs);
    let stale = stale_plans(&workspace.queue.plan_ages()?, now, stale_after);
    if stale.is_empty() {
        return Ok(StaleScan::default());
    }
    let ticket_created = workspace
        .tickets
        .create(STALE_PLAN_TICKET, &stale_plan_ticket(&stale, stale_after))?;
    info!(count = stale.len(), ticket_created, "stale plans detected");
    Ok(StaleScan {
        stale,
        ticket_created,
    })
}

/// Raise `orphan_projects.md` for unregistered output directories and mark
/// vanished projects `MISSING`.
#[instrument(skip_all)]
pub fn scan_orphans(workspace: &Workspace) -> Result<OrphanScan> {
    let output_dirs = workspace.output_projects()?;
    let manifest = workspace.manifest.load()?;

    let vanished = vanished_projects(&manifest, &output_dirs);
    let marked_missing = workspace.manifest.mark_missing(&vanished)?;

    let orphans = find_orphans(
        &output_dirs,
        &manifest,
        &workspace.config.queue.housekeeping_projects,
    );
    let ticket_created = if orphans.is_empty() {
        false
    } else {
        let created = workspace
            .tickets
            .create(ORPHAN_PROJECTS_TICKET, &orphan_projects_ticket(&orphans))?;
        info!(count = orphans.len(), ticket_created = created, "orphan projects detected");
        created
    };
    Ok(OrphanScan {
        orphans,
        ticket_created,
        marked_missing,
    })
}

/// Regenerate `project_map.md`.
pub fn refresh_project_map(workspace: &Workspace) -> Result<()> {
    let manifest = workspace.manifest.load()?;
    write_project_map(&workspace.paths, &manifest)?;
    debug!("project map refreshed");
    Ok(())
}

/// Consume the highest-priority ticket (if any) and queue a housekeeping plan
/// for it. Returns the queued plan name.
///
/// The ticket is removed before planning, so a planner failure drops it; the
/// audit workers raise it again if the anomaly persists.
#[instrument(skip_all)]
pub fn plan_next_ticket(workspace: &Workspace) -> Result<Option<String>> {
    let Some(ticket) = workspace.tickets.take_next()? else {
        return Ok(None);
    };
    info!(ticket = %ticket.name, "planning fix for ticket");
    workspace.submit_ticket(&ticket).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Duty {
    StaleScan,
    OrphanScan,
    MapRefresh,
    Planner,
}

/// A standard worker: one duty against a shared workspace.
pub struct WorkspaceWorker {
    duty: Duty,
    workspace: Arc<Workspace>,
}

impl WorkspaceWorker {
    pub fn stale_scanner(workspace: Arc<Workspace>) -> Self {
        Self {
            duty: Duty::StaleScan,
            workspace,
        }
    }

    pub fn orphan_scanner(workspace: Arc<Workspace>) -> Self {
        Self {
            duty: Duty::OrphanScan,
            workspace,
        }
    }

    pub fn map_refresher(workspace: Arc<Workspace>) -> Self {
        Self {
            duty: Duty::MapRefresh,
            workspace,
        }
    }

    pub fn autonomous_planner(workspace: Arc<Workspace>) -> Self {
        Self {
            duty: Duty::Planner,
            workspace,
        }
    }
}

impl Worker for WorkspaceWorker {
    fn name(&self) -> &str {
        match self.duty {
            Duty::StaleScan => "stale-scanner",
            Duty::OrphanScan => "orphan-scanner",
            Duty::MapRefresh => "map-refresher",
            Duty::Planner => "autonomous-planner",
        }
    }

    fn interval(&self) -> Duration {
        let workers = &self.workspace.config.workers;
        Duration::from_secs(match self.duty {
            Duty::StaleScan => workers.stale_scan_interval_secs,
            Duty::OrphanScan => workers.orphan_scan_interval_secs,
            Duty::MapRefresh => workers.map_refresh_interval_secs,
            Duty::Planner => workers.planner_interval_secs,
        })
    }

    fn tick(&mut self) -> Result<()> {
        let workspace = &self.workspace;
        match self.duty {
            Duty::StaleScan => scan_stale_plans(workspace, SystemTime::now()).map(drop),
            Duty::OrphanScan => scan_orphans(workspace).map(drop),
            Duty::MapRefresh => refresh_project_map(workspace),
            Duty::Planner => plan_next_ticket(workspace).map(drop),
        }
    }
}

/// Start the four standard workers under `supervisor`.
pub fn spawn_standard_workers(
    supervisor: &mut BackgroundSupervisor,
    workspace: &Arc<Workspace>,
) -> Result<()> {
    supervisor.spawn(WorkspaceWorker::stale_scanner(Arc::clone(workspace)))?;
    supervisor.spawn(WorkspaceWorker::orphan_scanner(Arc::clone(workspace)))?;
    supervisor.spawn(WorkspaceWorker::map_refresher(Arc::clone(workspace)))?;
    supervisor.spawn(WorkspaceWorker::autonomous_planner(Arc::clone(workspace)))?;
    Ok(())
}
