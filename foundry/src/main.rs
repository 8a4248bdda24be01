//! `foundry`: multi-agent build orchestrator.
//!
//! Turns natural-language requests into queued plans, executes them through a
//! registry of agents, and keeps background audit workers running while an
//! interactive session is open.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use foundry::core::types::PlanStatus;
use foundry::exit_codes;
use foundry::interactive::{InteractiveLoop, spawn_stdin_reader};
use foundry::io::confirm::{ApproveAll, Confirmer, DenyAll};
use foundry::io::init::{InitOptions, init_workspace};
use foundry::logging;
use foundry::plan_executor::PlanExecutor;
use foundry::supervisor::{BackgroundSupervisor, StopSignal};
use foundry::workers::{refresh_project_map, scan_orphans, scan_stale_plans, spawn_standard_workers};
use foundry::workspace::Workspace;

#[derive(Parser)]
#[command(name = "foundry", version, about = "Multi-agent build orchestrator")]
struct Cli {
    /// Workspace root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to `<root>/foundry.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the workspace layout and a default `foundry.toml`.
    Init {
        /// Overwrite an existing `foundry.toml`.
        #[arg(short, long)]
        force: bool,
    },
    /// Interactive session with background workers.
    Run {
        /// Do not start background workers.
        #[arg(long)]
        no_workers: bool,
    },
    /// Validate a plan file and add it to the queue.
    Enqueue { file: PathBuf },
    /// Execute every ready plan, then exit.
    Drain {
        /// Approve flagged commands without asking.
        #[arg(long)]
        assume_yes: bool,
    },
    /// Print the safety verdict for a shell command.
    Classify { command: String },
    /// Run the stale, orphan and map scans once.
    Audit,
    /// Show queue, manifest and ticket counts.
    Status,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => {
            logging::init(None)?;
            cmd_init(&cli.root, force)
        }
        Command::Classify { command } => {
            logging::init(None)?;
            cmd_classify(&cli.root, cli.config.as_deref(), &command)
        }
        command => {
            let workspace = Workspace::open(&cli.root, cli.config.as_deref())?;
            logging::init(Some(&workspace.paths.log_dir))?;
            match command {
                Command::Run { no_workers } => cmd_run(workspace, no_workers),
                Command::Enqueue { file } => cmd_enqueue(&workspace, &file),
                Command::Drain { assume_yes } => cmd_drain(&workspace, assume_yes),
                Command::Audit => cmd_audit(&workspace),
                Command::Status => cmd_status(&workspace),
                Command::Init { .. } | Command::Classify { .. } => Ok(exit_codes::INVALID),
            }
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_workspace(root, &InitOptions { force })?;
    println!("initialized {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_classify(root: &Path, config: Option<&Path>, command: &str) -> Result<i32> {
    let config_path = config.map_or_else(
        || root.join(foundry::io::config::CONFIG_FILE_NAME),
        Path::to_path_buf,
    );
    let config = foundry::io::config::load_config(&config_path)?;
    let classifier = foundry::core::safety::CommandSafetyClassifier::with_extra_patterns(
        &config.safety.extra_patterns,
    );
    let verdict = classifier.classify(command);
    if verdict.is_safe() {
        println!("SAFE");
        Ok(exit_codes::OK)
    } else {
        println!("NEEDS_CONFIRMATION: {}", verdict.reason);
        Ok(exit_codes::NEEDS_CONFIRMATION)
    }
}

fn cmd_run(workspace: Workspace, no_workers: bool) -> Result<i32> {
    let workspace = Arc::new(workspace);
    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.stop()).context("install Ctrl-C handler")?;

    let mut supervisor = BackgroundSupervisor::new(stop.clone());
    if workspace.config.workers.enabled && !no_workers {
        spawn_standard_workers(&mut supervisor, &workspace)?;
        info!(workers = supervisor.len(), "background workers started");
    }

    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx, stop.clone())?;
    let result = InteractiveLoop::new(Arc::clone(&workspace), rx, stop).run();

    let timeout = Duration::from_secs(workspace.config.interactive.shutdown_timeout_secs);
    let stragglers = supervisor.shutdown(timeout);
    if !stragglers.is_empty() {
        warn!(workers = ?stragglers, "exiting with workers still running");
    }
    result?;
    println!("bye");
    Ok(exit_codes::OK)
}

fn cmd_enqueue(workspace: &Workspace, file: &Path) -> Result<i32> {
    let json = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let name = workspace.queue.enqueue(&json)?;
    println!("{name}");
    Ok(exit_codes::OK)
}

fn cmd_drain(workspace: &Workspace, assume_yes: bool) -> Result<i32> {
    let confirmer: &dyn Confirmer = if assume_yes { &ApproveAll } else { &DenyAll };
    let reports = PlanExecutor::new(workspace, confirmer).drain_all()?;
    for report in &reports {
        println!("{}", report.summary_line());
    }
    if reports.iter().any(|report| report.status == PlanStatus::Failed) {
        return Ok(exit_codes::PLAN_FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_audit(workspace: &Workspace) -> Result<i32> {
    let stale = scan_stale_plans(workspace, SystemTime::now())?;
    let orphans = scan_orphans(workspace)?;
    refresh_project_map(workspace)?;
    println!(
        "stale plans: {}{}",
        stale.stale.len(),
        if stale.ticket_created { " (ticket created)" } else { "" }
    );
    println!(
        "orphan projects: {}{}",
        orphans.orphans.len(),
        if orphans.ticket_created { " (ticket created)" } else { "" }
    );
    println!("projects marked missing: {}", orphans.marked_missing);
    Ok(exit_codes::OK)
}

fn cmd_status(workspace: &Workspace) -> Result<i32> {
    let status = workspace.status()?;
    println!("queued plans: {} ({} ready)", status.queued_plans, status.ready_plans);
    println!("projects: {}", status.projects);
    println!("tickets: {}", status.tickets.len());
    for ticket in &status.tickets {
        println!("- {ticket}");
    }
    Ok(exit_codes::OK)
}
