//! Background workers against a real workspace: start, produce tickets and
//! plans, and stop within the shutdown timeout.

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use foundry::io::config::FoundryConfig;
use foundry::io::generator::PlannerReply;
use foundry::supervisor::{BackgroundSupervisor, StopSignal};
use foundry::test_support::{ScriptedGenerator, ScriptedPlanner, TestWorkspace, plan, task};
use foundry::workers::spawn_standard_workers;

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn orphan_directory_becomes_a_housekeeping_plan() {
    let mut config = FoundryConfig::default();
    config.workers.orphan_scan_interval_secs = 1;
    config.workers.planner_interval_secs = 1;
    let fix = plan(
        "ignored",
        vec![task("executor", "register stray", None, Some("true"))],
    );
    let ws = TestWorkspace::with_config(
        config,
        ScriptedGenerator::default(),
        ScriptedPlanner::new([PlannerReply::Structured(fix)]),
    )
    .expect("workspace");
    fs::create_dir_all(ws.workspace.paths.output_dir.join("stray")).expect("mkdir");

    let mut supervisor = BackgroundSupervisor::new(StopSignal::new());
    spawn_standard_workers(&mut supervisor, &ws.workspace).expect("spawn");
    assert_eq!(supervisor.len(), 4);

    let queued = wait_until(Duration::from_secs(10), || {
        !ws.workspace.queue.list().expect("list").is_empty()
    });
    let stragglers = supervisor.shutdown(Duration::from_secs(5));

    assert!(queued, "autonomous planner never queued a plan");
    assert!(stragglers.is_empty());
    let queued = ws.workspace.queue.peek_oldest().expect("peek").expect("plan");
    let loaded = ws.workspace.queue.load(&queued).expect("load");
    assert_eq!(loaded.project_id, "system_maintenance");
    assert!(ws.planner.requests()[0].request.contains("stray"));
    assert!(ws.workspace.project_map_text().is_some());
}

#[test]
fn shutdown_interrupts_long_intervals() {
    let ws = TestWorkspace::new(ScriptedGenerator::default(), ScriptedPlanner::default())
        .expect("workspace");
    let mut supervisor = BackgroundSupervisor::new(StopSignal::new());
    spawn_standard_workers(&mut supervisor, &Arc::clone(&ws.workspace)).expect("spawn");
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let stragglers = supervisor.shutdown(Duration::from_secs(5));
    assert!(stragglers.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));
}
