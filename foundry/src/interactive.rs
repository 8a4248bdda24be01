//! The interactive session: console input multiplexed with queue draining.
//!
//! Each tick drains at most one ready plan, then takes at most one input line
//! without blocking, then sleeps `tick_millis`. A queued plan therefore always
//! runs before new input is handled.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::agents::git::commit;
use crate::io::confirm::{Confirmer, is_affirmative};
use crate::io::git::Git;
use crate::plan_executor::PlanExecutor;
use crate::supervisor::StopSignal;
use crate::workspace::Workspace;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Exit,
    Run(String),
    Commit(String),
    Status,
    Request(String),
    Empty,
}

/// Map one console line onto a verb. Anything unrecognized is a build request.
pub fn parse_command(line: &str) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Empty;
    }
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));
    match verb.to_lowercase().as_str() {
        "exit" | "quit" if rest.is_empty() => InputCommand::Exit,
        "status" if rest.is_empty() => InputCommand::Status,
        "run" if !rest.is_empty() => InputCommand::Run(rest.to_string()),
        "commit" if !unquote(rest).is_empty() => {
            InputCommand::Commit(unquote(rest).to_string())
        }
        _ => InputCommand::Request(line.to_string()),
    }
}

/// Strip one pair of matching surrounding quotes.
fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}

/// Start the thread that forwards stdin lines into `tx`.
///
/// The thread ends on EOF, on a read error, once the receiver is gone, or on
/// the first line read after `stop` is set. A read blocked on stdin cannot be
/// interrupted, so callers do not join it.
pub fn spawn_stdin_reader(tx: Sender<String>, stop: StopSignal) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("foundry-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if stop.is_stopped() {
                    break;
                }
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("spawn input thread")
}

/// What a non-blocking read produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPoll {
    Line(String),
    Empty,
    Closed,
}

/// Line source shared by the main loop and confirmation prompts.
pub struct InputChannel {
    rx: Mutex<Receiver<String>>,
    stop: StopSignal,
}

impl InputChannel {
    pub fn new(rx: Receiver<String>, stop: StopSignal) -> Self {
        Self {
            rx: Mutex::new(rx),
            stop,
        }
    }

    pub fn try_next(&self) -> InputPoll {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.try_recv() {
            Ok(line) => InputPoll::Line(line),
            Err(TryRecvError::Empty) => InputPoll::Empty,
            Err(TryRecvError::Disconnected) => InputPoll::Closed,
        }
    }

    /// Block for the next line until input closes or the session stops.
    pub fn next_blocking(&self) -> Option<String> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.stop.is_stopped() {
                return None;
            }
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(line) => return Some(line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Asks on stdout and reads the answer from the session's input channel.
pub struct ChannelConfirmer<'a> {
    input: &'a InputChannel,
}

impl<'a> ChannelConfirmer<'a> {
    pub fn new(input: &'a InputChannel) -> Self {
        Self { input }
    }
}

impl Confirmer for ChannelConfirmer<'_> {
    fn confirm(&self, command: &str, reason: &str) -> bool {
        print!("Command flagged ({reason}): {command}\nRun anyway? [y/N] ");
        let _ = io::stdout().flush();
        let approved = self.input.next_blocking().is_some_and(|answer| is_affirmative(&answer));
        info!(command, approved, "confirmation answered");
        approved
    }
}

/// Main-thread loop of `foundry run`.
pub struct InteractiveLoop {
    workspace: Arc<Workspace>,
    input: InputChannel,
    stop: StopSignal,
}

impl InteractiveLoop {
    pub fn new(workspace: Arc<Workspace>, rx: Receiver<String>, stop: StopSignal) -> Self {
        Self {
            workspace,
            input: InputChannel::new(rx, stop.clone()),
            stop,
        }
    }

    /// Run until `exit`/`quit`, end of input, or the stop signal.
    ///
    /// Sets the stop signal on the way out.
    pub fn run(&self) -> Result<()> {
        let tick = Duration::from_millis(self.workspace.config.interactive.tick_millis);
        println!("foundry ready. Describe what to build, or: run <cmd>, commit <msg>, status, exit");
        loop {
            if self.stop.is_stopped() {
                info!("stop requested");
                break;
            }
            self.drain_one();
            match self.input.try_next() {
                InputPoll::Line(line) => {
                    if self.handle(&line) {
                        break;
                    }
                }
                InputPoll::Closed => {
                    info!("input closed");
                    break;
                }
                InputPoll::Empty => {}
            }
            if self.stop.wait_timeout(tick) {
                break;
            }
        }
        self.stop.stop();
        Ok(())
    }

    fn drain_one(&self) {
        let confirmer = ChannelConfirmer::new(&self.input);
        match PlanExecutor::new(&self.workspace, &confirmer).drain_one() {
            Ok(Some(report)) => println!("{}", report.summary_line()),
            Ok(None) => {}
            Err(err) => {
                error!(error = %format!("{err:#}"), "plan processing failed");
                println!("plan processing failed: {err:#}");
            }
        }
    }

    /// Handle one line. Returns true when the session should end.
    fn handle(&self, line: &str) -> bool {
        let result = match parse_command(line) {
            InputCommand::Exit => return true,
            InputCommand::Empty => Ok(()),
            InputCommand::Status => self.print_status(),
            InputCommand::Run(command) => self.run_command(&command),
            InputCommand::Commit(message) => self.commit(&message),
            InputCommand::Request(request) => self
                .workspace
                .submit_request(&request)
                .map(|name| println!("queued {name}")),
        };
        if let Err(err) = result {
            error!(error = %format!("{err:#}"), "command failed");
            println!("error: {err:#}");
        }
        false
    }

    fn print_status(&self) -> Result<()> {
        let status = self.workspace.status()?;
        println!(
            "queue: {} plan(s) ({} ready), projects: {}, tickets: {}",
            status.queued_plans,
            status.ready_plans,
            status.projects,
            if status.tickets.is_empty() {
                "none".to_string()
            } else {
                status.tickets.join(", ")
            }
        );
        Ok(())
    }

    fn run_command(&self, command: &str) -> Result<()> {
        let confirmer = ChannelConfirmer::new(&self.input);
        let report = self.workspace.runner.execute_confirmed(
            command,
            &self.workspace.paths.root,
            &confirmer,
        )?;
        if !report.stdout.is_empty() {
            print!("{}", report.stdout);
        }
        if !report.stderr.is_empty() {
            eprint!("{}", report.stderr);
        }
        println!("{}", report.summary());
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let git = Git::new(&self.workspace.paths.output_dir);
        let outcome = commit(&git, message, self.workspace.config.execution.git_push)?;
        println!("{outcome:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::core::types::ProjectStatus;
    use crate::io::config::FoundryConfig;
    use crate::io::generator::PlannerReply;
    use crate::test_support::{ScriptedGenerator, ScriptedPlanner, TestWorkspace, plan, task};

    fn fast_config() -> FoundryConfig {
        let mut config = FoundryConfig::default();
        config.interactive.tick_millis = 1;
        config
    }

    fn feed(lines: &[&str]) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            tx.send((*line).to_string()).expect("send");
        }
        rx
    }

    #[test]
    fn parses_verbs() {
        assert_eq!(parse_command("  QUIT "), InputCommand::Exit);
        assert_eq!(parse_command("exit"), InputCommand::Exit);
        assert_eq!(parse_command("status"), InputCommand::Status);
        assert_eq!(parse_command("run ls -la"), InputCommand::Run("ls -la".to_string()));
        assert_eq!(
            parse_command("commit Add readme"),
            InputCommand::Commit("Add readme".to_string())
        );
        assert_eq!(parse_command(""), InputCommand::Empty);
    }

    #[test]
    fn commit_message_loses_surrounding_quotes() {
        assert_eq!(
            parse_command(r#"commit "Fix bug""#),
            InputCommand::Commit("Fix bug".to_string())
        );
        assert_eq!(
            parse_command("commit 'Fix bug'"),
            InputCommand::Commit("Fix bug".to_string())
        );
        assert_eq!(
            parse_command(r#"commit say "hi""#),
            InputCommand::Commit(r#"say "hi""#.to_string())
        );
        assert_eq!(
            parse_command(r#"commit """#),
            InputCommand::Request(r#"commit """#.to_string())
        );
    }

    #[test]
    fn unknown_lines_are_requests() {
        assert_eq!(
            parse_command("exit the building safely"),
            InputCommand::Request("exit the building safely".to_string())
        );
        assert_eq!(
            parse_command("run"),
            InputCommand::Request("run".to_string())
        );
    }

    #[test]
    fn request_is_planned_then_executed_on_next_tick() {
        let demo = plan("demo", vec![task("backend_dev", "hello", Some("main.py"), None)]);
        let ws = TestWorkspace::with_config(
            fast_config(),
            ScriptedGenerator::new(["print('hello')"]),
            ScriptedPlanner::new([PlannerReply::Structured(demo)]),
        )
        .expect("workspace");

        let stop = StopSignal::new();
        let session = InteractiveLoop::new(
            Arc::clone(&ws.workspace),
            feed(&["build me a demo", "exit"]),
            stop.clone(),
        );
        session.run().expect("run");

        assert!(stop.is_stopped());
        let output = &ws.workspace.paths.output_dir;
        assert!(output.join("demo/main.py").is_file());
        let record = ws.workspace.manifest.get("demo").expect("get").expect("record");
        assert_eq!(record.status, ProjectStatus::Active);
    }

    #[cfg(unix)]
    #[test]
    fn confirmation_reads_answer_from_input() {
        let ws = TestWorkspace::with_config(
            fast_config(),
            ScriptedGenerator::default(),
            ScriptedPlanner::default(),
        )
        .expect("workspace");
        ws.workspace
            .queue
            .enqueue_plan(&plan(
                "demo",
                vec![task("executor", "clean", None, Some("rm -rf build_output"))],
            ))
            .expect("enqueue");

        let session = InteractiveLoop::new(
            Arc::clone(&ws.workspace),
            feed(&["yes", "quit"]),
            StopSignal::new(),
        );
        session.run().expect("run");

        assert!(ws.workspace.queue.list().expect("list").is_empty());
        assert!(ws.workspace.manifest.get("demo").expect("get").is_some());
    }

    #[test]
    fn closed_input_ends_session() {
        let ws = TestWorkspace::with_config(
            fast_config(),
            ScriptedGenerator::default(),
            ScriptedPlanner::default(),
        )
        .expect("workspace");
        let (tx, rx) = mpsc::channel::<String>();
        drop(tx);
        let stop = StopSignal::new();
        InteractiveLoop::new(Arc::clone(&ws.workspace), rx, stop.clone())
            .run()
            .expect("run");
        assert!(stop.is_stopped());
    }
}
