//! Shell command execution with an existence precondition and safety screening.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::config::FoundryConfig;
use super::confirm::Confirmer;
use super::process::run_command_with_timeout;
use crate::core::safety::CommandSafetyClassifier;

/// Shell builtins that never resolve on the search path.
const SHELL_BUILTINS: &[&str] = &[
    "cd", "echo", "export", "source", ".", "test", "[", "true", "false", "exit", "set", "unset",
    ":", "alias", "read", "pwd",
];

/// Why a command finished the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// The process ran to completion. `code` is `None` if a signal ended it.
    Exited { code: Option<i32> },
    /// The classifier flagged the command; it was not run.
    NeedsConfirmation { reason: String },
    /// The leading program does not exist; nothing was spawned.
    CommandNotFound { program: String },
    /// The process outlived the timeout and was killed.
    TimedOut { after_secs: u64 },
    /// The shell itself could not be started.
    SpawnFailed { error: String },
}

/// Structured result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: String,
    pub success: bool,
    pub exit_reason: ExitReason,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    fn not_run(command: &str, exit_reason: ExitReason) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            exit_reason,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn needs_confirmation(&self) -> Option<&str> {
        match &self.exit_reason {
            ExitReason::NeedsConfirmation { reason } => Some(reason),
            _ => None,
        }
    }

    /// One-line description for logs and task outcomes.
    pub fn summary(&self) -> String {
        match &self.exit_reason {
            ExitReason::Exited { code: Some(0) } => format!("`{}` succeeded", self.command),
            ExitReason::Exited { code: Some(code) } => {
                format!("`{}` exited with code {code}", self.command)
            }
            ExitReason::Exited { code: None } => {
                format!("`{}` was terminated by a signal", self.command)
            }
            ExitReason::NeedsConfirmation { reason } => {
                format!("`{}` was not confirmed: {reason}", self.command)
            }
            ExitReason::CommandNotFound { program } => {
                format!("`{}`: command not found: {program}", self.command)
            }
            ExitReason::TimedOut { after_secs } => {
                format!("`{}` timed out after {after_secs}s", self.command)
            }
            ExitReason::SpawnFailed { error } => {
                format!("`{}` could not be started: {error}", self.command)
            }
        }
    }
}

/// Runs shell commands through `sh -c` in a given working directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    classifier: CommandSafetyClassifier,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandRunner {
    pub fn new(
        classifier: CommandSafetyClassifier,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            classifier,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &FoundryConfig) -> Self {
        Self::new(
            CommandSafetyClassifier::with_extra_patterns(&config.safety.extra_patterns),
            config.execution.command_timeout(),
            config.execution.output_limit_bytes,
        )
    }

    /// Run `command` in `workdir`.
    ///
    /// `workdir` is created only once the command passes both checks and is
    /// about to be spawned. Every outcome other than an unusable working
    /// directory is reported in the returned [`CommandReport`].
    #[instrument(skip_all, fields(command = %command, workdir = %workdir.display(), skip_safety_check = skip_safety_check))]
    pub fn execute(
        &self,
        command: &str,
        workdir: &Path,
        skip_safety_check: bool,
    ) -> Result<CommandReport> {
        let program = leading_program(command).unwrap_or_default();
        if !program_exists(&program, workdir) {
            warn!(program = %program, "command not found");
            return Ok(CommandReport::not_run(
                command,
                ExitReason::CommandNotFound { program },
            ));
        }

        if !skip_safety_check {
            let verdict = self.classifier.classify(command);
            if !verdict.is_safe() {
                warn!(reason = %verdict.reason, "command needs confirmation");
                return Ok(CommandReport::not_run(
                    command,
                    ExitReason::NeedsConfirmation {
                        reason: verdict.reason,
                    },
                ));
            }
        }

        fs::create_dir_all(workdir)
            .with_context(|| format!("create working directory {}", workdir.display()))?;
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(workdir);
        Ok(self.run(command, cmd, None))
    }

    /// Run `program` with `args` directly, without a shell or screening.
    ///
    /// For fixed tool invocations built by an agent, never for model-chosen
    /// command lines. `workdir` must already exist.
    #[instrument(skip_all, fields(program = %program, workdir = %workdir.display()))]
    pub fn execute_program(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&[u8]>,
        workdir: &Path,
    ) -> CommandReport {
        let display = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        if !program_exists(program, workdir) {
            warn!(program, "command not found");
            return CommandReport::not_run(
                &display,
                ExitReason::CommandNotFound {
                    program: program.to_string(),
                },
            );
        }
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(workdir);
        self.run(&display, cmd, stdin)
    }

    fn run(&self, command: &str, cmd: Command, stdin: Option<&[u8]>) -> CommandReport {
        let output = match run_command_with_timeout(cmd, stdin, self.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) => {
                return CommandReport::not_run(
                    command,
                    ExitReason::SpawnFailed {
                        error: format!("{err:#}"),
                    },
                );
            }
        };

        let exit_reason = if output.timed_out {
            ExitReason::TimedOut {
                after_secs: self.timeout.as_secs(),
            }
        } else {
            ExitReason::Exited {
                code: output.status.code(),
            }
        };
        let report = CommandReport {
            command: command.to_string(),
            success: output.success(),
            exit_reason,
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        };
        debug!(success = report.success, "command finished");
        report
    }

    /// Like [`execute`](Self::execute), but a flagged command is put to
    /// `confirmer` and rerun without screening if approved.
    pub fn execute_confirmed(
        &self,
        command: &str,
        workdir: &Path,
        confirmer: &dyn Confirmer,
    ) -> Result<CommandReport> {
        let report = self.execute(command, workdir, false)?;
        let Some(reason) = report.needs_confirmation() else {
            return Ok(report);
        };
        if confirmer.confirm(command, reason) {
            info!(command, "flagged command approved");
            self.execute(command, workdir, true)
        } else {
            info!(command, "flagged command declined");
            Ok(report)
        }
    }
}

/// First real program token, skipping leading `VAR=value` assignments.
pub fn leading_program(command: &str) -> Option<String> {
    let tokens = shlex::split(command)
        .unwrap_or_else(|| command.split_whitespace().map(str::to_string).collect());
    tokens.into_iter().find(|token| !is_env_assignment(token))
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn program_exists(program: &str, workdir: &Path) -> bool {
    if program.is_empty() {
        return false;
    }
    if SHELL_BUILTINS.contains(&program) {
        return true;
    }
    if program.contains('/') {
        return workdir.join(program).exists();
    }
    which::which(program).is_ok()
}
