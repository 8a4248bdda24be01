//! Git adapter for the version-control agent.
//!
//! A small, explicit wrapper around `git` subprocess calls in one working
//! directory (normally a generated project's root).

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Result of [`Git::commit_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { summary: String },
    NothingToCommit,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if `workdir` is inside a work tree.
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.status.success())
    }

    /// `git init` unless already inside a work tree.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn ensure_repository(&self) -> Result<()> {
        if self.is_repository() {
            return Ok(());
        }
        debug!("initializing repository");
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Return the current branch name (errors on detached HEAD).
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        Ok(name)
    }

    /// Stage all changes under `workdir` (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A", "--", "."])?;
        Ok(())
    }

    /// True if anything under `workdir` is staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_checked(&["diff", "--cached", "--name-only", "--", "."])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Stage everything under `workdir` and commit only those paths.
    ///
    /// `workdir` may be a subdirectory of an enclosing repository; changes
    /// elsewhere in that repository are left alone.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn commit_all(&self, message: &str) -> Result<CommitOutcome> {
        self.add_all()?;
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        let output = self.run_checked(&["commit", "-m", message, "--", "."])?;
        let summary = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        debug!(%summary, "committed");
        Ok(CommitOutcome::Committed { summary })
    }

    /// Push the current branch to its upstream (or `origin`).
    #[instrument(skip_all)]
    pub fn push(&self) -> Result<()> {
        let branch = self.current_branch()?;
        self.run_checked(&["push", "origin", &branch])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    fn configure_identity(dir: &Path) {
        for (key, value) in [("user.name", "Foundry Test"), ("user.email", "foundry@example.com")] {
            let status = Command::new("git")
                .args(["config", key, value])
                .current_dir(dir)
                .status()
                .expect("git config");
            assert!(status.success());
        }
    }

    #[test]
    fn commit_all_then_nothing_to_commit() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.ensure_repository().expect("init");
        assert!(git.is_repository());
        configure_identity(temp.path());

        fs::write(temp.path().join("main.py"), "print('hi')\n").expect("write");
        let outcome = git.commit_all("add main").expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed { .. }));

        let outcome = git.commit_all("again").expect("commit again");
        assert_eq!(outcome, CommitOutcome::NothingToCommit);
    }

    #[test]
    fn commit_in_subdirectory_leaves_siblings_alone() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        Git::new(temp.path()).ensure_repository().expect("init");
        configure_identity(temp.path());
        let project = temp.path().join("demo");
        fs::create_dir_all(&project).expect("mkdir");
        fs::write(project.join("main.py"), "x = 1\n").expect("write");
        fs::write(temp.path().join("notes.txt"), "unrelated\n").expect("write");

        let git = Git::new(&project);
        assert!(git.is_repository());
        let outcome = git.commit_all("add demo").expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed { .. }));

        let status = Git::new(temp.path())
            .run_capture(&["status", "--porcelain"])
            .expect("status");
        assert_eq!(status.trim(), "?? notes.txt");
    }

    #[test]
    fn ensure_repository_is_idempotent() {
        if !git_available() {
            return;
        }
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.ensure_repository().expect("init");
        git.ensure_repository().expect("init again");
        assert!(temp.path().join(".git").is_dir());
    }
}
