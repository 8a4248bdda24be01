//! Working-directory selection for shell actions inside a project.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::path::{resolve_within, sanitize_relative};

/// Commands that install dependencies from a manifest in the current directory.
static DEPENDENCY_INSTALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \b(
            pip3?\s+install\s+(-r|--requirement)\b
          | python3?\s+-m\s+pip\s+install\s+(-r|--requirement)\b
          | (npm|pnpm|yarn)\s+(install|ci|i)\b
          | yarn\s*$
          | cargo\s+(fetch|build)\b
          | poetry\s+install\b
          | bundle\s+install\b
          | go\s+mod\s+download\b
          | composer\s+install\b
        )",
    )
    .expect("dependency install pattern compiles")
});

/// True when `command` looks like a manifest-driven dependency install.
pub fn is_dependency_install(command: &str) -> bool {
    DEPENDENCY_INSTALL.is_match(command.trim())
}

/// Tracks the most recently created or targeted directory in an action sequence.
///
/// Dependency installs run in that directory, since generators commonly create
/// `backend/requirements.txt` and then emit a bare `pip install -r requirements.txt`.
/// Every other command runs at the project root.
#[derive(Debug, Clone)]
pub struct WorkdirTracker {
    project_root: PathBuf,
    last_dir: Option<PathBuf>,
}

impl WorkdirTracker {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            last_dir: None,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Record a directory that was just created.
    pub fn note_directory(&mut self, relative_dir: &str) {
        let dir = sanitize_relative(relative_dir);
        self.last_dir = Some(dir);
    }

    /// Record a file that was just written; its parent becomes the last directory.
    pub fn note_file(&mut self, relative_file: &str) {
        let file = sanitize_relative(relative_file);
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        self.last_dir = Some(dir);
    }

    /// Directory `command` should run in.
    pub fn workdir_for(&self, command: &str) -> PathBuf {
        match &self.last_dir {
            Some(dir) if is_dependency_install(command) => {
                resolve_within(&self.project_root, &dir.to_string_lossy())
            }
            _ => self.project_root.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_dependency_installs() {
        for command in [
            "pip install -r requirements.txt",
            "python -m pip install --requirement reqs.txt",
            "npm install",
            "npm ci",
            "yarn",
            "cargo fetch",
            "go mod download",
        ] {
            assert!(is_dependency_install(command), "{command}");
        }
    }

    #[test]
    fn ignores_other_commands() {
        for command in ["pip install flask", "python main.py", "ls", "npm run build"] {
            assert!(!is_dependency_install(command), "{command}");
        }
    }

    #[test]
    fn install_runs_in_last_file_parent() {
        let mut tracker = WorkdirTracker::new("/out/demo");
        tracker.note_file("backend/requirements.txt");
        assert_eq!(
            tracker.workdir_for("pip install -r requirements.txt"),
            PathBuf::from("/out/demo/backend")
        );
        assert_eq!(tracker.workdir_for("python app.py"), PathBuf::from("/out/demo"));
    }

    #[test]
    fn latest_directory_wins() {
        let mut tracker = WorkdirTracker::new("/out/demo");
        tracker.note_file("backend/requirements.txt");
        tracker.note_directory("frontend");
        assert_eq!(
            tracker.workdir_for("npm install"),
            PathBuf::from("/out/demo/frontend")
        );
    }

    #[test]
    fn install_without_history_runs_at_root() {
        let tracker = WorkdirTracker::new("/out/demo");
        assert_eq!(tracker.workdir_for("npm install"), PathBuf::from("/out/demo"));
    }

    #[test]
    fn escaping_directories_stay_inside_project() {
        let mut tracker = WorkdirTracker::new("/out/demo");
        tracker.note_directory("../../etc");
        assert_eq!(
            tracker.workdir_for("npm install"),
            PathBuf::from("/out/demo/etc")
        );
    }
}
