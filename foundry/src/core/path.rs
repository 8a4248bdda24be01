//! Sandboxed path resolution for generated project files.
//!
//! Every path handed to an agent is built here. Inputs are sanitized rather
//! than rejected: `.` segments vanish, `..` pops a previous segment (or is
//! dropped at the top), and leading separators or drive prefixes are ignored.
//! The result is always a descendant of `<output_root>/<project_id>`.

use std::path::{Path, PathBuf};

/// Name used when a project id sanitizes to nothing.
pub const UNNAMED_PROJECT: &str = "unnamed";

/// Maps project ids and relative file names onto the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    output_root: PathBuf,
}

impl PathResolver {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Directory that holds every file of `project_id`.
    pub fn project_root(&self, project_id: &str) -> PathBuf {
        self.output_root.join(sanitize_project_id(project_id))
    }

    /// Absolute location of `relative_path` inside the project directory.
    pub fn resolve(&self, project_id: &str, relative_path: &str) -> PathBuf {
        resolve_within(&self.project_root(project_id), relative_path)
    }
}

/// Join `relative_path` onto `base` after sanitizing it.
pub fn resolve_within(base: &Path, relative_path: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for segment in sanitize_segments(relative_path) {
        resolved.push(segment);
    }
    resolved
}

/// Sanitized relative form of `relative_path` (may be empty).
pub fn sanitize_relative(relative_path: &str) -> PathBuf {
    sanitize_segments(relative_path).into_iter().collect()
}

/// Collapse a project id into a single safe directory name.
pub fn sanitize_project_id(project_id: &str) -> String {
    let segments = sanitize_segments(project_id);
    if segments.is_empty() {
        return UNNAMED_PROJECT.to_string();
    }
    segments.join("_")
}

fn sanitize_segments(raw: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        let segment = segment.trim();
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            // Drive prefixes such as `C:` would make `push` replace the base.
            s if is_drive_prefix(s) => {}
            s => segments.push(s),
        }
    }
    segments
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
