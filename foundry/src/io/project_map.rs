//! `project_map.md`: a human-readable overview of the workspace.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use walkdir::{DirEntry, WalkDir};

use super::init::WorkspacePaths;
use crate::core::types::{Manifest, ProjectStatus};

/// Upper bound on listed output files.
pub const MAX_LISTED_FILES: usize = 200;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "__pycache__", "venv", ".venv"];

/// Render the map document.
pub fn render_project_map(paths: &WorkspacePaths, manifest: &Manifest, max_files: usize) -> String {
    let mut out = String::new();
    out.push_str("# Project map\n\n");
    out.push_str(&format!("Generated at {}.\n\n", Utc::now().to_rfc3339()));

    out.push_str("## Directories\n\n");
    for (role, dir) in [
        ("generated projects", &paths.output_dir),
        ("pending plans", &paths.queue_dir),
        ("bug tickets", &paths.bugs_dir),
        ("plan reports", &paths.reports_dir),
        ("logs", &paths.log_dir),
    ] {
        let state = if dir.is_dir() { "present" } else { "missing" };
        out.push_str(&format!(
            "- `{}`: {role} ({state})\n",
            display_relative(dir, &paths.root)
        ));
    }

    out.push_str("\n## Projects\n\n");
    if manifest.is_empty() {
        out.push_str("_No registered projects._\n");
    }
    for (id, record) in manifest {
        let status = match record.status {
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::Missing => "MISSING",
        };
        out.push_str(&format!("- **{id}** [{status}] `{}`", record.path));
        if !record.description.trim().is_empty() {
            out.push_str(&format!(": {}", record.description.trim()));
        }
        out.push('\n');
    }

    out.push_str("\n## Output files\n\n");
    let (files, total) = list_files(&paths.output_dir, max_files);
    if files.is_empty() {
        out.push_str("_No files._\n");
    }
    for file in &files {
        out.push_str(&format!("- {file}\n"));
    }
    if total > files.len() {
        out.push_str(&format!("- ... {} more\n", total - files.len()));
    }
    out
}

/// Regenerate the map file atomically.
pub fn write_project_map(paths: &WorkspacePaths, manifest: &Manifest) -> Result<()> {
    let rendered = render_project_map(paths, manifest, MAX_LISTED_FILES);
    let target = &paths.project_map_path;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = target.with_extension("md.tmp");
    fs::write(&tmp_path, rendered)
        .with_context(|| format!("write temp project map {}", tmp_path.display()))?;
    fs::rename(&tmp_path, target)
        .with_context(|| format!("replace project map {}", target.display()))
}

/// Up to `max` file paths under `root` (relative, sorted) and the total count.
fn list_files(root: &Path, max: usize) -> (Vec<String>, usize) {
    let mut files = Vec::new();
    let mut total = 0;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry));
    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        total += 1;
        if files.len() < max {
            files.push(display_relative(entry.path(), root));
        }
    }
    (files, total)
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.depth() > 0
        && entry.file_type().is_dir()
        && (name.starts_with('.') || SKIPPED_DIRS.iter().any(|skip| *skip == name))
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ManifestRecord;
    use crate::io::config::PathsConfig;

    fn workspace(root: &Path) -> WorkspacePaths {
        let paths = WorkspacePaths::resolve(root, &PathsConfig::default());
        paths.ensure_layout().expect("layout");
        paths
    }

    #[test]
    fn lists_directories_projects_and_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = workspace(temp.path());
        let project = paths.output_dir.join("demo");
        fs::create_dir_all(project.join("src")).expect("mkdir");
        fs::create_dir_all(project.join("node_modules/pkg")).expect("mkdir");
        fs::write(project.join("src/main.py"), "print()").expect("write");
        fs::write(project.join("node_modules/pkg/index.js"), "").expect("write");

        let mut manifest = Manifest::new();
        manifest.insert(
            "demo".to_string(),
            ManifestRecord {
                path: project.display().to_string(),
                description: "demo app".to_string(),
                status: ProjectStatus::Active,
                created_at: Utc::now(),
                last_accessed: Utc::now(),
            },
        );

        let map = render_project_map(&paths, &manifest, MAX_LISTED_FILES);
        assert!(map.contains("`workspace/output`: generated projects (present)"));
        assert!(map.contains("- **demo** [ACTIVE]"));
        assert!(map.contains(": demo app"));
        assert!(map.contains("- demo/src/main.py"));
        assert!(!map.contains("index.js"));
    }

    #[test]
    fn file_listing_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = workspace(temp.path());
        for i in 0..5 {
            fs::write(paths.output_dir.join(format!("f{i}.txt")), "").expect("write");
        }
        let map = render_project_map(&paths, &Manifest::new(), 2);
        assert!(map.contains("- f0.txt\n- f1.txt\n- ... 3 more\n"));
        assert!(map.contains("_No registered projects._"));
    }

    #[test]
    fn write_replaces_map_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = workspace(temp.path());
        write_project_map(&paths, &Manifest::new()).expect("write");
        let contents = fs::read_to_string(&paths.project_map_path).expect("read");
        assert!(contents.starts_with("# Project map"));
    }
}
