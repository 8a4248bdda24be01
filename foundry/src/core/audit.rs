//! Pure anomaly detection for the audit workers.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use crate::core::path::sanitize_project_id;
use crate::core::types::{Manifest, ProjectStatus};

/// Output directories that no manifest entry (or housekeeping id) accounts for.
pub fn find_orphans<S: AsRef<str>>(
    output_dirs: &[String],
    manifest: &Manifest,
    housekeeping: &[S],
) -> Vec<String> {
    let known: BTreeSet<String> = manifest
        .keys()
        .map(String::as_str)
        .chain(housekeeping.iter().map(|id| id.as_ref()))
        .map(sanitize_project_id)
        .collect();

    let mut orphans: Vec<String> = output_dirs
        .iter()
        .filter(|dir| !known.contains(dir.as_str()))
        .cloned()
        .collect();
    orphans.sort();
    orphans
}

/// Active manifest entries whose project directory is no longer present.
pub fn vanished_projects(manifest: &Manifest, output_dirs: &[String]) -> Vec<String> {
    let present: BTreeSet<&str> = output_dirs.iter().map(String::as_str).collect();
    manifest
        .iter()
        .filter(|(_, record)| record.status == ProjectStatus::Active)
        .filter(|(id, _)| !present.contains(sanitize_project_id(id).as_str()))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Plan names whose last modification is older than `stale_after`.
///
/// Entries with a modification time in the future are never stale.
pub fn stale_plans(
    plans: &[(String, SystemTime)],
    now: SystemTime,
    stale_after: Duration,
) -> Vec<String> {
    plans
        .iter()
        .filter(|(_, modified)| {
            now.duration_since(*modified)
                .is_ok_and(|age| age > stale_after)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Ticket body for stale queued plans.
pub fn stale_plan_ticket(plans: &[String], stale_after: Duration) -> String {
    let mut body = format!(
        "# Stale plans\n\nThe following queued plans have not been processed for more than {} seconds:\n\n",
        stale_after.as_secs()
    );
    for plan in plans {
        body.push_str(&format!("- {plan}\n"));
    }
    body
}

/// Ticket body for orphaned output directories.
pub fn orphan_projects_ticket(orphans: &[String]) -> String {
    let mut body = String::from(
        "# Orphan projects\n\nThe following output directories are not registered in the manifest:\n\n",
    );
    for orphan in orphans {
        body.push_str(&format!("- {orphan}\n"));
    }
    body
}
